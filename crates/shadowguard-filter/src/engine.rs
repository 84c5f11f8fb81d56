//! Decision engine over a compiled rule set.

use std::sync::Arc;

use crate::compile::{CompiledRules, UrlRule};
use crate::rule::{Party, ResourceType};

/// Everything known about the request at decision time. Unknown context
/// fails constrained rules closed: a rule scoped to `$script` or
/// `$third-party` never matches a request whose type or initiator is
/// unknown, because blocking must be a positive identification.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext<'a> {
    /// Full request URL.
    pub url: &'a str,
    /// Request hostname, already lowercased by the caller.
    pub domain: &'a str,
    /// Request class, when the caller can tell.
    pub resource_type: Option<ResourceType>,
    /// Domain of the initiating page, when known.
    pub initiator: Option<&'a str>,
}

/// Outcome of a filter query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    /// Block the request; `rule` is the matching rule text.
    Block { rule: Arc<str> },
    /// A matching exception exempts the request.
    Allow { rule: Arc<str> },
    /// Serve `target` instead of fetching the URL.
    Redirect { target: String, rule: Arc<str> },
    /// No rule matched.
    Pass,
}

impl FilterDecision {
    /// True for outcomes that stop the original request.
    pub const fn is_block(&self) -> bool {
        matches!(self, Self::Block { .. })
    }
}

impl CompiledRules {
    /// Decide what happens to a request.
    ///
    /// Precedence: `$important` blocks beat everything, then allows, then
    /// redirects, then ordinary blocks.
    pub fn decide(&self, ctx: &RequestContext<'_>) -> FilterDecision {
        // Callers usually supply the hostname; fall back to parsing it out
        // of the URL so the function stays total.
        let derived_host;
        let mut ctx = *ctx;
        if ctx.domain.is_empty() {
            match host_of(ctx.url) {
                Some(host) => {
                    derived_host = host;
                    ctx.domain = &derived_host;
                }
                None => return FilterDecision::Pass,
            }
        }
        let ctx = &ctx;

        let url_lower = ctx.url.to_ascii_lowercase();

        let important = self.important_index.lookup(ctx.domain);
        if important.blocked {
            return FilterDecision::Block {
                rule: important.rule_tag.unwrap_or_else(|| Arc::from("")),
            };
        }
        if let Some(rule) = first_match(&self.url_blocks, ctx, &url_lower, true) {
            return FilterDecision::Block {
                rule: rule.tag.clone(),
            };
        }

        let allow = self.allow_index.lookup(ctx.domain);
        if allow.blocked {
            return FilterDecision::Allow {
                rule: allow.rule_tag.unwrap_or_else(|| Arc::from("")),
            };
        }
        if let Some(rule) = first_match(&self.url_allows, ctx, &url_lower, false) {
            return FilterDecision::Allow {
                rule: rule.tag.clone(),
            };
        }

        if let Some(rule) = first_match(&self.redirects, ctx, &url_lower, false) {
            // A matching redirect always carries a target by construction.
            if let Some(target) = rule.options.redirect.clone() {
                return FilterDecision::Redirect {
                    target,
                    rule: rule.tag.clone(),
                };
            }
        }

        let block = self.index.lookup(ctx.domain);
        if block.blocked {
            return FilterDecision::Block {
                rule: block.rule_tag.unwrap_or_else(|| Arc::from("")),
            };
        }
        if let Some(rule) = first_match(&self.url_blocks, ctx, &url_lower, false) {
            return FilterDecision::Block {
                rule: rule.tag.clone(),
            };
        }

        FilterDecision::Pass
    }
}

fn first_match<'r>(
    rules: &'r [UrlRule],
    ctx: &RequestContext<'_>,
    url_lower: &str,
    important_only: bool,
) -> Option<&'r UrlRule> {
    rules
        .iter()
        .find(|rule| rule.options.important == important_only && rule_matches(rule, ctx, url_lower))
}

fn rule_matches(rule: &UrlRule, ctx: &RequestContext<'_>, url_lower: &str) -> bool {
    if let Some(required) = &rule.required {
        if !url_lower.contains(required.as_str()) {
            return false;
        }
    }
    if !rule.regex.is_match(ctx.url) {
        return false;
    }
    options_match(rule, ctx)
}

fn options_match(rule: &UrlRule, ctx: &RequestContext<'_>) -> bool {
    let opts = &rule.options;

    if let Some(party) = opts.party {
        let Some(initiator) = ctx.initiator else {
            return false;
        };
        let first_party = same_site(ctx.domain, initiator);
        match party {
            Party::First if !first_party => return false,
            Party::Third if first_party => return false,
            _ => {}
        }
    }

    if let Some(types) = &opts.resource_types {
        match ctx.resource_type {
            Some(rt) if types.contains(&rt) => {}
            _ => return false,
        }
    }

    if !opts.include_domains.is_empty() {
        let Some(initiator) = ctx.initiator else {
            return false;
        };
        if !opts
            .include_domains
            .iter()
            .any(|d| domain_in_scope(initiator, d))
        {
            return false;
        }
    }

    if let Some(initiator) = ctx.initiator {
        if opts
            .exclude_domains
            .iter()
            .any(|d| domain_in_scope(initiator, d))
        {
            return false;
        }
    }

    true
}

/// Hostname of a URL, lowercased.
fn host_of(url_str: &str) -> Option<String> {
    let parsed = url::Url::parse(url_str).ok()?;
    parsed.host_str().map(str::to_ascii_lowercase)
}

/// Exact match or dot-suffix containment, either direction.
fn same_site(a: &str, b: &str) -> bool {
    a == b || suffix_of(a, b) || suffix_of(b, a)
}

/// `domain` equals `scope` or is a subdomain of it.
fn domain_in_scope(domain: &str, scope: &str) -> bool {
    domain == scope || suffix_of(domain, scope)
}

fn suffix_of(sub: &str, parent: &str) -> bool {
    sub.len() > parent.len()
        && sub.ends_with(parent)
        && sub.as_bytes()[sub.len() - parent.len() - 1] == b'.'
}

/// Estimate of response bytes not downloaded for a blocked request, used
/// for the bytes-saved counter.
pub fn blocked_bytes_estimate(resource_type: Option<ResourceType>) -> u64 {
    match resource_type {
        Some(ResourceType::Image | ResourceType::Media) => 50 * 1024,
        Some(ResourceType::Script | ResourceType::Stylesheet) => 30 * 1024,
        Some(ResourceType::Document) => 20 * 1024,
        _ => 10 * 1024,
    }
}

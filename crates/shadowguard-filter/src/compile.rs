//! Rule-snapshot compilation.
//!
//! Splits parsed rules into the representations the hot paths want:
//! unconstrained domain anchors go to the shared domain index (exact allow
//! domains are subtracted first, so the packet fast path can never drop
//! something the engine would have allowed), everything else becomes an
//! anchored case-insensitive regex with an optional required-substring
//! prefilter.

use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

use shadowguard_index::{Domain, Snapshot};

use crate::error::FilterError;
use crate::parse::{parse_line, NetworkRule, ParsedLine, RulePattern, UrlPatternText};
use crate::rule::{CosmeticRule, RuleAction, RuleOptions};

/// Shortest literal worth a contains() prefilter.
const MIN_REQUIRED_LITERAL: usize = 4;

/// A compiled URL-pattern rule.
#[derive(Debug)]
pub(crate) struct UrlRule {
    pub(crate) regex: Regex,
    /// Lowercased literal that must appear in the URL before the regex runs.
    pub(crate) required: Option<String>,
    pub(crate) options: RuleOptions,
    pub(crate) tag: Arc<str>,
}

/// Counters from one compilation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStats {
    /// Network rules that compiled.
    pub rules_compiled: u64,
    /// Lines that failed to parse or compile and were skipped.
    pub rules_skipped: u64,
    /// Cosmetic rules surfaced.
    pub cosmetic_rules: u64,
    /// Distinct entries in the block domain index.
    pub domains_indexed: u64,
}

/// An immutable compiled rule set. Connections capture an `Arc` of this for
/// their whole lifetime; reloads build a fresh one.
#[derive(Debug)]
pub struct CompiledRules {
    pub(crate) index: Arc<Snapshot>,
    pub(crate) important_index: Snapshot,
    pub(crate) allow_index: Snapshot,
    pub(crate) url_blocks: Vec<UrlRule>,
    pub(crate) url_allows: Vec<UrlRule>,
    pub(crate) redirects: Vec<UrlRule>,
    cosmetic: Vec<CosmeticRule>,
    stats: CompileStats,
}

impl CompiledRules {
    /// A set that matches nothing.
    pub fn empty() -> Self {
        RuleCompiler::compile(std::iter::empty::<(&str, &str)>())
    }

    /// The block domain index shared with the packet fast path.
    pub fn index(&self) -> Arc<Snapshot> {
        self.index.clone()
    }

    /// Cosmetic rules for the shell.
    pub fn cosmetic_rules(&self) -> &[CosmeticRule] {
        &self.cosmetic
    }

    /// Compilation counters.
    pub fn stats(&self) -> CompileStats {
        self.stats
    }
}

/// Compiles rule sources into a `CompiledRules` snapshot.
pub struct RuleCompiler;

impl RuleCompiler {
    /// Compile `(source_id, text)` blobs in order. Bad rules are logged and
    /// skipped; compilation itself never fails.
    pub fn compile<'a>(sources: impl IntoIterator<Item = (&'a str, &'a str)>) -> CompiledRules {
        let mut stats = CompileStats::default();
        let mut cosmetic = Vec::new();

        let mut block_domains: Vec<(Domain, Arc<str>)> = Vec::new();
        let mut important_domains: Vec<(Domain, Arc<str>)> = Vec::new();
        let mut allow_domains: Vec<(Domain, Arc<str>)> = Vec::new();
        let mut url_blocks = Vec::new();
        let mut url_allows = Vec::new();
        let mut redirects = Vec::new();

        for (source_id, text) in sources {
            for line in text.lines() {
                let parsed = match parse_line(line) {
                    Ok(Some(parsed)) => parsed,
                    Ok(None) => continue,
                    Err(e) => {
                        stats.rules_skipped += 1;
                        warn!(source = source_id, rule = line.trim(), error = %e, "skipping rule");
                        continue;
                    }
                };

                match parsed {
                    ParsedLine::Cosmetic(rule) => {
                        stats.cosmetic_rules += 1;
                        cosmetic.push(rule);
                    }
                    ParsedLine::Network(rule) => match compile_network(rule) {
                        Ok(compiled) => {
                            stats.rules_compiled += 1;
                            match compiled {
                                Compiled::BlockDomain(d, tag) => block_domains.push((d, tag)),
                                Compiled::ImportantDomain(d, tag) => {
                                    important_domains.push((d, tag));
                                }
                                Compiled::AllowDomain(d, tag) => allow_domains.push((d, tag)),
                                Compiled::BlockUrl(r) => url_blocks.push(r),
                                Compiled::AllowUrl(r) => url_allows.push(r),
                                Compiled::RedirectUrl(r) => redirects.push(r),
                            }
                        }
                        Err(e) => {
                            stats.rules_skipped += 1;
                            warn!(source = source_id, rule = line.trim(), error = %e, "skipping rule");
                        }
                    },
                }
            }
        }

        // Allow precedence, applied at build time: an exact-domain allow
        // removes the identical block entry so the packet path stays safe.
        // `important` blocks survive allows, so they skip the subtraction;
        // the packet path still needs them, so the main index carries both.
        let allowed: std::collections::HashSet<(String, bool)> = allow_domains
            .iter()
            .map(|(d, _)| (d.name().to_string(), d.is_wildcard()))
            .collect();
        block_domains.retain(|(d, _)| !allowed.contains(&(d.name().to_string(), d.is_wildcard())));

        let index = Snapshot::build(
            block_domains
                .into_iter()
                .chain(important_domains.iter().cloned())
                .map(|(d, tag)| (d, Some(tag))),
        );
        let important_index = Snapshot::build(
            important_domains
                .into_iter()
                .map(|(d, tag)| (d, Some(tag))),
        );
        let allow_index = Snapshot::build(
            allow_domains
                .into_iter()
                .map(|(d, tag)| (d, Some(tag))),
        );

        stats.domains_indexed = index.total_domains() as u64;
        debug!(
            compiled = stats.rules_compiled,
            skipped = stats.rules_skipped,
            indexed = stats.domains_indexed,
            "compiled rule snapshot"
        );

        CompiledRules {
            index: Arc::new(index),
            important_index,
            allow_index,
            url_blocks,
            url_allows,
            redirects,
            cosmetic,
            stats,
        }
    }
}

enum Compiled {
    BlockDomain(Domain, Arc<str>),
    ImportantDomain(Domain, Arc<str>),
    AllowDomain(Domain, Arc<str>),
    BlockUrl(UrlRule),
    AllowUrl(UrlRule),
    RedirectUrl(UrlRule),
}

fn compile_network(rule: NetworkRule) -> crate::Result<Compiled> {
    let NetworkRule {
        action,
        pattern,
        options,
        raw,
    } = rule;
    let tag: Arc<str> = Arc::from(raw.as_str());

    match pattern {
        RulePattern::DomainAnchor(name) if options.is_unconstrained() => {
            let domain = Domain::parse(&name)?;
            Ok(match action {
                RuleAction::Allow => Compiled::AllowDomain(domain, tag),
                RuleAction::Block if options.important => Compiled::ImportantDomain(domain, tag),
                RuleAction::Block => Compiled::BlockDomain(domain, tag),
            })
        }
        RulePattern::DomainAnchor(name) => {
            // Constrained domain anchors need request context; rebuild them
            // as URL patterns.
            let pattern = UrlPatternText {
                body: format!("{name}^"),
                domain_anchored: true,
                start_anchored: false,
                end_anchored: false,
                is_regex: false,
            };
            compile_url(action, &pattern, options, tag)
        }
        RulePattern::Url(pattern) => compile_url(action, &pattern, options, tag),
    }
}

fn compile_url(
    action: RuleAction,
    pattern: &UrlPatternText,
    options: RuleOptions,
    tag: Arc<str>,
) -> crate::Result<Compiled> {
    let regex = build_regex(pattern)?;
    let required = required_literal(pattern);
    let rule = UrlRule {
        regex,
        required,
        options,
        tag,
    };

    Ok(match action {
        RuleAction::Allow => Compiled::AllowUrl(rule),
        RuleAction::Block if rule.options.redirect.is_some() => Compiled::RedirectUrl(rule),
        RuleAction::Block => Compiled::BlockUrl(rule),
    })
}

/// Translate a pattern into an anchored, case-insensitive regex.
fn build_regex(pattern: &UrlPatternText) -> crate::Result<Regex> {
    let src = if pattern.is_regex {
        format!("(?i){}", pattern.body)
    } else {
        let mut src = String::with_capacity(pattern.body.len() * 2 + 32);
        src.push_str("(?i)");
        if pattern.domain_anchored {
            src.push_str(r"^https?://([a-z0-9-]+\.)*");
        } else if pattern.start_anchored {
            src.push('^');
        }
        for ch in pattern.body.chars() {
            match ch {
                '*' => src.push_str(".*"),
                '^' => src.push_str(r"(?:[/?#]|$)"),
                _ => {
                    let mut buf = [0u8; 4];
                    src.push_str(&regex::escape(ch.encode_utf8(&mut buf)));
                }
            }
        }
        if pattern.end_anchored {
            src.push('$');
        }
        src
    };

    Regex::new(&src).map_err(|e| FilterError::Regex(e.to_string()))
}

/// Longest wildcard-free literal run, for the contains() prefilter.
fn required_literal(pattern: &UrlPatternText) -> Option<String> {
    if pattern.is_regex {
        return None;
    }
    pattern
        .body
        .split(['*', '^'])
        .max_by_key(|run| run.len())
        .filter(|run| run.len() >= MIN_REQUIRED_LITERAL)
        .map(str::to_ascii_lowercase)
}

//! Line parser for the supported filter-language subset.
//!
//! One line in, at most one rule out. Comments and empties parse to `None`;
//! malformed lines return an error the compiler logs and skips.

use crate::error::FilterError;
use crate::rule::{CosmeticRule, Party, ResourceType, RuleAction, RuleOptions};

/// Hostnames a hosts-file line may carry that must never become rules.
const HOSTS_NOISE: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "0.0.0.0",
];

/// A successfully parsed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    /// A network (traffic) rule.
    Network(NetworkRule),
    /// A cosmetic rule; surfaced but not consumed by the core.
    Cosmetic(CosmeticRule),
}

/// A parsed network rule, pattern not yet compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRule {
    pub action: RuleAction,
    pub pattern: RulePattern,
    pub options: RuleOptions,
    /// The line as written, used as the rule-origin tag.
    pub raw: String,
}

/// Pattern classification, kept textual until compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulePattern {
    /// Pure `||domain^` (no path part): eligible for the domain index.
    DomainAnchor(String),
    /// Anything that needs URL matching.
    Url(UrlPatternText),
}

/// URL pattern text plus its anchoring flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPatternText {
    /// Pattern body with anchors stripped.
    pub body: String,
    /// `||` prefix: anchored at a domain-label boundary.
    pub domain_anchored: bool,
    /// `|` prefix: anchored at the start of the URL.
    pub start_anchored: bool,
    /// `|` suffix: anchored at the end of the URL.
    pub end_anchored: bool,
    /// `/…/` rule: body is a raw regex, used as written.
    pub is_regex: bool,
}

/// Parse one list line. `Ok(None)` means comment/blank.
pub fn parse_line(line: &str) -> crate::Result<Option<ParsedLine>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('!') || line.starts_with('#') || line.starts_with('[') {
        return Ok(None);
    }

    if let Some(cosmetic) = parse_cosmetic(line) {
        return Ok(Some(ParsedLine::Cosmetic(cosmetic)));
    }

    if let Some(rule) = parse_hosts_line(line) {
        return Ok(rule.map(ParsedLine::Network));
    }

    parse_network(line).map(|r| Some(ParsedLine::Network(r)))
}

/// `domain1,domain2##selector` and friends.
fn parse_cosmetic(line: &str) -> Option<CosmeticRule> {
    let (sep, exception) = if line.contains("#@#") {
        ("#@#", true)
    } else if line.contains("#?#") {
        ("#?#", false)
    } else if line.contains("##") {
        ("##", false)
    } else {
        return None;
    };

    let (scope, selector) = line.split_once(sep)?;
    let selector = selector.trim();
    if selector.is_empty() {
        return None;
    }

    let domains = scope
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();

    Some(CosmeticRule {
        selector: selector.to_string(),
        domains,
        exception,
    })
}

/// `0.0.0.0 domain` / `127.0.0.1 domain` become domain-anchor blocks.
/// Returns `Some(None)` for recognized noise entries (skipped silently).
fn parse_hosts_line(line: &str) -> Option<Option<NetworkRule>> {
    let (ip, rest) = line.split_once(char::is_whitespace)?;
    if ip != "0.0.0.0" && ip != "127.0.0.1" {
        return None;
    }

    // Strip an inline comment, keep the first hostname token.
    let host = rest.split('#').next()?.split_whitespace().next()?;
    let host = host.to_ascii_lowercase();
    if HOSTS_NOISE.contains(&host.as_str()) {
        return Some(None);
    }

    Some(Some(NetworkRule {
        action: RuleAction::Block,
        pattern: RulePattern::DomainAnchor(host),
        options: RuleOptions::default(),
        raw: line.to_string(),
    }))
}

fn parse_network(line: &str) -> crate::Result<NetworkRule> {
    let raw = line.to_string();

    let (action, mut body) = match line.strip_prefix("@@") {
        Some(rest) => (RuleAction::Allow, rest),
        None => (RuleAction::Block, line),
    };

    // `$options` tail. A whole-line regex keeps its `$` characters.
    let mut options = RuleOptions::default();
    let is_whole_regex = body.len() > 2 && body.starts_with('/') && body.ends_with('/');
    if !is_whole_regex {
        if let Some(idx) = body.rfind('$') {
            let tail = &body[idx + 1..];
            if idx > 0 && !tail.is_empty() && looks_like_options(tail) {
                options = parse_options(tail)?;
                body = &body[..idx];
            }
        }
    }

    if body.is_empty() {
        return Err(FilterError::EmptyPattern);
    }

    // Raw regex rule: `/…/`, anchored exactly as written.
    if body.len() > 2 && body.starts_with('/') && body.ends_with('/') {
        return Ok(NetworkRule {
            action,
            pattern: RulePattern::Url(UrlPatternText {
                body: body[1..body.len() - 1].to_string(),
                domain_anchored: false,
                start_anchored: false,
                end_anchored: false,
                is_regex: true,
            }),
            options,
            raw,
        });
    }

    let domain_anchored = body.starts_with("||");
    if domain_anchored {
        body = &body[2..];
    }
    let start_anchored = !domain_anchored && body.starts_with('|');
    if start_anchored {
        body = &body[1..];
    }
    let end_anchored = body.ends_with('|');
    if end_anchored {
        body = &body[..body.len() - 1];
    }

    if body.is_empty() {
        return Err(FilterError::EmptyPattern);
    }

    // `||name^` (or bare `||name`) with no URL machinery is a pure domain
    // anchor, which the domain index matches in O(L).
    if domain_anchored && !end_anchored {
        let bare = body.strip_suffix('^').unwrap_or(body);
        if !bare.is_empty() && bare_domain(bare) {
            return Ok(NetworkRule {
                action,
                pattern: RulePattern::DomainAnchor(bare.to_ascii_lowercase()),
                options,
                raw,
            });
        }
    }

    Ok(NetworkRule {
        action,
        pattern: RulePattern::Url(UrlPatternText {
            body: body.to_string(),
            domain_anchored,
            start_anchored,
            end_anchored,
            is_regex: false,
        }),
        options,
        raw,
    })
}

/// No path, wildcard, separator or port syntax left: just labels and dots.
fn bare_domain(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
}

/// Conservative check that a `$` tail is an option list and not part of the
/// pattern itself.
fn looks_like_options(tail: &str) -> bool {
    tail.bytes().all(|b| {
        b.is_ascii_alphanumeric()
            || matches!(b, b',' | b'=' | b'|' | b'~' | b'-' | b'_' | b'.')
    })
}

fn parse_options(tail: &str) -> crate::Result<RuleOptions> {
    let mut options = RuleOptions::default();
    let mut types = None;

    for token in tail.split(',') {
        match token {
            "third-party" | "3p" => options.party = Some(Party::Third),
            "~third-party" | "first-party" | "1p" => options.party = Some(Party::First),
            "important" => options.important = true,
            _ => {
                if let Ok(rt) = token.parse::<ResourceType>() {
                    types
                        .get_or_insert_with(std::collections::HashSet::new)
                        .insert(rt);
                } else if let Some(domains) = token.strip_prefix("domain=") {
                    if domains.is_empty() {
                        return Err(FilterError::MalformedOption(token.to_string()));
                    }
                    for entry in domains.split('|') {
                        match entry.strip_prefix('~') {
                            Some(excluded) if !excluded.is_empty() => options
                                .exclude_domains
                                .push(excluded.to_ascii_lowercase()),
                            None if !entry.is_empty() => {
                                options.include_domains.push(entry.to_ascii_lowercase());
                            }
                            _ => return Err(FilterError::MalformedOption(token.to_string())),
                        }
                    }
                } else if let Some(target) = token.strip_prefix("redirect=") {
                    if target.is_empty() {
                        return Err(FilterError::MalformedOption(token.to_string()));
                    }
                    options.redirect = Some(target.to_string());
                } else {
                    return Err(FilterError::UnknownOption(token.to_string()));
                }
            }
        }
    }

    options.resource_types = types;
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(line: &str) -> NetworkRule {
        match parse_line(line).unwrap().unwrap() {
            ParsedLine::Network(r) => r,
            other => panic!("expected network rule, got {other:?}"),
        }
    }

    #[test]
    fn test_comments_and_blanks() {
        for line in ["", "   ", "! comment", "# hosts comment", "[Adblock Plus 2.0]"] {
            assert_eq!(parse_line(line).unwrap(), None, "line {line:?}");
        }
    }

    #[test]
    fn test_domain_anchor() {
        let r = network("||doubleclick.net^");
        assert_eq!(r.action, RuleAction::Block);
        assert_eq!(
            r.pattern,
            RulePattern::DomainAnchor("doubleclick.net".into())
        );
    }

    #[test]
    fn test_domain_anchor_with_path_is_url_rule() {
        let r = network("||example.com/ads/*");
        match r.pattern {
            RulePattern::Url(p) => {
                assert!(p.domain_anchored);
                assert_eq!(p.body, "example.com/ads/*");
            }
            other => panic!("expected url pattern, got {other:?}"),
        }
    }

    #[test]
    fn test_allow_rule() {
        let r = network("@@||cdn.example.com^");
        assert_eq!(r.action, RuleAction::Allow);
        assert_eq!(
            r.pattern,
            RulePattern::DomainAnchor("cdn.example.com".into())
        );
    }

    #[test]
    fn test_hosts_lines() {
        let r = network("0.0.0.0 ads.tracker.example");
        assert_eq!(
            r.pattern,
            RulePattern::DomainAnchor("ads.tracker.example".into())
        );
        let r = network("127.0.0.1 Evil.Example # inline note");
        assert_eq!(r.pattern, RulePattern::DomainAnchor("evil.example".into()));

        // Noise entries are swallowed.
        assert_eq!(parse_line("127.0.0.1 localhost").unwrap(), None);
        assert_eq!(parse_line("0.0.0.0 0.0.0.0").unwrap(), None);
    }

    #[test]
    fn test_anchors() {
        let r = network("|https://ads.");
        match r.pattern {
            RulePattern::Url(p) => {
                assert!(p.start_anchored && !p.domain_anchored && !p.end_anchored);
                assert_eq!(p.body, "https://ads.");
            }
            other => panic!("{other:?}"),
        }

        let r = network(".gif|");
        match r.pattern {
            RulePattern::Url(p) => {
                assert!(p.end_anchored && !p.start_anchored);
                assert_eq!(p.body, ".gif");
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_regex_rule_keeps_dollar() {
        let r = network(r"/^https?:\/\/ads\.[a-z]+\.example\/$/");
        match r.pattern {
            RulePattern::Url(p) => {
                assert!(p.is_regex);
                assert!(p.body.ends_with('$'));
            }
            other => panic!("{other:?}"),
        }
    }

    #[test]
    fn test_options() {
        let r = network("||ads.example^$third-party,script,image,domain=news.example|~blog.news.example,important");
        assert_eq!(r.options.party, Some(Party::Third));
        assert!(r.options.important);
        let types = r.options.resource_types.unwrap();
        assert!(types.contains(&ResourceType::Script));
        assert!(types.contains(&ResourceType::Image));
        assert_eq!(r.options.include_domains, ["news.example"]);
        assert_eq!(r.options.exclude_domains, ["blog.news.example"]);
    }

    #[test]
    fn test_redirect_option() {
        let r = network("||ads.example/pixel.gif$redirect=1x1.gif");
        assert_eq!(r.options.redirect.as_deref(), Some("1x1.gif"));
    }

    #[test]
    fn test_unknown_option_rejected() {
        assert!(matches!(
            parse_line("||ads.example^$frobnicate"),
            Err(FilterError::UnknownOption(_))
        ));
    }

    #[test]
    fn test_cosmetic_rules() {
        match parse_line("news.example##.ad-banner").unwrap().unwrap() {
            ParsedLine::Cosmetic(c) => {
                assert_eq!(c.selector, ".ad-banner");
                assert_eq!(c.domains, ["news.example"]);
                assert!(!c.exception);
            }
            other => panic!("{other:?}"),
        }

        match parse_line("news.example#@#.ad-banner").unwrap().unwrap() {
            ParsedLine::Cosmetic(c) => assert!(c.exception),
            other => panic!("{other:?}"),
        }
    }
}

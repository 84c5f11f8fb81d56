//! Bypass list: hosts that skip MITM and get an opaque relay.
//!
//! Pinned services (banking apps, certificate-pinned SDKs) break under
//! interception; their traffic is tunneled untouched instead.

use std::collections::HashSet;

/// Compiled bypass patterns: exact hostnames plus `*.suffix` entries.
#[derive(Debug, Default, Clone)]
pub struct BypassList {
    exact: HashSet<String>,
    suffixes: Vec<String>,
}

impl BypassList {
    /// Compile patterns; entries were already validated by config loading.
    pub fn new(patterns: &[String]) -> Self {
        let mut exact = HashSet::new();
        let mut suffixes = Vec::new();
        for pattern in patterns {
            let pattern = pattern.to_ascii_lowercase();
            match pattern.strip_prefix("*.") {
                Some(suffix) if !suffix.is_empty() => suffixes.push(suffix.to_string()),
                _ => {
                    exact.insert(pattern);
                }
            }
        }
        Self { exact, suffixes }
    }

    /// Whether `host` should bypass interception.
    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        if self.exact.contains(&host) {
            return true;
        }
        self.suffixes.iter().any(|suffix| {
            host == *suffix
                || (host.len() > suffix.len()
                    && host.ends_with(suffix.as_str())
                    && host.as_bytes()[host.len() - suffix.len() - 1] == b'.')
        })
    }

    /// Number of compiled patterns.
    pub fn len(&self) -> usize {
        self.exact.len() + self.suffixes.len()
    }

    /// True when no patterns are configured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Configuration snapshot for the interception core.
//!
//! A `Config` is immutable per read: the shell loads one, validates it, and
//! hands it to `Core::new`. Reload means building a fresh `Config` and a
//! fresh rule snapshot; in-flight connections keep the one they started with.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// One blocklist source: a text blob of filter rules compiled in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSource {
    /// Stable identifier, used as the rule-origin tag in match results.
    pub id: String,

    /// Disabled sources are kept in config but skipped at compile time.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Raw rule text (adblock subset and/or hosts-file lines).
    #[serde(default)]
    pub text: String,
}

/// Configuration for the interception core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Local MITM proxy listener port (bound on 127.0.0.1).
    #[serde(default = "default_proxy_port")]
    pub proxy_port: u16,

    /// Domain patterns that skip MITM entirely: exact (`login.bank.example`)
    /// or suffix (`*.bank.example`).
    #[serde(default)]
    pub bypass_patterns: Vec<String>,

    /// Rule sources, compiled in order.
    #[serde(default)]
    pub rule_sources: Vec<RuleSource>,

    /// Leaf certificate cache TTL in seconds.
    #[serde(default = "default_leaf_ttl")]
    pub cache_leaf_ttl_secs: u32,

    /// Leaf certificate cache soft cap.
    #[serde(default = "default_leaf_max")]
    pub cache_leaf_max: u32,

    /// Verify origin certificates against the platform trust store. When
    /// false the proxy still requires a valid chain to an explicitly
    /// configured anchor; invalid certificates are never accepted silently.
    #[serde(default = "default_true")]
    pub origin_verify_system_trust: bool,

    /// Log level filter for the shell to apply (`error`..`trace`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_port: default_proxy_port(),
            bypass_patterns: Vec::new(),
            rule_sources: Vec::new(),
            cache_leaf_ttl_secs: default_leaf_ttl(),
            cache_leaf_max: default_leaf_max(),
            origin_verify_system_trust: true,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load config from a TOML file, falling back to defaults when absent.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self =
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the snapshot. Rejected configs leave the previous one in
    /// effect; only an invalid initial config is fatal.
    pub fn validate(&self) -> crate::Result<()> {
        if self.proxy_port == 0 {
            return Err(ConfigError::InvalidPort(self.proxy_port));
        }

        for pattern in &self.bypass_patterns {
            validate_bypass_pattern(pattern)?;
        }

        let mut seen = std::collections::HashSet::new();
        for source in &self.rule_sources {
            if !seen.insert(source.id.as_str()) {
                return Err(ConfigError::DuplicateRuleSource(source.id.clone()));
            }
        }

        Ok(())
    }

    /// Rule sources that are enabled, in declaration order.
    pub fn enabled_sources(&self) -> impl Iterator<Item = &RuleSource> {
        self.rule_sources.iter().filter(|s| s.enabled)
    }
}

/// A bypass pattern is an exact hostname or `*.suffix`.
fn validate_bypass_pattern(pattern: &str) -> crate::Result<()> {
    let host = pattern.strip_prefix("*.").unwrap_or(pattern);

    let reject = |reason: &str| {
        Err(ConfigError::InvalidBypassPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        })
    };

    if host.is_empty() {
        return reject("empty host");
    }
    if host.contains('*') {
        return reject("wildcard allowed only as a leading `*.` label");
    }
    if host.len() > 253 {
        return reject("host exceeds 253 octets");
    }
    for label in host.split('.') {
        if label.is_empty() || label.len() > 63 {
            return reject("label must be 1-63 octets");
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-')
        {
            return reject("label must match [a-z0-9-]+");
        }
    }
    Ok(())
}

// Default value functions for serde.
const fn default_enabled() -> bool {
    true
}

const fn default_proxy_port() -> u16 {
    8899
}

const fn default_leaf_ttl() -> u32 {
    86_400
}

const fn default_leaf_max() -> u32 {
    1000
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    String::from("info")
}

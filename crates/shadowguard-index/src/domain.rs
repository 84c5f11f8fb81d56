//! Domain normalization.
//!
//! Rule lists arrive messy: adblock decorations (`||`, `^`), schemes, paths,
//! ports, stray case and trailing dots. `Domain::parse` reduces all of that
//! to the canonical lowercase form the trie indexes, or rejects it.
//!
//! Invariants after parse: labels match `[a-z0-9-]+`, each label at most 63
//! octets, the whole name at most 253 octets, and at most one wildcard, as a
//! leading `*.`.

use crate::error::IndexError;

/// Maximum total length of a DNS name in presentation form.
const MAX_NAME_OCTETS: usize = 253;
/// Maximum length of a single label.
const MAX_LABEL_OCTETS: usize = 63;

/// A normalized, validated domain, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Domain {
    name: String,
    wildcard: bool,
}

impl Domain {
    /// Normalize and validate `raw` into a `Domain`.
    pub fn parse(raw: &str) -> crate::Result<Self> {
        let mut s = raw.trim();

        // Adblock decorations.
        s = s.strip_prefix("||").unwrap_or(s);
        s = s.strip_suffix('^').unwrap_or(s);

        // Scheme, path, query, fragment, port.
        if let Some(idx) = s.find("://") {
            s = &s[idx + 3..];
        }
        if let Some(idx) = s.find(['/', '?', '#']) {
            s = &s[..idx];
        }
        if let Some(idx) = s.find(':') {
            s = &s[..idx];
        }

        // Trailing root dot.
        s = s.strip_suffix('.').unwrap_or(s);

        let (wildcard, host) = match s.strip_prefix("*.") {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        if host.is_empty() {
            return Err(IndexError::invalid(raw, "empty host"));
        }
        if host.len() > MAX_NAME_OCTETS {
            return Err(IndexError::invalid(raw, "name exceeds 253 octets"));
        }

        let name = host.to_ascii_lowercase();
        for label in name.split('.') {
            validate_label(raw, label)?;
        }

        Ok(Self { name, wildcard })
    }

    /// The normalized name without any wildcard prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the domain carried a leading `*.` label.
    pub const fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Labels in reverse order (TLD first), the order the trie walks.
    pub fn labels_reversed(&self) -> impl Iterator<Item = &str> {
        self.name.rsplit('.')
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.wildcard {
            write!(f, "*.{}", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

fn validate_label(raw: &str, label: &str) -> crate::Result<()> {
    if label.is_empty() {
        return Err(IndexError::invalid(raw, "empty label"));
    }
    if label.len() > MAX_LABEL_OCTETS {
        return Err(IndexError::invalid(raw, "label exceeds 63 octets"));
    }
    // A single wildcard is consumed before validation; anything left is bad.
    if !label
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(IndexError::invalid(raw, "label must match [a-z0-9-]+"));
    }
    Ok(())
}

/// Cheap query-side normalization: lowercase and strip one trailing dot.
///
/// Returns `None` when the query cannot be a valid domain; lookups treat
/// that as a non-match rather than an error.
pub(crate) fn normalize_query(raw: &str) -> Option<String> {
    let s = raw.trim().strip_suffix('.').unwrap_or_else(|| raw.trim());
    if s.is_empty() || s.len() > MAX_NAME_OCTETS {
        return None;
    }
    let name = s.to_ascii_lowercase();
    for label in name.split('.') {
        if label.is_empty()
            || label.len() > MAX_LABEL_OCTETS
            || !label
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
        {
            return None;
        }
    }
    Some(name)
}

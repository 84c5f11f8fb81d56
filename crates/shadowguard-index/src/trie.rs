//! Reverse-label suffix trie.
//!
//! Each node maps one label to a child; a path from the root spells a domain
//! TLD-first. A node carries an end-of-domain bit for exact rules and a
//! wildcard bit for `*.domain` rules, each with its rule-origin tag. Exact
//! beats wildcard; a wildcard matches strict subdomains only.

use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of a trie walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TrieMatch {
    /// No rule covers the queried name.
    Miss,
    /// The name itself is indexed.
    Exact(Option<Arc<str>>),
    /// A `*.suffix` ancestor covers the name.
    Wildcard(Option<Arc<str>>),
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<Box<str>, TrieNode>,
    /// End-of-domain bit: an exact rule terminates here.
    terminal: bool,
    /// Wildcard bit: a `*.` rule terminates here.
    wildcard: bool,
    exact_tag: Option<Arc<str>>,
    wildcard_tag: Option<Arc<str>>,
}

/// Immutable-after-build suffix trie.
#[derive(Debug, Default)]
pub(crate) struct SuffixTrie {
    root: TrieNode,
    distinct: usize,
}

impl SuffixTrie {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a domain; `wildcard` distinguishes `*.name` from `name`.
    /// Returns true when this (name, flavor) was not present before.
    pub(crate) fn insert(
        &mut self,
        labels_reversed: impl Iterator<Item = impl AsRef<str>>,
        wildcard: bool,
        tag: Option<Arc<str>>,
    ) -> bool {
        let mut node = &mut self.root;
        for label in labels_reversed {
            node = node
                .children
                .entry(Box::from(label.as_ref()))
                .or_default();
        }

        let fresh = if wildcard {
            let fresh = !node.wildcard;
            node.wildcard = true;
            if node.wildcard_tag.is_none() {
                node.wildcard_tag = tag;
            }
            fresh
        } else {
            let fresh = !node.terminal;
            node.terminal = true;
            if node.exact_tag.is_none() {
                node.exact_tag = tag;
            }
            fresh
        };

        if fresh {
            self.distinct += 1;
        }
        fresh
    }

    /// Walk the trie over the query's reversed labels.
    ///
    /// Remembers the deepest wildcard ancestor passed with labels still left
    /// to consume (a wildcard never matches its own base name). On consuming
    /// every label, the end-of-domain bit decides an exact hit; otherwise the
    /// remembered wildcard, if any, wins.
    pub(crate) fn lookup<'a>(&self, labels_reversed: impl Iterator<Item = &'a str>) -> TrieMatch {
        let labels: Vec<&str> = labels_reversed.collect();
        let mut node = &self.root;
        let mut best_wildcard: Option<&TrieNode> = None;

        for (depth, label) in labels.iter().enumerate() {
            match node.children.get(*label) {
                Some(child) => {
                    // Strict-subdomain check: more labels must remain.
                    if child.wildcard && depth + 1 < labels.len() {
                        best_wildcard = Some(child);
                    }
                    node = child;
                }
                None => {
                    return match best_wildcard {
                        Some(n) => TrieMatch::Wildcard(n.wildcard_tag.clone()),
                        None => TrieMatch::Miss,
                    };
                }
            }
        }

        if node.terminal {
            TrieMatch::Exact(node.exact_tag.clone())
        } else if let Some(n) = best_wildcard {
            TrieMatch::Wildcard(n.wildcard_tag.clone())
        } else {
            TrieMatch::Miss
        }
    }

    /// Count of distinct (name, flavor) entries.
    pub(crate) const fn len(&self) -> usize {
        self.distinct
    }
}

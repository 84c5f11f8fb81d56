//! Immutable rule snapshots and their atomic publication.

use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::bloom::{BloomFilter, SuffixHasher};
use crate::domain::{normalize_query, Domain};
use crate::trie::{SuffixTrie, TrieMatch};

/// Result of a lookup. Total: unparseable queries are simply not blocked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainMatch {
    /// Whether any rule in the snapshot covers the domain.
    pub blocked: bool,
    /// Origin tag of the matching rule, exact rule preferred.
    pub rule_tag: Option<Arc<str>>,
}

/// Monotonic counters for the fast/slow path split.
#[derive(Debug, Default)]
struct IndexStats {
    bloom_rejects: AtomicU64,
    trie_hits: AtomicU64,
}

/// Point-in-time view of the index counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStatsSnapshot {
    /// Lookups rejected by the Bloom filter without touching the trie.
    pub bloom_rejects: u64,
    /// Lookups answered positively by the trie.
    pub trie_hits: u64,
}

/// One immutable (Bloom filter, trie) pair for a rule snapshot.
#[derive(Debug)]
pub struct Snapshot {
    bloom: BloomFilter,
    trie: SuffixTrie,
    stats: IndexStats,
}

impl Snapshot {
    /// Build a snapshot from compiled block rules.
    ///
    /// Fails fast with `InvalidDomain` via `Domain::parse` done by callers;
    /// entries arriving here are already normalized. Duplicate entries
    /// collapse; the first tag for a (name, flavor) wins.
    pub fn build(rules: impl IntoIterator<Item = (Domain, Option<Arc<str>>)>) -> Self {
        let entries: Vec<(Domain, Option<Arc<str>>)> = rules.into_iter().collect();

        let mut bloom = BloomFilter::with_capacity(entries.len());
        let mut trie = SuffixTrie::new();

        for (domain, tag) in entries {
            // Bloom keys every indexed name; wildcard and exact share one key.
            bloom.insert_hash(crate::bloom::domain_key_hash(domain.name()));
            trie.insert(domain.labels_reversed(), domain.is_wildcard(), tag);
        }

        debug!(domains = trie.len(), "built domain index snapshot");

        Self {
            bloom,
            trie,
            stats: IndexStats::default(),
        }
    }

    /// An empty snapshot (matches nothing).
    pub fn empty() -> Self {
        Self::build(std::iter::empty())
    }

    /// Look up a domain. Safe for concurrent use from many readers.
    pub fn lookup(&self, domain: &str) -> DomainMatch {
        let Some(name) = normalize_query(domain) else {
            return DomainMatch::default();
        };

        // Fast negative path: probe the filter at every label boundary of
        // the reversed name. All-negative means no suffix of the query is
        // indexed, so the trie cannot match either.
        let mut hasher = SuffixHasher::new();
        let mut any_hit = false;
        for label in name.rsplit('.') {
            let state = hasher.feed_label(label);
            if self.bloom.contains_hash(state) {
                any_hit = true;
                break;
            }
        }
        if !any_hit {
            self.stats.bloom_rejects.fetch_add(1, Ordering::Relaxed);
            return DomainMatch::default();
        }

        match self.trie.lookup(name.rsplit('.')) {
            TrieMatch::Exact(tag) | TrieMatch::Wildcard(tag) => {
                self.stats.trie_hits.fetch_add(1, Ordering::Relaxed);
                DomainMatch {
                    blocked: true,
                    rule_tag: tag,
                }
            }
            TrieMatch::Miss => DomainMatch::default(),
        }
    }

    /// Number of distinct indexed (name, flavor) entries.
    pub fn total_domains(&self) -> usize {
        self.trie.len()
    }

    /// Monotonic counter values.
    pub fn stats(&self) -> IndexStatsSnapshot {
        IndexStatsSnapshot {
            bloom_rejects: self.stats.bloom_rejects.load(Ordering::Relaxed),
            trie_hits: self.stats.trie_hits.load(Ordering::Relaxed),
        }
    }
}

/// Atomically swappable handle to the live snapshot.
///
/// `publish` is a release-store pointer swap; `load` is an acquire-load, so
/// readers always observe a fully built (Bloom, trie) pair and never block.
///
/// The handle also keeps the stats counters monotonic across swaps: a
/// retired snapshot's counts fold into a running total at publish time.
#[derive(Debug)]
pub struct SharedIndex {
    current: ArcSwap<Snapshot>,
    retired_bloom_rejects: AtomicU64,
    retired_trie_hits: AtomicU64,
}

impl SharedIndex {
    /// Start with the given snapshot.
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(snapshot),
            retired_bloom_rejects: AtomicU64::new(0),
            retired_trie_hits: AtomicU64::new(0),
        }
    }

    /// The current snapshot; cheap enough for per-packet use.
    pub fn load(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Swap in a freshly built snapshot. In-flight readers keep the one
    /// they loaded.
    pub fn publish(&self, snapshot: Snapshot) {
        self.publish_arc(Arc::new(snapshot));
    }

    /// Publish a snapshot already shared elsewhere (the filter engine keeps
    /// the same `Arc` inside its compiled rule set).
    pub fn publish_arc(&self, snapshot: Arc<Snapshot>) {
        let retired = self.current.swap(snapshot);
        // Readers still holding the retired snapshot may bump its counters
        // a little longer; those late increments are the only ones lost.
        let stats = retired.stats();
        self.retired_bloom_rejects
            .fetch_add(stats.bloom_rejects, Ordering::Relaxed);
        self.retired_trie_hits
            .fetch_add(stats.trie_hits, Ordering::Relaxed);
    }

    /// Counters across every snapshot this handle has published.
    pub fn stats(&self) -> IndexStatsSnapshot {
        let current = self.current.load().stats();
        IndexStatsSnapshot {
            bloom_rejects: self.retired_bloom_rejects.load(Ordering::Relaxed)
                + current.bloom_rejects,
            trie_hits: self.retired_trie_hits.load(Ordering::Relaxed) + current.trie_hits,
        }
    }
}

impl Default for SharedIndex {
    fn default() -> Self {
        Self::new(Snapshot::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(domains: &[&str]) -> Snapshot {
        Snapshot::build(domains.iter().map(|d| {
            (
                Domain::parse(d).unwrap(),
                Some(Arc::<str>::from(format!("rule:{d}"))),
            )
        }))
    }

    #[test]
    fn test_index_consistency() {
        let domains = ["doubleclick.net", "ads.example.com", "tracker.io"];
        let snap = build(&domains);

        for d in domains {
            assert!(snap.lookup(d).blocked, "{d} should match");
        }
        assert!(!snap.lookup("wikipedia.org").blocked);
        assert!(!snap.lookup("example.com").blocked);
        assert_eq!(snap.total_domains(), 3);
    }

    #[test]
    fn test_wildcard_semantics() {
        let snap = build(&["*.example.com"]);
        assert!(snap.lookup("x.y.example.com").blocked);
        assert!(snap.lookup("x.example.com").blocked);
        assert!(!snap.lookup("example.com").blocked);
        assert!(!snap.lookup("notexample.com").blocked);
    }

    #[test]
    fn test_exact_wins_tag() {
        let snap = Snapshot::build([
            (Domain::parse("*.example.com").unwrap(), Some(Arc::from("wild"))),
            (
                Domain::parse("api.example.com").unwrap(),
                Some(Arc::from("exact")),
            ),
        ]);

        let m = snap.lookup("api.example.com");
        assert!(m.blocked);
        assert_eq!(m.rule_tag.as_deref(), Some("exact"));
    }

    #[test]
    fn test_case_and_trailing_dot_folded() {
        let snap = build(&["Ads.Example.COM"]);
        assert!(snap.lookup("ads.example.com").blocked);
        assert!(snap.lookup("ADS.EXAMPLE.COM.").blocked);
    }

    #[test]
    fn test_invalid_query_is_non_match() {
        let snap = build(&["example.com"]);
        assert!(!snap.lookup("").blocked);
        assert!(!snap.lookup("not a domain").blocked);
    }

    #[test]
    fn test_stats_counters() {
        let snap = build(&["doubleclick.net"]);

        assert!(snap.lookup("doubleclick.net").blocked);
        assert!(!snap.lookup("wikipedia.org").blocked);
        assert!(!snap.lookup("en.wikipedia.org").blocked);

        let stats = snap.stats();
        assert_eq!(stats.trie_hits, 1);
        assert_eq!(stats.bloom_rejects, 2);
    }

    #[test]
    fn test_bloom_soundness_under_wildcards() {
        // Bloom must not reject anything the trie would match.
        let snap = build(&["*.google.com", "doubleclick.net"]);
        for q in [
            "ads.google.com",
            "a.b.c.google.com",
            "doubleclick.net",
        ] {
            assert!(snap.lookup(q).blocked, "{q}");
        }
    }

    #[test]
    fn test_shared_index_swap() {
        let shared = SharedIndex::new(build(&["old.example"]));
        let before = shared.load();
        assert!(before.lookup("old.example").blocked);

        shared.publish(build(&["new.example"]));

        // The held snapshot is unchanged; a fresh load sees the new rules.
        assert!(before.lookup("old.example").blocked);
        let after = shared.load();
        assert!(!after.lookup("old.example").blocked);
        assert!(after.lookup("new.example").blocked);
    }

    #[test]
    fn test_shared_index_stats_monotonic_across_swaps() {
        let shared = SharedIndex::new(build(&["a.example"]));
        let snap = shared.load();
        assert!(snap.lookup("a.example").blocked); // trie hit
        assert!(!snap.lookup("other.example").blocked); // bloom reject
        drop(snap);

        shared.publish(build(&["b.example"]));
        let snap = shared.load();
        assert!(snap.lookup("b.example").blocked);

        let stats = shared.stats();
        assert_eq!(stats.trie_hits, 2);
        assert_eq!(stats.bloom_rejects, 1);
    }

    #[test]
    fn test_concurrent_readers() {
        let snap = Arc::new(build(&["*.ads.example", "tracker.example"]));
        let mut handles = Vec::new();
        for i in 0..8 {
            let snap = snap.clone();
            handles.push(std::thread::spawn(move || {
                for j in 0..1000 {
                    let q = format!("h{i}x{j}.ads.example");
                    assert!(snap.lookup(&q).blocked);
                    assert!(!snap.lookup("clean.example").blocked);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}

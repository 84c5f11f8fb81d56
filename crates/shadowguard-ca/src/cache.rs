//! Leaf cache: TTL + bulk LRU eviction.
//!
//! One mutex, O(1) lookups, and a sort only when the soft cap trips. The
//! critical section never includes minting; callers mint outside the lock
//! and race benignly (last insert wins, both leaves are valid).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::leaf::LeafCert;

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub size: u64,
    pub hits: u64,
    pub misses: u64,
}

/// Domain → leaf map with TTL expiry and oldest-25% eviction at the cap.
pub struct LeafCache {
    entries: Mutex<HashMap<String, Arc<LeafCert>>>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LeafCache {
    /// Cache with the given TTL and soft cap.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch a live entry. Expired entries are removed and count as misses.
    pub fn get(&self, domain: &str) -> Option<Arc<LeafCert>> {
        let mut entries = self.entries.lock();
        match entries.get(domain) {
            Some(leaf) if leaf.issued_at.elapsed() < self.ttl => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(leaf.clone())
            }
            Some(_) => {
                entries.remove(domain);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a freshly minted leaf, evicting the oldest quarter when the
    /// soft cap is reached.
    pub fn insert(&self, leaf: Arc<LeafCert>) {
        let mut entries = self.entries.lock();

        if entries.len() >= self.max_entries && !entries.contains_key(&leaf.domain) {
            let mut by_age: Vec<(String, Instant)> = entries
                .iter()
                .map(|(k, v)| (k.clone(), v.issued_at))
                .collect();
            by_age.sort_by_key(|(_, issued)| *issued);

            let evict = (self.max_entries / 4).max(1);
            for (domain, _) in by_age.into_iter().take(evict) {
                entries.remove(&domain);
            }
            debug!(evicted = evict, "leaf cache evicted oldest entries");
        }

        entries.insert(leaf.domain.clone(), leaf);
    }

    /// Drop everything (root rotation, shutdown).
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            size: self.entries.lock().len() as u64,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for LeafCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafCache")
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zeroize::Zeroizing;

    fn leaf(domain: &str, issued_at: Instant) -> Arc<LeafCert> {
        Arc::new(LeafCert {
            domain: domain.to_string(),
            cert_der: vec![0x30],
            key_pkcs8: Zeroizing::new(Vec::new()),
            chain_der: Vec::new(),
            issued_at,
        })
    }

    #[test]
    fn test_hit_and_miss_counters() {
        let cache = LeafCache::new(Duration::from_secs(60), 10);
        assert!(cache.get("a.example").is_none());

        cache.insert(leaf("a.example", Instant::now()));
        assert!(cache.get("a.example").is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = LeafCache::new(Duration::ZERO, 10);
        cache.insert(leaf("a.example", Instant::now()));
        // Zero TTL: everything is already expired.
        assert!(cache.get("a.example").is_none());
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_eviction_removes_oldest_quarter() {
        let cache = LeafCache::new(Duration::from_secs(3600), 8);
        let base = Instant::now();
        for i in 0..8 {
            cache.insert(leaf(
                &format!("d{i}.example"),
                base + Duration::from_secs(i),
            ));
        }
        assert_eq!(cache.stats().size, 8);

        // At the cap: inserting a new domain evicts the two oldest.
        cache.insert(leaf("new.example", base + Duration::from_secs(100)));
        assert_eq!(cache.stats().size, 7);
        assert!(cache.get("d0.example").is_none());
        assert!(cache.get("d1.example").is_none());
        assert!(cache.get("d2.example").is_some());
        assert!(cache.get("new.example").is_some());
    }

    #[test]
    fn test_reinsert_at_cap_does_not_evict() {
        let cache = LeafCache::new(Duration::from_secs(3600), 4);
        let base = Instant::now();
        for i in 0..4 {
            cache.insert(leaf(&format!("d{i}.example"), base + Duration::from_secs(i)));
        }
        // Refreshing an existing domain replaces in place.
        cache.insert(leaf("d3.example", base + Duration::from_secs(50)));
        assert_eq!(cache.stats().size, 4);
        assert!(cache.get("d0.example").is_some());
    }

    #[test]
    fn test_clear() {
        let cache = LeafCache::new(Duration::from_secs(60), 10);
        cache.insert(leaf("a.example", Instant::now()));
        cache.clear();
        assert_eq!(cache.stats().size, 0);
    }
}

//! Atomic stats counters for the hot paths.
//!
//! Counters are plain relaxed atomics: the hot path bumps them without
//! locking and the UI shell reads an eventually-consistent snapshot.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters owned by the proxy and packet pipeline.
#[derive(Debug, Default)]
pub struct CoreStats {
    /// Requests and packets blocked.
    pub blocked_total: AtomicU64,
    /// Requests and packets allowed through.
    pub allowed_total: AtomicU64,
    /// Requests answered with a rule redirect instead of a block.
    pub redirected_total: AtomicU64,
    /// Rough bytes-not-downloaded estimate for blocked requests.
    pub bytes_saved_estimate: AtomicU64,
}

impl CoreStats {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a blocked request with an estimated payload size.
    pub fn record_blocked(&self, bytes_saved: u64) {
        self.blocked_total.fetch_add(1, Ordering::Relaxed);
        self.bytes_saved_estimate
            .fetch_add(bytes_saved, Ordering::Relaxed);
    }

    /// Record an allowed request.
    pub fn record_allowed(&self) {
        self.allowed_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a redirected request. The original payload still went
    /// unfetched, so it counts toward the bytes-saved estimate.
    pub fn record_redirected(&self, bytes_saved: u64) {
        self.redirected_total.fetch_add(1, Ordering::Relaxed);
        self.bytes_saved_estimate
            .fetch_add(bytes_saved, Ordering::Relaxed);
    }
}

/// Point-in-time view of every stats key the shell displays.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub blocked_total: u64,
    pub allowed_total: u64,
    pub redirected_total: u64,
    pub bytes_saved_estimate: u64,
    pub domains_indexed: u64,
    pub bloom_rejects: u64,
    pub trie_hits: u64,
    pub leaf_cache_size: u64,
    pub leaf_cache_hits: u64,
    pub leaf_cache_misses: u64,
}

impl CoreStats {
    /// Fold the proxy counters into a snapshot; the caller fills in the
    /// index and leaf-cache gauges from their owners.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            blocked_total: self.blocked_total.load(Ordering::Relaxed),
            allowed_total: self.allowed_total.load(Ordering::Relaxed),
            redirected_total: self.redirected_total.load(Ordering::Relaxed),
            bytes_saved_estimate: self.bytes_saved_estimate.load(Ordering::Relaxed),
            ..StatsSnapshot::default()
        }
    }
}

//! shadowguard-index: "does any rule match this domain?" in O(L).
//!
//! The index is a (Bloom filter, reverse-label trie) pair built once per rule
//! snapshot. The Bloom filter gives the fast negative path: the overwhelming
//! majority of observed hostnames match nothing, and most of those are
//! rejected after a handful of hash probes without touching the trie. The
//! trie then answers exact and `*.wildcard` suffix matches, exact winning.
//!
//! Snapshots are immutable after `build`; publication is a single atomic
//! pointer swap (`SharedIndex`), so readers never block and removals are
//! rebuild-only.

pub mod bloom;
pub mod domain;
pub mod error;
pub mod snapshot;
pub mod trie;

pub use domain::Domain;
pub use error::IndexError;
pub use snapshot::{DomainMatch, IndexStatsSnapshot, SharedIndex, Snapshot};

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

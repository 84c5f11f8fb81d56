//! shadowguard-core: shared plumbing for the ShadowGuard interception core.
//!
//! This crate holds the pieces every subsystem needs but none owns:
//! configuration (validated snapshots, TOML loading), the `KeyStore` port
//! behind which the platform persists root CA material, the `ProxyEvents`
//! delegate bundle the shell uses to observe proxy activity, and the atomic
//! stats counters surfaced to the UI.
//!
//! Nothing in here touches the network. The interesting machinery lives in
//! the subsystem crates (`shadowguard-index`, `shadowguard-ca`,
//! `shadowguard-filter`, `shadowguard-inspect`, `shadowguard-proxy`).

pub mod config;
pub mod error;
pub mod events;
pub mod keystore;
pub mod sink;
pub mod stats;

pub use config::{Config, RuleSource};
pub use error::ConfigError;
pub use events::ProxyEvents;
pub use keystore::{FileKeyStore, KeyStore, KeyStoreError, MemoryKeyStore};
pub use sink::{BoundedSink, ProxyEvent};
pub use stats::{CoreStats, StatsSnapshot};

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

//! ShadowGuard traffic interception core.
//!
//! A system-wide on-device ad/tracker/malware blocker, exposed as one
//! explicitly constructed [`Core`]: the shell supplies configuration, a
//! keystore and observation hooks, and gets back packet classification, a
//! local MITM proxy, a compiled blocklist index and an on-device CA.
//!
//! ```rust,ignore
//! use shadowguard::{Config, Core, MemoryKeyStore, ProxyEvents};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), shadowguard::CoreError> {
//! let mut config = Config::default();
//! config.rule_sources.push(shadowguard::RuleSource {
//!     id: "easylist".into(),
//!     enabled: true,
//!     text: "||doubleclick.net^".into(),
//! });
//!
//! let core = Core::new(config, Arc::new(MemoryKeyStore::new()), ProxyEvents::noop()).await?;
//! let addr = core.start().await?;
//!
//! // Hand the root to the platform trust UI, packets to classify(), and
//! // redirected TCP flows to the listener at `addr`.
//! let _pem = core.export_root_pem();
//! # Ok(())
//! # }
//! ```

mod core;
mod error;

pub use crate::core::Core;
pub use error::CoreError;

// Re-export the public surface of the subsystem crates.
pub use shadowguard_ca::{CaError, CertificateAuthority};
pub use shadowguard_core::{
    BoundedSink, Config, ConfigError, CoreStats, FileKeyStore, KeyStore, KeyStoreError,
    MemoryKeyStore, ProxyEvent, ProxyEvents, RuleSource, StatsSnapshot,
};
pub use shadowguard_filter::{
    CompiledRules, CosmeticRule, FilterDecision, FilterError, RequestContext, ResourceType,
    RuleCompiler,
};
pub use shadowguard_index::{Domain, DomainMatch, IndexError, SharedIndex, Snapshot};
pub use shadowguard_inspect::{Decision, Inspector, IpFamily};
pub use shadowguard_proxy::{ProxyError, ProxyServer, ProxySettings};

// Re-export the runtime for shell convenience.
pub use tokio;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

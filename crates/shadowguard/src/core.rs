//! Explicit wiring of the four subsystems.
//!
//! There are no global singletons anywhere in the core: the shell calls
//! `Core::new` with its collaborators and owns the result. Rule reloads
//! rebuild a snapshot and publish it atomically to both consumers (the
//! proxy for new connections, the shared index for the packet pipeline).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use shadowguard_ca::CertificateAuthority;
use shadowguard_core::{Config, CoreStats, KeyStore, ProxyEvents, RuleSource, StatsSnapshot};
use shadowguard_filter::{CompiledRules, RuleCompiler};
use shadowguard_index::SharedIndex;
use shadowguard_inspect::{Decision, Inspector, IpFamily};
use shadowguard_proxy::{ProxyServer, ProxySettings};

/// The assembled interception core.
pub struct Core {
    config: Config,
    keystore: Arc<dyn KeyStore>,
    ca: Arc<CertificateAuthority>,
    stats: Arc<CoreStats>,
    shared_index: Arc<SharedIndex>,
    inspector: Inspector,
    proxy: ProxyServer,
}

impl Core {
    /// Validate the config, load (or mint) the root CA, compile the rule
    /// sources and wire the subsystems. Nothing is bound or listening yet.
    pub async fn new(
        config: Config,
        keystore: Arc<dyn KeyStore>,
        events: ProxyEvents,
    ) -> crate::Result<Self> {
        config.validate()?;

        let ca = Arc::new(
            CertificateAuthority::load_or_create(
                keystore.as_ref(),
                Duration::from_secs(u64::from(config.cache_leaf_ttl_secs)),
                config.cache_leaf_max as usize,
            )
            .await?,
        );

        let rules = compile_sources(config.enabled_sources());

        let shared_index = Arc::new(SharedIndex::default());
        shared_index.publish_arc(rules.index());
        let inspector = Inspector::new(shared_index.clone());

        let stats = Arc::new(CoreStats::new());
        let proxy = ProxyServer::new(
            ProxySettings {
                bind_port: config.proxy_port,
                bypass_patterns: config.bypass_patterns.clone(),
                origin_verify_system_trust: config.origin_verify_system_trust,
                ..ProxySettings::default()
            },
            ca.clone(),
            rules,
            events,
            stats.clone(),
        );

        info!(
            proxy_port = config.proxy_port,
            sources = config.rule_sources.len(),
            "core assembled"
        );

        Ok(Self {
            config,
            keystore,
            ca,
            stats,
            shared_index,
            inspector,
            proxy,
        })
    }

    /// Start the proxy listener; returns the bound address.
    pub async fn start(&self) -> crate::Result<SocketAddr> {
        Ok(self.proxy.start().await?)
    }

    /// Stop the proxy, cancelling all in-flight connections.
    pub async fn stop(&self) {
        self.proxy.stop().await;
    }

    /// Classify one raw packet from the platform tunnel.
    pub fn classify(&self, packet: &[u8], family: IpFamily) -> Decision {
        self.inspector.classify(packet, family)
    }

    /// Recompile rule sources and publish the snapshot atomically. New
    /// connections and subsequent packets see it; in-flight connections
    /// finish on the snapshot they started with.
    pub fn reload_rules<'a>(&self, sources: impl IntoIterator<Item = &'a RuleSource>) {
        let rules = Arc::new(compile_sources(sources));
        self.shared_index.publish_arc(rules.index());
        self.proxy.reload_rules(rules);
    }

    /// The compiled snapshot new connections will observe.
    pub fn current_rules(&self) -> Arc<CompiledRules> {
        self.proxy.current_rules()
    }

    /// Root certificate as PEM for the trust-installation UX.
    pub fn export_root_pem(&self) -> String {
        self.ca.export_root_pem()
    }

    /// Delete the persisted root and flush all leaves. The next `Core::new`
    /// generates a fresh root.
    pub async fn delete_root(&self) -> crate::Result<()> {
        Ok(self.ca.delete_root(self.keystore.as_ref()).await?)
    }

    /// Assemble every stats key from its owning subsystem.
    pub fn stats(&self) -> StatsSnapshot {
        let mut snap = self.stats.snapshot();

        snap.domains_indexed = self.shared_index.load().total_domains() as u64;
        let index_stats = self.shared_index.stats();
        snap.bloom_rejects = index_stats.bloom_rejects;
        snap.trie_hits = index_stats.trie_hits;

        let cache = self.ca.cache_stats();
        snap.leaf_cache_size = cache.size;
        snap.leaf_cache_hits = cache.hits;
        snap.leaf_cache_misses = cache.misses;

        snap
    }

    /// The active configuration snapshot.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("proxy_port", &self.config.proxy_port)
            .finish_non_exhaustive()
    }
}

fn compile_sources<'a>(sources: impl IntoIterator<Item = &'a RuleSource>) -> CompiledRules {
    RuleCompiler::compile(
        sources
            .into_iter()
            .map(|s| (s.id.as_str(), s.text.as_str()))
            .collect::<Vec<_>>(),
    )
}

//! The certificate authority facade the proxy talks to.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use shadowguard_core::KeyStore;

use crate::cache::{CacheStatsSnapshot, LeafCache};
use crate::leaf::{self, LeafCert};
use crate::root::RootAuthority;

/// Root authority plus the leaf cache in front of it.
///
/// `mint_leaf` is synchronous and CPU-bound on a miss (one P-256 keygen and
/// one signature); connection tasks call it through `spawn_blocking` so the
/// executor threads stay responsive.
#[derive(Debug)]
pub struct CertificateAuthority {
    root: RootAuthority,
    cache: LeafCache,
}

impl CertificateAuthority {
    /// Load or create the root and wrap it with a leaf cache.
    pub async fn load_or_create(
        keystore: &dyn KeyStore,
        leaf_ttl: Duration,
        leaf_cache_max: usize,
    ) -> crate::Result<Self> {
        let root = RootAuthority::load_or_create(keystore).await?;
        Ok(Self {
            root,
            cache: LeafCache::new(leaf_ttl, leaf_cache_max),
        })
    }

    /// Cache-first leaf lookup; mints and caches on a miss.
    pub fn mint_leaf(&self, domain: &str) -> crate::Result<Arc<LeafCert>> {
        if let Some(leaf) = self.cache.get(domain) {
            return Ok(leaf);
        }

        let leaf = Arc::new(leaf::mint(&self.root, domain)?);
        debug!(domain = %leaf.domain, "minted leaf certificate");
        self.cache.insert(leaf.clone());
        Ok(leaf)
    }

    /// DER of the root certificate (for trust-store injection).
    pub fn root_cert_der(&self) -> &[u8] {
        self.root.cert_der()
    }

    /// Root certificate as PEM text.
    pub fn export_root_pem(&self) -> String {
        self.root.export_pem()
    }

    /// Remove the persisted root and flush every leaf minted under it.
    pub async fn delete_root(&self, keystore: &dyn KeyStore) -> crate::Result<()> {
        RootAuthority::delete(keystore).await?;
        self.cache.clear();
        Ok(())
    }

    /// Leaf cache counters.
    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.cache.stats()
    }
}

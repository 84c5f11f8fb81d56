//! rustls configuration for both interception sides.

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::sync::Arc;
use tracing::warn;

use shadowguard_ca::LeafCert;

use crate::error::ProxyError;

/// ALPN protocols offered to intercepted clients.
const CLIENT_FACING_ALPN: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Server config presenting a minted leaf; ALPN `h2, http/1.1`, TLS 1.2–1.3
/// (the rustls defaults).
pub(crate) fn server_config_for_leaf(leaf: &LeafCert) -> crate::Result<Arc<ServerConfig>> {
    let chain: Vec<CertificateDer<'static>> = leaf
        .chain_der
        .iter()
        .map(|der| CertificateDer::from(der.clone()))
        .collect();
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf.key_pkcs8.to_vec()));

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)?;
    config.alpn_protocols = CLIENT_FACING_ALPN.iter().map(|p| p.to_vec()).collect();
    Ok(Arc::new(config))
}

/// Trust anchors for origin verification.
///
/// System trust plus any explicitly injected anchors. Verification is never
/// disabled: with system trust off, the explicit anchors are all there is,
/// and an empty store simply fails every handshake.
pub(crate) fn origin_root_store(
    use_system_trust: bool,
    extra_roots: &[Vec<u8>],
) -> Arc<RootCertStore> {
    let mut store = RootCertStore::empty();

    if use_system_trust {
        let loaded = rustls_native_certs::load_native_certs();
        for err in &loaded.errors {
            warn!(error = %err, "skipping unreadable system trust entry");
        }
        for cert in loaded.certs {
            // Individual unparsable anchors are skipped, not fatal.
            let _ = store.add(cert);
        }
    }

    for der in extra_roots {
        if store.add(CertificateDer::from(der.clone())).is_err() {
            warn!("skipping invalid extra origin trust anchor");
        }
    }

    Arc::new(store)
}

/// Client config for the origin side of an intercepted connection. The ALPN
/// list is pinned to whatever the client negotiated with us, since the
/// proxy relays decrypted bytes and cannot translate between HTTP versions.
pub(crate) fn origin_client_config(
    roots: Arc<RootCertStore>,
    alpn: Option<Vec<u8>>,
) -> Arc<ClientConfig> {
    let mut config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    if let Some(protocol) = alpn {
        config.alpn_protocols = vec![protocol];
    }
    Arc::new(config)
}

/// Map a hostname into rustls' server-name type.
pub(crate) fn server_name(host: &str) -> crate::Result<rustls::pki_types::ServerName<'static>> {
    rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|_| ProxyError::Tls(format!("invalid SNI host {host:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowguard_ca::CertificateAuthority;
    use shadowguard_core::MemoryKeyStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_server_config_from_leaf() {
        let ca = CertificateAuthority::load_or_create(
            &MemoryKeyStore::new(),
            Duration::from_secs(3600),
            10,
        )
        .await
        .unwrap();
        let leaf = ca.mint_leaf("example.com").unwrap();
        let config = server_config_for_leaf(&leaf).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
    }

    #[tokio::test]
    async fn test_origin_roots_with_extra_anchor() {
        let ca = CertificateAuthority::load_or_create(
            &MemoryKeyStore::new(),
            Duration::from_secs(3600),
            10,
        )
        .await
        .unwrap();
        let store = origin_root_store(false, &[ca.root_cert_der().to_vec()]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_empty_store_without_system_trust() {
        let store = origin_root_store(false, &[]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_server_name_rejects_garbage() {
        assert!(server_name("example.com").is_ok());
        assert!(server_name("bad host name").is_err());
    }
}

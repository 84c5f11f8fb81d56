//! Per-SNI leaf issuance.

use chrono::{Duration, Utc};
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use std::time::Instant;
use zeroize::Zeroizing;

use crate::error::CaError;
use crate::root::{self, RootAuthority};
use crate::x509::{self, TbsParams};

/// Leaf validity: one year, backdated a minute for clock skew.
const LEAF_VALIDITY_DAYS: i64 = 365;
const LEAF_BACKDATE_SECS: i64 = 60;

/// A minted leaf: certificate, fresh private key, and the chain the TLS
/// stack presents. The key zeroes on drop.
pub struct LeafCert {
    /// Hostname the leaf was minted for (lowercased).
    pub domain: String,
    /// Leaf certificate DER.
    pub cert_der: Vec<u8>,
    /// Leaf private key, PKCS#8 DER.
    pub key_pkcs8: Zeroizing<Vec<u8>>,
    /// Presentation chain: leaf first, then the root.
    pub chain_der: Vec<Vec<u8>>,
    /// When the leaf was minted, for cache TTL and eviction ordering.
    pub issued_at: Instant,
}

impl std::fmt::Debug for LeafCert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafCert")
            .field("domain", &self.domain)
            .field("cert_der_len", &self.cert_der.len())
            .finish_non_exhaustive()
    }
}

/// Mint a leaf for `domain`, signed by the root.
///
/// The SAN carries both the bare name and `*.<name>`, so one leaf covers a
/// host and its direct subdomains; the CN mirrors the bare name.
pub(crate) fn mint(root: &RootAuthority, domain: &str) -> crate::Result<LeafCert> {
    let domain = normalize_leaf_domain(domain)?;

    let key_pkcs8 = root::generate_pkcs8(root.rng())?;
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &key_pkcs8, root.rng())
        .map_err(|_| CaError::Keygen)?;

    let now = Utc::now();
    let wildcard = format!("*.{domain}");
    let spki = x509::spki_p256(key_pair.public_key().as_ref());
    let subject_dn = x509::dn("US", "ShadowGuard", &domain);
    let extensions = vec![
        x509::basic_constraints(false),
        // digitalSignature | keyEncipherment
        x509::key_usage(0xa0),
        x509::eku_server_auth(),
        x509::san_dns(&[&domain, &wildcard]),
    ];

    let tbs = x509::tbs_certificate(&TbsParams {
        serial: x509::random_serial(root.rng())?,
        issuer_dn: root.subject_dn(),
        subject_dn: &subject_dn,
        not_before: now - Duration::seconds(LEAF_BACKDATE_SECS),
        not_after: now + Duration::days(LEAF_VALIDITY_DAYS),
        spki: &spki,
        extensions: &extensions,
    });

    let signature = root.sign(&tbs)?;
    let cert_der = x509::certificate(&tbs, &signature);
    let chain_der = vec![cert_der.clone(), root.cert_der().to_vec()];

    Ok(LeafCert {
        domain,
        cert_der,
        key_pkcs8,
        chain_der,
        issued_at: Instant::now(),
    })
}

/// Leaves are minted for concrete SNI hostnames only.
fn normalize_leaf_domain(domain: &str) -> crate::Result<String> {
    let name = domain.trim().trim_end_matches('.').to_ascii_lowercase();
    if name.is_empty() || name.len() > 253 {
        return Err(CaError::InvalidDomain(domain.to_string()));
    }
    for label in name.split('.') {
        if label.is_empty()
            || label.len() > 63
            || !label
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(CaError::InvalidDomain(domain.to_string()));
        }
    }
    Ok(name)
}

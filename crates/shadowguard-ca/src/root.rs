//! The persistent self-signed root.
//!
//! Exactly one root exists per install, keyed in the platform keystore under
//! fixed labels. Losing or regenerating it invalidates every leaf, so the
//! leaf cache is flushed whenever the root changes hands.

use base64::Engine;
use chrono::{Duration, Utc};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING};
use tracing::info;
use zeroize::Zeroizing;

use shadowguard_core::KeyStore;

use crate::error::CaError;
use crate::x509::{self, TbsParams};

/// Keystore label for the root private key (PKCS#8 DER).
pub const ROOT_KEY_LABEL: &str = "shadowguard.root.key";
/// Keystore label for the root certificate (DER).
pub const ROOT_CERT_LABEL: &str = "shadowguard.root.cert";

const ROOT_COMMON_NAME: &str = "ShadowGuard Root CA";
const ORGANIZATION: &str = "ShadowGuard";
const COUNTRY: &str = "US";

/// Root validity: ten years.
const ROOT_VALIDITY_DAYS: i64 = 3650;

/// The loaded root: signing key plus its self-signed certificate.
pub struct RootAuthority {
    key_pair: EcdsaKeyPair,
    pkcs8: Zeroizing<Vec<u8>>,
    cert_der: Vec<u8>,
    subject_dn: Vec<u8>,
    rng: SystemRandom,
}

impl RootAuthority {
    /// Load the persisted root, or generate and persist a fresh one.
    /// Idempotent: a second call returns the same material.
    pub async fn load_or_create(keystore: &dyn KeyStore) -> crate::Result<Self> {
        let rng = SystemRandom::new();
        let subject_dn = x509::dn(COUNTRY, ORGANIZATION, ROOT_COMMON_NAME);

        let stored_key = keystore.get(ROOT_KEY_LABEL).await?;
        let stored_cert = keystore.get(ROOT_CERT_LABEL).await?;

        if let (Some(key_bytes), Some(cert_der)) = (stored_key, stored_cert) {
            let pkcs8 = Zeroizing::new(key_bytes);
            let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &pkcs8, &rng)
                .map_err(|e| CaError::BadStoredKey(e.to_string()))?;
            return Ok(Self {
                key_pair,
                pkcs8,
                cert_der,
                subject_dn,
                rng,
            });
        }

        // Fresh install (or partial state from an interrupted write, which
        // regeneration repairs).
        let pkcs8 = generate_pkcs8(&rng)?;
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &pkcs8, &rng)
            .map_err(|_| CaError::Keygen)?;

        let cert_der = self_sign(&key_pair, &rng, &subject_dn)?;

        keystore.put(ROOT_KEY_LABEL, &pkcs8).await?;
        keystore.put(ROOT_CERT_LABEL, &cert_der).await?;
        info!(subject = ROOT_COMMON_NAME, "generated new root certificate");

        Ok(Self {
            key_pair,
            pkcs8,
            cert_der,
            subject_dn,
            rng,
        })
    }

    /// Remove persisted root material. The caller flushes the leaf cache.
    pub async fn delete(keystore: &dyn KeyStore) -> crate::Result<()> {
        keystore.delete(ROOT_KEY_LABEL).await?;
        keystore.delete(ROOT_CERT_LABEL).await?;
        info!("deleted root certificate material");
        Ok(())
    }

    /// DER of the root certificate.
    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    /// Encoded subject DN, spliced into every leaf as the issuer.
    pub(crate) fn subject_dn(&self) -> &[u8] {
        &self.subject_dn
    }

    pub(crate) fn rng(&self) -> &SystemRandom {
        &self.rng
    }

    /// Sign a TBS with the root key. Retried once before giving up.
    pub(crate) fn sign(&self, tbs: &[u8]) -> crate::Result<Vec<u8>> {
        for _ in 0..2 {
            if let Ok(sig) = self.key_pair.sign(&self.rng, tbs) {
                return Ok(sig.as_ref().to_vec());
            }
        }
        Err(CaError::Sign)
    }

    /// Root certificate as PEM: 64-column base64 between CERTIFICATE
    /// delimiters.
    pub fn export_pem(&self) -> String {
        let b64 = base64::engine::general_purpose::STANDARD.encode(&self.cert_der);
        let mut out = String::with_capacity(b64.len() + b64.len() / 64 + 64);
        out.push_str("-----BEGIN CERTIFICATE-----\n");
        for chunk in b64.as_bytes().chunks(64) {
            // base64 output is ASCII.
            out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
            out.push('\n');
        }
        out.push_str("-----END CERTIFICATE-----\n");
        out
    }
}

impl std::fmt::Debug for RootAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material through Debug output.
        f.debug_struct("RootAuthority")
            .field("cert_der_len", &self.cert_der.len())
            .finish_non_exhaustive()
    }
}

/// Generate a P-256 key pair, retrying once.
pub(crate) fn generate_pkcs8(rng: &SystemRandom) -> crate::Result<Zeroizing<Vec<u8>>> {
    for _ in 0..2 {
        if let Ok(doc) = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, rng) {
            return Ok(Zeroizing::new(doc.as_ref().to_vec()));
        }
    }
    Err(CaError::Keygen)
}

/// Build and self-sign the root certificate.
fn self_sign(
    key_pair: &EcdsaKeyPair,
    rng: &SystemRandom,
    subject_dn: &[u8],
) -> crate::Result<Vec<u8>> {
    use ring::signature::KeyPair as _;

    let now = Utc::now();
    let spki = x509::spki_p256(key_pair.public_key().as_ref());
    let extensions = vec![
        x509::basic_constraints(true),
        // keyCertSign | cRLSign
        x509::key_usage(0x06),
    ];

    let tbs = x509::tbs_certificate(&TbsParams {
        serial: x509::random_serial(rng)?,
        issuer_dn: subject_dn,
        subject_dn,
        not_before: now - Duration::seconds(60),
        not_after: now + Duration::days(ROOT_VALIDITY_DAYS),
        spki: &spki,
        extensions: &extensions,
    });

    let mut signature = None;
    for _ in 0..2 {
        if let Ok(sig) = key_pair.sign(rng, &tbs) {
            signature = Some(sig);
            break;
        }
    }
    let signature = signature.ok_or(CaError::Sign)?;

    Ok(x509::certificate(&tbs, signature.as_ref()))
}

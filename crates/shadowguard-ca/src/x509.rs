//! X.509 v3 structure assembly on top of the DER builder.
//!
//! Shared by root self-signing and leaf issuance. Field order follows
//! RFC 5280 TBSCertificate; the issuer DN is always spliced in as
//! already-encoded bytes so leaves carry the root subject byte-identically.

use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};

use crate::der;
use crate::error::CaError;
use crate::oid;

/// AlgorithmIdentifier for ecdsa-with-SHA256. ECDSA omits the parameters
/// field entirely (RFC 5758 §3.2).
pub(crate) fn alg_ecdsa_sha256() -> Vec<u8> {
    der::sequence(&[der::oid(oid::ECDSA_WITH_SHA256)])
}

/// SubjectPublicKeyInfo for an uncompressed P-256 point.
pub(crate) fn spki_p256(public_point: &[u8]) -> Vec<u8> {
    der::sequence(&[
        der::sequence(&[der::oid(oid::EC_PUBLIC_KEY), der::oid(oid::PRIME256V1)]),
        der::bit_string(0, public_point),
    ])
}

/// Distinguished name `C=<c>, O=<o>, CN=<cn>`.
///
/// Country is a PrintableString per X.520; CN and O are UTF8Strings.
pub(crate) fn dn(country: &str, organization: &str, common_name: &str) -> Vec<u8> {
    let atv = |oid_arcs: &[u64], value: Vec<u8>| {
        der::set_of(&[der::sequence(&[der::oid(oid_arcs), value])])
    };
    der::sequence(&[
        atv(oid::AT_COUNTRY, der::printable_string(country)),
        atv(oid::AT_ORGANIZATION, der::utf8_string(organization)),
        atv(oid::AT_COMMON_NAME, der::utf8_string(common_name)),
    ])
}

/// One Extension SEQUENCE; the value is wrapped in an OCTET STRING here.
pub(crate) fn extension(oid_arcs: &[u64], critical: bool, value: &[u8]) -> Vec<u8> {
    let mut fields = vec![der::oid(oid_arcs)];
    if critical {
        fields.push(der::boolean(true));
    }
    fields.push(der::octet_string(value));
    der::sequence(&fields)
}

/// BasicConstraints extension, always critical.
pub(crate) fn basic_constraints(is_ca: bool) -> Vec<u8> {
    let inner = if is_ca {
        der::sequence(&[der::boolean(true)])
    } else {
        // cA defaults to FALSE, so the SEQUENCE is empty.
        der::sequence(&[])
    };
    extension(oid::CE_BASIC_CONSTRAINTS, true, &inner)
}

/// KeyUsage extension, always critical. `bits` is the first content octet of
/// the BIT STRING (digitalSignature = 0x80, keyEncipherment = 0x20,
/// keyCertSign = 0x04, cRLSign = 0x02).
pub(crate) fn key_usage(bits: u8) -> Vec<u8> {
    // DER strips trailing zero bits from a named-bit BIT STRING.
    let unused = bits.trailing_zeros().min(7) as u8;
    extension(oid::CE_KEY_USAGE, true, &der::bit_string(unused, &[bits]))
}

/// ExtendedKeyUsage with serverAuth only.
pub(crate) fn eku_server_auth() -> Vec<u8> {
    extension(
        oid::CE_EXT_KEY_USAGE,
        false,
        &der::sequence(&[der::oid(oid::KP_SERVER_AUTH)]),
    )
}

/// SubjectAltName carrying dNSName entries.
pub(crate) fn san_dns(names: &[&str]) -> Vec<u8> {
    let entries: Vec<Vec<u8>> = names
        .iter()
        .map(|n| der::context_implicit(2, n.as_bytes()))
        .collect();
    extension(oid::CE_SUBJECT_ALT_NAME, false, &der::sequence(&entries))
}

/// A random 16-byte serial with the high bit cleared (keeps the INTEGER
/// positive without a padding octet).
pub(crate) fn random_serial(rng: &SystemRandom) -> crate::Result<[u8; 16]> {
    let mut serial = [0u8; 16];
    rng.fill(&mut serial).map_err(|_| CaError::Keygen)?;
    serial[0] &= 0x7f;
    Ok(serial)
}

/// Everything that varies between certificates.
pub(crate) struct TbsParams<'a> {
    pub serial: [u8; 16],
    pub issuer_dn: &'a [u8],
    pub subject_dn: &'a [u8],
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub spki: &'a [u8],
    pub extensions: &'a [Vec<u8>],
}

/// Assemble the TBSCertificate.
pub(crate) fn tbs_certificate(p: &TbsParams<'_>) -> Vec<u8> {
    der::sequence(&[
        // version [0] EXPLICIT INTEGER v3(2)
        der::context_explicit(0, &der::integer_u64(2)),
        der::integer_unsigned(&p.serial),
        alg_ecdsa_sha256(),
        p.issuer_dn.to_vec(),
        der::sequence(&[der::utc_time(p.not_before), der::utc_time(p.not_after)]),
        p.subject_dn.to_vec(),
        p.spki.to_vec(),
        der::context_explicit(3, &der::sequence(p.extensions)),
    ])
}

/// Final Certificate = SEQ { tbs, sigAlg, BIT STRING signature }.
pub(crate) fn certificate(tbs: &[u8], signature: &[u8]) -> Vec<u8> {
    der::sequence(&[
        tbs.to_vec(),
        alg_ecdsa_sha256(),
        der::bit_string(0, signature),
    ])
}

//! Object identifiers used in the certificates this CA mints.

/// ecdsa-with-SHA256 (RFC 5758).
pub const ECDSA_WITH_SHA256: &[u64] = &[1, 2, 840, 10045, 4, 3, 2];
/// id-ecPublicKey (RFC 5480).
pub const EC_PUBLIC_KEY: &[u64] = &[1, 2, 840, 10045, 2, 1];
/// secp256r1 / prime256v1 curve.
pub const PRIME256V1: &[u64] = &[1, 2, 840, 10045, 3, 1, 7];

/// X.520 commonName.
pub const AT_COMMON_NAME: &[u64] = &[2, 5, 4, 3];
/// X.520 organizationName.
pub const AT_ORGANIZATION: &[u64] = &[2, 5, 4, 10];
/// X.520 countryName.
pub const AT_COUNTRY: &[u64] = &[2, 5, 4, 6];

/// id-ce-keyUsage.
pub const CE_KEY_USAGE: &[u64] = &[2, 5, 29, 15];
/// id-ce-subjectAltName.
pub const CE_SUBJECT_ALT_NAME: &[u64] = &[2, 5, 29, 17];
/// id-ce-basicConstraints.
pub const CE_BASIC_CONSTRAINTS: &[u64] = &[2, 5, 29, 19];
/// id-ce-extKeyUsage.
pub const CE_EXT_KEY_USAGE: &[u64] = &[2, 5, 29, 37];
/// id-kp-serverAuth.
pub const KP_SERVER_AUTH: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 3, 1];

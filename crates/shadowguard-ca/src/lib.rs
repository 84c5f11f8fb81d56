//! shadowguard-ca: trust anchor and leaf issuance for the MITM proxy.
//!
//! A single self-signed ECDSA P-256 root lives in the platform keystore for
//! the life of the install. For every intercepted SNI the proxy asks for a
//! short-lived leaf; minting is cache-first (TTL 24 h, LRU soft cap) and a
//! miss costs one P-256 keygen plus one signature, performed off the
//! connection hot path.
//!
//! All ASN.1 is produced by the in-crate DER builder; certificates small
//! enough to write by hand are small enough to test by hand. Private key
//! material is held in `Zeroizing` buffers and zeroed on drop.

pub mod authority;
pub mod cache;
pub mod der;
pub mod error;
pub mod leaf;
pub mod oid;
pub mod root;
mod x509;

pub use authority::CertificateAuthority;
pub use cache::{CacheStatsSnapshot, LeafCache};
pub use error::CaError;
pub use leaf::LeafCert;
pub use root::RootAuthority;

/// Result type for CA operations.
pub type Result<T> = std::result::Result<T, CaError>;

use thiserror::Error;

/// Errors from root management and leaf issuance.
#[derive(Error, Debug)]
pub enum CaError {
    /// The platform keystore could not be read or written.
    #[error("keystore unavailable: {0}")]
    Keystore(#[from] shadowguard_core::KeyStoreError),

    /// Key pair generation failed (already retried once).
    #[error("key generation failed")]
    Keygen,

    /// Signing failed (already retried once).
    #[error("certificate signing failed")]
    Sign,

    /// DER assembly produced an invalid structure.
    #[error("certificate encoding failed: {0}")]
    Encode(String),

    /// Persisted key material could not be reloaded.
    #[error("stored root material is unusable: {0}")]
    BadStoredKey(String),

    /// The requested leaf hostname is not a usable DNS name.
    #[error("invalid leaf domain: {0}")]
    InvalidDomain(String),
}

use thiserror::Error;

/// Top-level construction and lifecycle errors.
///
/// Only configuration problems are fatal to construction; everything else
/// stays local to the subsystem that raised it.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid configuration (fatal at initial load; on reload the caller
    /// keeps the previous config).
    #[error(transparent)]
    Config(#[from] shadowguard_core::ConfigError),

    /// Root CA could not be loaded or created.
    #[error(transparent)]
    Ca(#[from] shadowguard_ca::CaError),

    /// Proxy lifecycle failure.
    #[error(transparent)]
    Proxy(#[from] shadowguard_proxy::ProxyError),
}

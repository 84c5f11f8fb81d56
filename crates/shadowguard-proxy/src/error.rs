use thiserror::Error;

/// Errors local to one connection (or to proxy lifecycle operations).
/// A connection error never affects sibling connections; the state machine
/// maps every one of these into a single transition to Closing.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration or handshake failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Leaf minting or root access failed.
    #[error(transparent)]
    Ca(#[from] shadowguard_ca::CaError),

    /// Malformed HTTP from the client.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A phase exceeded its deadline.
    #[error("timed out during {0}")]
    Timeout(&'static str),

    /// `start()` called while already running.
    #[error("proxy is already running")]
    AlreadyRunning,
}

impl From<rustls::Error> for ProxyError {
    fn from(e: rustls::Error) -> Self {
        Self::Tls(e.to_string())
    }
}

use thiserror::Error;

/// Errors raised while loading or validating configuration.
///
/// A `ConfigError` at initial load is the only error that is fatal to
/// `Core::start()`; on a reload the caller keeps the previous config.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Listener port is unusable (0 is reserved for "unassigned").
    #[error("invalid proxy port: {0}")]
    InvalidPort(u16),

    /// A bypass pattern failed validation.
    #[error("invalid bypass pattern {pattern:?}: {reason}")]
    InvalidBypassPattern {
        /// The offending pattern as written.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two rule sources share an id.
    #[error("duplicate rule source id: {0}")]
    DuplicateRuleSource(String),

    /// Config file could not be read.
    #[error("config read failed: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for the expected schema.
    #[error("config parse failed: {0}")]
    Parse(String),
}

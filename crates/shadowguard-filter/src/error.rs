use thiserror::Error;

/// Why a single rule failed to compile.
///
/// Rule errors are never fatal to a list: the compiler logs the offending
/// line and keeps going.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// Pattern reduced to nothing after stripping decorations.
    #[error("empty pattern")]
    EmptyPattern,

    /// `$option` tail contained something outside the supported subset.
    #[error("unknown rule option: {0}")]
    UnknownOption(String),

    /// An option that requires a value was missing one (or vice versa).
    #[error("malformed rule option: {0}")]
    MalformedOption(String),

    /// A `/regex/` body or generated pattern failed to compile.
    #[error("invalid pattern regex: {0}")]
    Regex(String),

    /// A domain-anchor rule failed domain normalization.
    #[error(transparent)]
    Domain(#[from] shadowguard_index::IndexError),
}

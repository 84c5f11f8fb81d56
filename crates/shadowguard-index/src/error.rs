use thiserror::Error;

/// Errors raised while building an index snapshot.
///
/// Lookup is total and never fails; only `build` (and the normalization it
/// relies on) can reject input, and it fails fast on the first bad domain.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexError {
    /// A normalized domain still violates the label invariants.
    #[error("invalid domain {domain:?}: {reason}")]
    InvalidDomain {
        /// The input as supplied.
        domain: String,
        /// Which invariant failed.
        reason: String,
    },
}

impl IndexError {
    pub(crate) fn invalid(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDomain {
            domain: domain.into(),
            reason: reason.into(),
        }
    }
}

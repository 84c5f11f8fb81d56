//! Proxy delegate bundle.
//!
//! The shell observes proxy activity through a small capability struct of
//! function-typed fields rather than a delegate trait object graph; a
//! connection task holds an `Arc<ProxyEvents>` and never a back-pointer into
//! the shell. Every hook must be non-blocking from the hot path.

use std::sync::Arc;

/// Callback type for hooks carrying a URL-ish subject plus detail.
pub type SubjectHook = Arc<dyn Fn(&str, &str) + Send + Sync>;
/// Callback type for hooks carrying just a subject.
pub type SimpleHook = Arc<dyn Fn(&str) + Send + Sync>;
/// Callback type for the redirect hook: (url, target, matching rule).
pub type RedirectHook = Arc<dyn Fn(&str, &str, &str) + Send + Sync>;
/// Callback type for the TLS handshake outcome hook.
pub type HandshakeHook = Arc<dyn Fn(&str, bool) + Send + Sync>;
/// Callback type for error reports (subject may be unknown).
pub type ErrorHook = Arc<dyn Fn(Option<&str>, &str) + Send + Sync>;

/// Statistics/observation hooks consumed by the UI shell.
#[derive(Clone)]
pub struct ProxyEvents {
    /// A request was blocked; arguments are (url, matching rule).
    pub on_blocked: SubjectHook,
    /// A request was allowed; argument is the url.
    pub on_allowed: SimpleHook,
    /// A request was answered with a redirect instead of fetched;
    /// arguments are (url, redirect target, matching rule).
    pub on_redirected: RedirectHook,
    /// A connection failed; arguments are (url if known, error text).
    pub on_error: ErrorHook,
    /// Client-facing TLS handshake finished; arguments are (domain, ok).
    pub on_tls_handshake: HandshakeHook,
}

impl ProxyEvents {
    /// Hooks that do nothing; useful default for tests and headless runs.
    pub fn noop() -> Self {
        Self {
            on_blocked: Arc::new(|_, _| {}),
            on_allowed: Arc::new(|_| {}),
            on_redirected: Arc::new(|_, _, _| {}),
            on_error: Arc::new(|_, _| {}),
            on_tls_handshake: Arc::new(|_, _| {}),
        }
    }
}

impl Default for ProxyEvents {
    fn default() -> Self {
        Self::noop()
    }
}

impl std::fmt::Debug for ProxyEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyEvents").finish_non_exhaustive()
    }
}

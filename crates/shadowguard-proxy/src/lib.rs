//! shadowguard-proxy: the MITM fabric.
//!
//! A loopback TCP listener accepts flows the platform redirects at it. Each
//! connection runs its own state machine task: parse the request head,
//! decide block/bypass/intercept, then either answer with the canonical 403,
//! relay opaque bytes, or terminate TLS with a CA-minted leaf and re-encrypt
//! toward the origin, whose certificate is verified against real trust:
//! interception never weakens origin authentication.
//!
//! Connections own their sockets exclusively and report back only through
//! the `ProxyEvents` capability struct and atomic counters. Stopping the
//! proxy cancels every task through one `CancellationToken`; rule reloads
//! swap an `Arc` and only affect connections accepted afterwards.

pub mod block;
pub mod bypass;
mod conn;
pub mod error;
mod http;
mod relay;
pub mod server;
mod tls;

pub use bypass::BypassList;
pub use conn::{DirectDialer, OriginDialer};
pub use error::ProxyError;
pub use server::{ProxyServer, ProxySettings};

/// Result type for proxy operations.
pub type Result<T> = std::result::Result<T, ProxyError>;

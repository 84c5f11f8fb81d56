//! Bounded, non-blocking event delivery to the shell.
//!
//! The proxy hot path must never wait on the UI. A `BoundedSink` wraps a
//! fixed-capacity channel: `emit` either enqueues immediately or drops the
//! event and bumps a counter. The shell drains the receiver at its leisure.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::events::ProxyEvents;

/// One observation from the proxy, in the order hooks fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyEvent {
    /// A request was blocked by `rule`.
    Blocked { url: String, rule: String },
    /// A request went through.
    Allowed { url: String },
    /// A request was answered with a redirect to `target` instead of
    /// fetched; distinct from a hard block.
    Redirected {
        url: String,
        target: String,
        rule: String,
    },
    /// A connection failed.
    Error { url: Option<String>, message: String },
    /// Client-facing TLS handshake finished.
    TlsHandshake { domain: String, ok: bool },
}

/// Fire-and-forget sender side of a bounded event queue.
#[derive(Debug, Clone)]
pub struct BoundedSink<T> {
    tx: mpsc::Sender<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> BoundedSink<T> {
    /// A sink/receiver pair holding at most `capacity` undelivered events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Enqueue without blocking. Returns false when the queue was full (or
    /// the receiver is gone) and the event was dropped.
    pub fn emit(&self, event: T) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Events dropped so far because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl ProxyEvents {
    /// Hooks that forward every callback into a bounded queue. Overflow
    /// drops events instead of stalling a connection task.
    pub fn from_sink(sink: BoundedSink<ProxyEvent>) -> Self {
        let (blocked, allowed, redirected, errored, handshook) =
            (sink.clone(), sink.clone(), sink.clone(), sink.clone(), sink);
        Self {
            on_blocked: Arc::new(move |url, rule| {
                blocked.emit(ProxyEvent::Blocked {
                    url: url.to_string(),
                    rule: rule.to_string(),
                });
            }),
            on_allowed: Arc::new(move |url| {
                allowed.emit(ProxyEvent::Allowed {
                    url: url.to_string(),
                });
            }),
            on_redirected: Arc::new(move |url, target, rule| {
                redirected.emit(ProxyEvent::Redirected {
                    url: url.to_string(),
                    target: target.to_string(),
                    rule: rule.to_string(),
                });
            }),
            on_error: Arc::new(move |url, message| {
                errored.emit(ProxyEvent::Error {
                    url: url.map(str::to_string),
                    message: message.to_string(),
                });
            }),
            on_tls_handshake: Arc::new(move |domain, ok| {
                handshook.emit(ProxyEvent::TlsHandshake {
                    domain: domain.to_string(),
                    ok,
                });
            }),
        }
    }
}

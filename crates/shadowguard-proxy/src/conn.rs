//! Per-connection state machine.
//!
//! One task per accepted socket. The connection owns both socket halves
//! exclusively; every exit path releases them by dropping. Errors are
//! result-valued and funnel into a single transition to Closing; nothing
//! here can take down a sibling connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use shadowguard_ca::CertificateAuthority;
use shadowguard_core::{CoreStats, ProxyEvents};
use shadowguard_filter::{
    blocked_bytes_estimate, CompiledRules, FilterDecision, RequestContext, ResourceType,
};

use crate::block;
use crate::bypass::BypassList;
use crate::error::ProxyError;
use crate::http::{self, HeadOutcome, RequestHead};
use crate::relay;
use crate::tls;

/// Phase of the connection state machine, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    ReadingRequest,
    ConnectingOrigin,
    TlsHandshakingClient,
    TlsHandshakingOrigin,
    Streaming,
    Closing,
}

/// Deadlines for the blocking phases.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Timeouts {
    pub tls_handshake: Duration,
    pub origin_connect: Duration,
    pub idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            tls_handshake: Duration::from_secs(30),
            origin_connect: Duration::from_secs(5),
            idle: Duration::from_secs(120),
        }
    }
}

/// Dials origin TCP connections. The default implementation resolves and
/// connects directly; tests and unusual platforms substitute their own.
pub trait OriginDialer: Send + Sync + std::fmt::Debug {
    fn dial(
        &self,
        host: &str,
        port: u16,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = std::io::Result<TcpStream>> + Send + '_>,
    >;
}

/// Straight `TcpStream::connect`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectDialer;

impl OriginDialer for DirectDialer {
    fn dial(
        &self,
        host: &str,
        port: u16,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = std::io::Result<TcpStream>> + Send + '_>,
    > {
        let target = (host.to_string(), port);
        Box::pin(async move { TcpStream::connect(target).await })
    }
}

/// Everything a connection task needs, captured at accept time. The rule
/// snapshot in particular is pinned here: reloads only affect later
/// connections.
pub(crate) struct ConnContext {
    pub rules: Arc<CompiledRules>,
    pub ca: Arc<CertificateAuthority>,
    pub bypass: Arc<BypassList>,
    pub events: ProxyEvents,
    pub stats: Arc<CoreStats>,
    pub origin_roots: Arc<rustls::RootCertStore>,
    pub dialer: Arc<dyn OriginDialer>,
    pub cancel: CancellationToken,
    pub timeouts: Timeouts,
    pub id: u64,
}

/// Mutable per-flow state, mostly for diagnostics.
struct Connection {
    id: u64,
    phase: Phase,
    target_host: Option<String>,
    target_port: u16,
    is_tls: bool,
    is_bypass: bool,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_connection_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Entry point for one accepted socket.
pub(crate) async fn handle(ctx: ConnContext, stream: TcpStream) {
    let mut conn = Connection {
        id: ctx.id,
        phase: Phase::ReadingRequest,
        target_host: None,
        target_port: 0,
        is_tls: false,
        is_bypass: false,
    };

    // Cancellation covers every phase: dropping the future releases both
    // socket halves.
    let result = tokio::select! {
        () = ctx.cancel.cancelled() => Ok(()),
        result = run(&ctx, &mut conn, stream) => result,
    };

    if let Err(e) = result {
        let subject = conn.target_host.as_deref();
        (ctx.events.on_error)(subject, &e.to_string());
        debug!(
            conn = conn.id,
            phase = ?conn.phase,
            host = subject.unwrap_or("-"),
            port = conn.target_port,
            tls = conn.is_tls,
            bypass = conn.is_bypass,
            error = %e,
            "connection closed with error"
        );
    }
    conn.phase = Phase::Closing;
    tracing::trace!(conn = conn.id, phase = ?conn.phase, "connection released");
}

async fn run(
    ctx: &ConnContext,
    conn: &mut Connection,
    mut stream: TcpStream,
) -> crate::Result<()> {
    let head = http::read_head(&mut stream).await?;

    let raw = match head {
        HeadOutcome::Complete(raw) => raw,
        HeadOutcome::Closed => return Ok(()),
        HeadOutcome::TooLarge => {
            stream.write_all(&block::bad_request()).await?;
            return Err(ProxyError::Protocol("request head over 16 KiB".into()));
        }
    };

    let head = match http::parse_head(raw) {
        Ok(head) => head,
        Err(e) => {
            stream.write_all(&block::bad_request()).await?;
            return Err(e);
        }
    };

    if head.method.eq_ignore_ascii_case("CONNECT") {
        handle_connect(ctx, conn, stream, &head).await
    } else {
        handle_plain(ctx, conn, stream, head).await
    }
}

/// CONNECT: decide block / bypass / MITM, in that order.
async fn handle_connect(
    ctx: &ConnContext,
    conn: &mut Connection,
    mut stream: TcpStream,
    head: &RequestHead,
) -> crate::Result<()> {
    let (host, port) = http::split_host_port(&head.target, 443)
        .ok_or_else(|| ProxyError::Protocol(format!("bad CONNECT target {:?}", head.target)))?;
    conn.target_host = Some(host.clone());
    conn.target_port = port;
    conn.is_tls = true;

    let url = if port == 443 {
        format!("https://{host}/")
    } else {
        format!("https://{host}:{port}/")
    };

    let decision = ctx.rules.decide(&RequestContext {
        url: &url,
        domain: &host,
        resource_type: None,
        initiator: None,
    });

    // Blocked CONNECTs are refused in plaintext, before any
    // `200 Connection Established`, never inside a minted tunnel.
    if let FilterDecision::Block { rule } = &decision {
        stream.write_all(&block::blocked_response()).await?;
        (ctx.events.on_blocked)(&url, rule);
        ctx.stats.record_blocked(blocked_bytes_estimate(None));
        debug!(conn = conn.id, host = %host, rule = %rule, "blocked CONNECT");
        return Ok(());
    }

    if ctx.bypass.matches(&host) {
        conn.is_bypass = true;
        stream.write_all(block::CONNECTION_ESTABLISHED).await?;

        conn.phase = Phase::ConnectingOrigin;
        let origin = dial_origin(ctx, &host, port).await?;

        conn.phase = Phase::Streaming;
        debug!(conn = conn.id, host = %host, "bypass relay established");
        relay::pump(stream, origin, ctx.timeouts.idle, &ctx.cancel).await?;
        return Ok(());
    }

    // MITM. Mint before acknowledging: if the CA cannot produce a leaf the
    // client sees a clean connection failure, not a broken tunnel.
    let leaf = {
        let ca = ctx.ca.clone();
        let host = host.clone();
        tokio::task::spawn_blocking(move || ca.mint_leaf(&host))
            .await
            .map_err(|e| ProxyError::Tls(format!("leaf minting task failed: {e}")))??
    };
    let server_config = tls::server_config_for_leaf(&leaf)?;

    stream.write_all(block::CONNECTION_ESTABLISHED).await?;

    conn.phase = Phase::TlsHandshakingClient;
    let acceptor = TlsAcceptor::from(server_config);
    let client_tls = match timeout(ctx.timeouts.tls_handshake, acceptor.accept(stream)).await {
        Ok(Ok(tls_stream)) => tls_stream,
        Ok(Err(e)) => {
            (ctx.events.on_tls_handshake)(&host, false);
            return Err(ProxyError::Tls(format!("client handshake: {e}")));
        }
        Err(_) => {
            (ctx.events.on_tls_handshake)(&host, false);
            return Err(ProxyError::Timeout("client TLS handshake"));
        }
    };
    (ctx.events.on_tls_handshake)(&host, true);

    let negotiated_alpn = client_tls
        .get_ref()
        .1
        .alpn_protocol()
        .map(<[u8]>::to_vec);

    conn.phase = Phase::ConnectingOrigin;
    let origin_tcp = dial_origin(ctx, &host, port).await?;

    conn.phase = Phase::TlsHandshakingOrigin;
    let connector = TlsConnector::from(tls::origin_client_config(
        ctx.origin_roots.clone(),
        negotiated_alpn,
    ));
    let origin_tls = timeout(
        ctx.timeouts.tls_handshake,
        connector.connect(tls::server_name(&host)?, origin_tcp),
    )
    .await
    .map_err(|_| ProxyError::Timeout("origin TLS handshake"))?
    .map_err(|e| ProxyError::Tls(format!("origin handshake with {host}: {e}")))?;

    (ctx.events.on_allowed)(&url);
    ctx.stats.record_allowed();

    conn.phase = Phase::Streaming;
    debug!(conn = conn.id, host = %host, "MITM tunnel established");
    relay::pump(client_tls, origin_tls, ctx.timeouts.idle, &ctx.cancel).await?;
    Ok(())
}

/// Plain HTTP: filter on the full URL, then forward the buffered request.
async fn handle_plain(
    ctx: &ConnContext,
    conn: &mut Connection,
    mut stream: TcpStream,
    head: RequestHead,
) -> crate::Result<()> {
    let Some((url, host, port)) = http::plain_request_target(&head) else {
        stream.write_all(&block::bad_request()).await?;
        return Err(ProxyError::Protocol("no usable host in request".into()));
    };
    conn.target_host = Some(host.clone());
    conn.target_port = port;

    let resource_type = ResourceType::infer_from_url(&url);
    let decision = ctx.rules.decide(&RequestContext {
        url: &url,
        domain: &host,
        resource_type: Some(resource_type),
        initiator: None,
    });

    match decision {
        FilterDecision::Block { rule } => {
            stream.write_all(&block::blocked_response()).await?;
            (ctx.events.on_blocked)(&url, &rule);
            ctx.stats
                .record_blocked(blocked_bytes_estimate(Some(resource_type)));
            debug!(conn = conn.id, url = %url, rule = %rule, "blocked HTTP request");
            Ok(())
        }
        FilterDecision::Redirect { target, rule } => {
            stream.write_all(&block::redirect_response(&target)).await?;
            (ctx.events.on_redirected)(&url, &target, &rule);
            ctx.stats
                .record_redirected(blocked_bytes_estimate(Some(resource_type)));
            debug!(conn = conn.id, url = %url, target = %target, rule = %rule, "redirected HTTP request");
            Ok(())
        }
        FilterDecision::Allow { .. } | FilterDecision::Pass => {
            conn.phase = Phase::ConnectingOrigin;
            let mut origin = dial_origin(ctx, &host, port).await?;

            // Replay the buffered request verbatim before streaming.
            origin.write_all(&head.raw).await?;

            (ctx.events.on_allowed)(&url);
            ctx.stats.record_allowed();

            conn.phase = Phase::Streaming;
            relay::pump(stream, origin, ctx.timeouts.idle, &ctx.cancel).await?;
            Ok(())
        }
    }
}

async fn dial_origin(ctx: &ConnContext, host: &str, port: u16) -> crate::Result<TcpStream> {
    let stream = timeout(ctx.timeouts.origin_connect, ctx.dialer.dial(host, port))
        .await
        .map_err(|_| ProxyError::Timeout("origin connect"))?
        .map_err(|e| {
            warn!(host = %host, port = port, error = %e, "origin connect failed");
            ProxyError::Io(e)
        })?;
    let _ = stream.set_nodelay(true);
    Ok(stream)
}

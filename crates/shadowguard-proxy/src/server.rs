//! Listener lifecycle and connection fan-out.

use arc_swap::ArcSwap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use shadowguard_ca::CertificateAuthority;
use shadowguard_core::{CoreStats, ProxyEvents};
use shadowguard_filter::CompiledRules;

use crate::bypass::BypassList;
use crate::conn::{self, ConnContext, DirectDialer, OriginDialer, Timeouts};
use crate::error::ProxyError;
use crate::tls;

/// Everything the proxy needs at construction, beyond its collaborators.
#[derive(Debug, Clone)]
pub struct ProxySettings {
    /// Port bound on 127.0.0.1. Zero asks the OS for an ephemeral port.
    pub bind_port: u16,
    /// Domain patterns that skip MITM (exact or `*.suffix`).
    pub bypass_patterns: Vec<String>,
    /// Verify origins against the platform trust store.
    pub origin_verify_system_trust: bool,
    /// Additional origin trust anchors (DER), e.g. a private corporate CA.
    pub extra_origin_roots: Vec<Vec<u8>>,
    /// TLS handshake deadline, each side.
    pub tls_handshake_timeout: std::time::Duration,
    /// Origin TCP connect deadline.
    pub origin_connect_timeout: std::time::Duration,
    /// Streaming idle deadline.
    pub idle_timeout: std::time::Duration,
}

impl Default for ProxySettings {
    fn default() -> Self {
        let timeouts = Timeouts::default();
        Self {
            bind_port: 8899,
            bypass_patterns: Vec::new(),
            origin_verify_system_trust: true,
            extra_origin_roots: Vec::new(),
            tls_handshake_timeout: timeouts.tls_handshake,
            origin_connect_timeout: timeouts.origin_connect,
            idle_timeout: timeouts.idle,
        }
    }
}

/// The MITM proxy: one acceptor task, one task per connection.
pub struct ProxyServer {
    settings: ProxySettings,
    ca: Arc<CertificateAuthority>,
    rules: Arc<ArcSwap<CompiledRules>>,
    bypass: Arc<BypassList>,
    events: ProxyEvents,
    stats: Arc<CoreStats>,
    origin_roots: Arc<rustls::RootCertStore>,
    dialer: Arc<dyn OriginDialer>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl ProxyServer {
    /// Build a proxy around its collaborators; nothing is bound yet.
    pub fn new(
        settings: ProxySettings,
        ca: Arc<CertificateAuthority>,
        rules: CompiledRules,
        events: ProxyEvents,
        stats: Arc<CoreStats>,
    ) -> Self {
        let bypass = Arc::new(BypassList::new(&settings.bypass_patterns));
        let origin_roots = tls::origin_root_store(
            settings.origin_verify_system_trust,
            &settings.extra_origin_roots,
        );
        Self {
            settings,
            ca,
            rules: Arc::new(ArcSwap::from_pointee(rules)),
            bypass,
            events,
            stats,
            origin_roots,
            dialer: Arc::new(DirectDialer),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            local_addr: Mutex::new(None),
        }
    }

    /// Substitute the origin dialer (platform integration, tests).
    pub fn with_dialer(mut self, dialer: Arc<dyn OriginDialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Bind the loopback listener and launch the acceptor. Returns the
    /// bound address.
    pub async fn start(&self) -> crate::Result<SocketAddr> {
        let mut local_addr = self.local_addr.lock().await;
        if local_addr.is_some() {
            return Err(ProxyError::AlreadyRunning);
        }

        let bind_addr = SocketAddr::from(([127, 0, 0, 1], self.settings.bind_port));
        let listener = TcpListener::bind(bind_addr).await?;
        let addr = listener.local_addr()?;
        *local_addr = Some(addr);
        info!(addr = %addr, "proxy listener bound");

        let acceptor = Acceptor {
            listener,
            ca: self.ca.clone(),
            rules: self.rules.clone(),
            bypass: self.bypass.clone(),
            events: self.events.clone(),
            stats: self.stats.clone(),
            origin_roots: self.origin_roots.clone(),
            dialer: self.dialer.clone(),
            cancel: self.cancel.clone(),
            tracker: self.tracker.clone(),
            timeouts: Timeouts {
                tls_handshake: self.settings.tls_handshake_timeout,
                origin_connect: self.settings.origin_connect_timeout,
                idle: self.settings.idle_timeout,
            },
        };
        self.tracker.spawn(acceptor.run());

        Ok(addr)
    }

    /// Cancel every in-flight connection and wait for the tasks to drain.
    pub async fn stop(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        *self.local_addr.lock().await = None;
        info!("proxy stopped");
    }

    /// Swap the rule snapshot. Connections already running keep the
    /// snapshot they were accepted with.
    pub fn reload_rules(&self, rules: Arc<CompiledRules>) {
        self.rules.store(rules);
        info!("proxy rule snapshot reloaded");
    }

    /// The rule snapshot new connections will observe.
    pub fn current_rules(&self) -> Arc<CompiledRules> {
        self.rules.load_full()
    }

    /// Bound address while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }
}

impl std::fmt::Debug for ProxyServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyServer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// The accept loop, owning the listener.
struct Acceptor {
    listener: TcpListener,
    ca: Arc<CertificateAuthority>,
    rules: Arc<ArcSwap<CompiledRules>>,
    bypass: Arc<BypassList>,
    events: ProxyEvents,
    stats: Arc<CoreStats>,
    origin_roots: Arc<rustls::RootCertStore>,
    dialer: Arc<dyn OriginDialer>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    timeouts: Timeouts,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{blocked_response, CONNECTION_ESTABLISHED};
    use crate::conn::OriginDialer;
    use shadowguard_core::MemoryKeyStore;
    use shadowguard_filter::RuleCompiler;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    /// Captures every delegate callback for assertions.
    #[derive(Default)]
    struct EventLog {
        blocked: std::sync::Mutex<Vec<(String, String)>>,
        allowed: std::sync::Mutex<Vec<String>>,
        redirected: std::sync::Mutex<Vec<(String, String, String)>>,
        errors: std::sync::Mutex<Vec<String>>,
        handshakes: std::sync::Mutex<Vec<(String, bool)>>,
    }

    fn capture_events(log: &Arc<EventLog>) -> ProxyEvents {
        let (b, a, r, e, h) = (
            log.clone(),
            log.clone(),
            log.clone(),
            log.clone(),
            log.clone(),
        );
        ProxyEvents {
            on_blocked: Arc::new(move |url, rule| {
                b.blocked.lock().unwrap().push((url.into(), rule.into()));
            }),
            on_allowed: Arc::new(move |url| {
                a.allowed.lock().unwrap().push(url.into());
            }),
            on_redirected: Arc::new(move |url, target, rule| {
                r.redirected
                    .lock()
                    .unwrap()
                    .push((url.into(), target.into(), rule.into()));
            }),
            on_error: Arc::new(move |_url, err| {
                e.errors.lock().unwrap().push(err.into());
            }),
            on_tls_handshake: Arc::new(move |domain, ok| {
                h.handshakes.lock().unwrap().push((domain.into(), ok));
            }),
        }
    }

    /// Routes every origin dial to one fixed local address.
    #[derive(Debug)]
    struct FixedDialer(SocketAddr);

    impl OriginDialer for FixedDialer {
        fn dial(
            &self,
            _host: &str,
            _port: u16,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = std::io::Result<TcpStream>> + Send + '_>,
        > {
            let addr = self.0;
            Box::pin(async move { TcpStream::connect(addr).await })
        }
    }

    /// Fails every dial and remembers that it was asked.
    #[derive(Debug, Default)]
    struct RefusingDialer(Arc<AtomicBool>);

    impl OriginDialer for RefusingDialer {
        fn dial(
            &self,
            _host: &str,
            _port: u16,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = std::io::Result<TcpStream>> + Send + '_>,
        > {
            self.0.store(true, Ordering::SeqCst);
            Box::pin(async {
                Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "test dialer refuses",
                ))
            })
        }
    }

    struct Harness {
        proxy: Arc<ProxyServer>,
        ca: Arc<CertificateAuthority>,
        addr: SocketAddr,
        log: Arc<EventLog>,
    }

    async fn start_proxy(
        rules_text: &str,
        bypass: &[&str],
        extra_roots: Vec<Vec<u8>>,
        dialer: Option<Arc<dyn OriginDialer>>,
    ) -> Harness {
        let ca = Arc::new(
            CertificateAuthority::load_or_create(
                &MemoryKeyStore::new(),
                Duration::from_secs(3600),
                100,
            )
            .await
            .unwrap(),
        );
        let rules = RuleCompiler::compile([("test", rules_text)]);
        let log = Arc::new(EventLog::default());
        let settings = ProxySettings {
            bind_port: 0,
            bypass_patterns: bypass.iter().map(|s| (*s).to_string()).collect(),
            origin_verify_system_trust: false,
            extra_origin_roots: extra_roots,
            tls_handshake_timeout: Duration::from_secs(10),
            origin_connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(10),
        };
        let mut proxy = ProxyServer::new(
            settings,
            ca.clone(),
            rules,
            capture_events(&log),
            Arc::new(CoreStats::new()),
        );
        if let Some(dialer) = dialer {
            proxy = proxy.with_dialer(dialer);
        }
        let proxy = Arc::new(proxy);
        let addr = proxy.start().await.unwrap();
        Harness {
            proxy,
            ca,
            addr,
            log,
        }
    }

    async fn read_to_end(stream: &mut TcpStream) -> Vec<u8> {
        let mut out = Vec::new();
        let _ = stream.read_to_end(&mut out).await;
        out
    }

    #[tokio::test]
    async fn test_http_block_is_byte_exact_and_origin_untouched() {
        let dialed = Arc::new(AtomicBool::new(false));
        let h = start_proxy(
            "||tracker.example.com^\n",
            &[],
            Vec::new(),
            Some(Arc::new(RefusingDialer(dialed.clone()))),
        )
        .await;

        let mut client = TcpStream::connect(h.addr).await.unwrap();
        client
            .write_all(
                b"GET http://tracker.example.com/pixel.gif HTTP/1.1\r\nHost: tracker.example.com\r\n\r\n",
            )
            .await
            .unwrap();

        let response = read_to_end(&mut client).await;
        assert_eq!(response, blocked_response());
        assert!(!dialed.load(Ordering::SeqCst), "origin must never be dialed");

        {
            let blocked = h.log.blocked.lock().unwrap();
            assert_eq!(blocked.len(), 1);
            assert_eq!(blocked[0].0, "http://tracker.example.com/pixel.gif");
            assert_eq!(blocked[0].1, "||tracker.example.com^");
        }
        h.proxy.stop().await;
    }

    #[tokio::test]
    async fn test_http_allowed_request_forwards_and_streams_back() {
        let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_addr = origin.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = origin.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = sock.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            assert!(request.starts_with("GET http://allowed.example/ HTTP/1.1"));
            sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                .await
                .unwrap();
        });

        let h = start_proxy(
            "||tracker.example.com^\n",
            &[],
            Vec::new(),
            Some(Arc::new(FixedDialer(origin_addr))),
        )
        .await;

        let mut client = TcpStream::connect(h.addr).await.unwrap();
        client
            .write_all(b"GET http://allowed.example/ HTTP/1.1\r\nHost: allowed.example\r\n\r\n")
            .await
            .unwrap();

        let response = String::from_utf8(read_to_end(&mut client).await).unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("ok"));
        assert_eq!(
            h.log.allowed.lock().unwrap().as_slice(),
            ["http://allowed.example/"]
        );
        h.proxy.stop().await;
    }

    #[tokio::test]
    async fn test_redirect_rule_answers_302_not_block() {
        let dialed = Arc::new(AtomicBool::new(false));
        let h = start_proxy(
            "||ads.example/pixel.gif$redirect=1x1-transparent.gif\n",
            &[],
            Vec::new(),
            Some(Arc::new(RefusingDialer(dialed.clone()))),
        )
        .await;

        let mut client = TcpStream::connect(h.addr).await.unwrap();
        client
            .write_all(b"GET http://ads.example/pixel.gif HTTP/1.1\r\nHost: ads.example\r\n\r\n")
            .await
            .unwrap();

        let response = String::from_utf8(read_to_end(&mut client).await).unwrap();
        assert!(response.starts_with("HTTP/1.1 302 Found\r\n"));
        assert!(response.contains("Location: 1x1-transparent.gif\r\n"));
        assert!(!dialed.load(Ordering::SeqCst));

        // A redirect is reported as a redirect, not folded into blocks.
        assert!(h.log.blocked.lock().unwrap().is_empty());
        {
            let redirected = h.log.redirected.lock().unwrap();
            assert_eq!(redirected.len(), 1);
            assert_eq!(redirected[0].0, "http://ads.example/pixel.gif");
            assert_eq!(redirected[0].1, "1x1-transparent.gif");
        }
        h.proxy.stop().await;
    }

    #[tokio::test]
    async fn test_blocked_connect_gets_plain_403_before_200() {
        let h = start_proxy("||blocked.example^\n", &[], Vec::new(), None).await;

        let mut client = TcpStream::connect(h.addr).await.unwrap();
        client
            .write_all(b"CONNECT blocked.example:443 HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let response = read_to_end(&mut client).await;
        assert_eq!(response, blocked_response());
        assert!(h.log.handshakes.lock().unwrap().is_empty());
        h.proxy.stop().await;
    }

    #[tokio::test]
    async fn test_bypass_is_an_opaque_relay() {
        // Echo origin: sends back whatever arrives.
        let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_addr = origin.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = origin.accept().await.unwrap();
            let mut buf = vec![0u8; 256];
            let n = sock.read(&mut buf).await.unwrap();
            sock.write_all(&buf[..n]).await.unwrap();
        });

        let h = start_proxy(
            "",
            &["*.bank.example"],
            Vec::new(),
            Some(Arc::new(FixedDialer(origin_addr))),
        )
        .await;

        let mut client = TcpStream::connect(h.addr).await.unwrap();
        client
            .write_all(b"CONNECT login.bank.example:443 HTTP/1.1\r\n\r\n")
            .await
            .unwrap();

        let mut ack = vec![0u8; CONNECTION_ESTABLISHED.len()];
        client.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack, CONNECTION_ESTABLISHED);

        client.write_all(b"opaque-bytes").await.unwrap();
        let mut echo = [0u8; 12];
        client.read_exact(&mut echo).await.unwrap();
        assert_eq!(&echo, b"opaque-bytes");

        // No TLS was terminated.
        assert!(h.log.handshakes.lock().unwrap().is_empty());
        h.proxy.stop().await;
    }

    #[tokio::test]
    async fn test_mitm_https_allow_end_to_end() {
        // A real TLS origin with its own CA, trusted by the proxy through
        // an explicit extra anchor.
        let origin_ca = CertificateAuthority::load_or_create(
            &MemoryKeyStore::new(),
            Duration::from_secs(3600),
            10,
        )
        .await
        .unwrap();
        let origin_leaf = origin_ca.mint_leaf("secure.example").unwrap();
        let origin_tls_config = crate::tls::server_config_for_leaf(&origin_leaf).unwrap();

        let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_addr = origin.local_addr().unwrap();
        tokio::spawn(async move {
            let (sock, _) = origin.accept().await.unwrap();
            let acceptor = tokio_rustls::TlsAcceptor::from(origin_tls_config);
            let mut tls = acceptor.accept(sock).await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = tls.read(&mut buf).await.unwrap();
            assert!(buf[..n].starts_with(b"GET / HTTP/1.1"));
            tls.write_all(
                b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\nConnection: close\r\n\r\nsecure-ok",
            )
            .await
            .unwrap();
            let _ = tls.shutdown().await;
        });

        let h = start_proxy(
            "||tracker.example.com^\n",
            &[],
            vec![origin_ca.root_cert_der().to_vec()],
            Some(Arc::new(FixedDialer(origin_addr))),
        )
        .await;

        let mut client = TcpStream::connect(h.addr).await.unwrap();
        client
            .write_all(b"CONNECT secure.example:443 HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        let mut ack = vec![0u8; CONNECTION_ESTABLISHED.len()];
        client.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack, CONNECTION_ESTABLISHED);

        // Complete TLS with the proxy, trusting the interception root.
        let mut client_roots = rustls::RootCertStore::empty();
        client_roots
            .add(rustls::pki_types::CertificateDer::from(
                h.ca.root_cert_der().to_vec(),
            ))
            .unwrap();
        let client_config = rustls::ClientConfig::builder()
            .with_root_certificates(client_roots)
            .with_no_client_auth();
        let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));
        let server_name = rustls::pki_types::ServerName::try_from("secure.example").unwrap();
        let mut tls = connector.connect(server_name, client).await.unwrap();

        tls.write_all(b"GET / HTTP/1.1\r\nHost: secure.example\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = Vec::new();
        let _ = tls.read_to_end(&mut response).await;
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("secure-ok"));

        assert_eq!(
            h.log.handshakes.lock().unwrap().as_slice(),
            [("secure.example".to_string(), true)]
        );
        assert_eq!(
            h.log.allowed.lock().unwrap().as_slice(),
            ["https://secure.example/"]
        );
        h.proxy.stop().await;
    }

    #[tokio::test]
    async fn test_origin_verification_failure_closes_connection() {
        // Origin presents a cert from a CA the proxy does not trust.
        let rogue_ca = CertificateAuthority::load_or_create(
            &MemoryKeyStore::new(),
            Duration::from_secs(3600),
            10,
        )
        .await
        .unwrap();
        let rogue_leaf = rogue_ca.mint_leaf("secure.example").unwrap();
        let rogue_config = crate::tls::server_config_for_leaf(&rogue_leaf).unwrap();

        let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_addr = origin.local_addr().unwrap();
        tokio::spawn(async move {
            let (sock, _) = origin.accept().await.unwrap();
            let acceptor = tokio_rustls::TlsAcceptor::from(rogue_config);
            // Handshake is expected to fail; swallow the error.
            let _ = acceptor.accept(sock).await;
        });

        // No extra roots: nothing the proxy will accept.
        let h = start_proxy("", &[], Vec::new(), Some(Arc::new(FixedDialer(origin_addr)))).await;

        let mut client = TcpStream::connect(h.addr).await.unwrap();
        client
            .write_all(b"CONNECT secure.example:443 HTTP/1.1\r\n\r\n")
            .await
            .unwrap();
        let mut ack = vec![0u8; CONNECTION_ESTABLISHED.len()];
        client.read_exact(&mut ack).await.unwrap();

        let mut client_roots = rustls::RootCertStore::empty();
        client_roots
            .add(rustls::pki_types::CertificateDer::from(
                h.ca.root_cert_der().to_vec(),
            ))
            .unwrap();
        let client_config = rustls::ClientConfig::builder()
            .with_root_certificates(client_roots)
            .with_no_client_auth();
        let connector = tokio_rustls::TlsConnector::from(Arc::new(client_config));
        let server_name = rustls::pki_types::ServerName::try_from("secure.example").unwrap();

        // The client-facing handshake may complete, but the session dies
        // once origin verification fails; the fetch never succeeds.
        match connector.connect(server_name, client).await {
            Ok(mut tls) => {
                let _ = tls
                    .write_all(b"GET / HTTP/1.1\r\nHost: secure.example\r\n\r\n")
                    .await;
                let mut buf = Vec::new();
                let read = tls.read_to_end(&mut buf).await;
                assert!(read.is_err() || buf.is_empty());
            }
            Err(_) => {}
        }

        // The failure is reported to the shell.
        for _ in 0..100 {
            if !h.log.errors.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!h.log.errors.lock().unwrap().is_empty());
        h.proxy.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_request_line_gets_400() {
        let h = start_proxy("", &[], Vec::new(), None).await;

        let mut client = TcpStream::connect(h.addr).await.unwrap();
        client.write_all(b"GET /\r\n\r\n").await.unwrap();
        let response = String::from_utf8(read_to_end(&mut client).await).unwrap();
        assert!(response.starts_with("HTTP/1.1 400 Bad Request"));
        h.proxy.stop().await;
    }

    #[tokio::test]
    async fn test_reload_only_affects_new_connections() {
        let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin_addr = origin.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut sock, _)) = origin.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = sock.read(&mut buf).await.unwrap_or(0);
                    if n > 0 {
                        let _ = sock
                            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                            .await;
                    }
                });
            }
        });

        let h = start_proxy(
            "||flip.example^\n",
            &[],
            Vec::new(),
            Some(Arc::new(FixedDialer(origin_addr))),
        )
        .await;

        let request = b"GET http://flip.example/ HTTP/1.1\r\nHost: flip.example\r\n\r\n";

        let mut client = TcpStream::connect(h.addr).await.unwrap();
        client.write_all(request).await.unwrap();
        let first = String::from_utf8(read_to_end(&mut client).await).unwrap();
        assert!(first.starts_with("HTTP/1.1 403"));

        // Swap in an empty snapshot; the same request now passes.
        h.proxy
            .reload_rules(Arc::new(RuleCompiler::compile([("test", "")])));

        let mut client = TcpStream::connect(h.addr).await.unwrap();
        client.write_all(request).await.unwrap();
        let second = String::from_utf8(read_to_end(&mut client).await).unwrap();
        assert!(second.starts_with("HTTP/1.1 200"));
        h.proxy.stop().await;
    }

    #[tokio::test]
    async fn test_stop_closes_listener() {
        let h = start_proxy("", &[], Vec::new(), None).await;
        h.proxy.stop().await;
        // The port no longer accepts (or immediately resets) connections.
        match TcpStream::connect(h.addr).await {
            Err(_) => {}
            Ok(mut stream) => {
                let mut buf = [0u8; 1];
                assert_eq!(stream.read(&mut buf).await.unwrap_or(0), 0);
            }
        }
    }
}

impl Acceptor {
    async fn run(self) {
        loop {
            let accepted = tokio::select! {
                () = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    let ctx = ConnContext {
                        // Pinned here: this connection sees exactly this
                        // snapshot for its whole life.
                        rules: self.rules.load_full(),
                        ca: self.ca.clone(),
                        bypass: self.bypass.clone(),
                        events: self.events.clone(),
                        stats: self.stats.clone(),
                        origin_roots: self.origin_roots.clone(),
                        dialer: self.dialer.clone(),
                        cancel: self.cancel.clone(),
                        timeouts: self.timeouts,
                        id: conn::next_connection_id(),
                    };
                    tracing::trace!(peer = %peer, conn = ctx.id, "accepted connection");
                    self.tracker.spawn(conn::handle(ctx, stream));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }
}

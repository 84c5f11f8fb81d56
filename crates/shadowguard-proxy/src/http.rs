//! HTTP/1.1 request-head reading and parsing.
//!
//! Only what a forward proxy needs: the request line (exactly three
//! tokens), the `Host` header, and the raw buffered bytes so an allowed
//! request can be replayed to the origin verbatim.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ProxyError;

/// Hard cap on the buffered request head.
pub(crate) const MAX_HEAD_BYTES: usize = 16 * 1024;

/// What reading the head produced.
#[derive(Debug)]
pub(crate) enum HeadOutcome {
    /// Complete head (and possibly some body bytes) buffered.
    Complete(Vec<u8>),
    /// Peer closed before a complete head arrived.
    Closed,
    /// The head exceeded `MAX_HEAD_BYTES`.
    TooLarge,
}

/// Read until the end-of-headers marker (`\r\n\r\n` or `\n\n`).
pub(crate) async fn read_head<R>(reader: &mut R) -> crate::Result<HeadOutcome>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 2048];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(HeadOutcome::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);

        if head_end(&buf).is_some() {
            return Ok(HeadOutcome::Complete(buf));
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Ok(HeadOutcome::TooLarge);
        }
    }
}

/// Offset one past the blank line, if present.
pub(crate) fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4)
        .or_else(|| buf.windows(2).position(|w| w == b"\n\n").map(|i| i + 2))
}

/// Parsed request head plus the raw bytes it came from.
#[derive(Debug)]
pub(crate) struct RequestHead {
    pub method: String,
    pub target: String,
    #[allow(dead_code)] // parsed for validation; the raw bytes are replayed
    pub version: String,
    /// `Host` header value, when present.
    pub host_header: Option<String>,
    /// Everything read so far, including any body bytes past the head.
    pub raw: Vec<u8>,
}

/// Parse the request line and `Host` header out of a buffered head.
pub(crate) fn parse_head(raw: Vec<u8>) -> crate::Result<RequestHead> {
    let end = head_end(&raw)
        .ok_or_else(|| ProxyError::Protocol("incomplete request head".into()))?;
    let head_text = String::from_utf8_lossy(&raw[..end]);
    let mut lines = head_text.split('\n').map(|l| l.trim_end_matches('\r'));

    let request_line = lines
        .next()
        .ok_or_else(|| ProxyError::Protocol("empty request".into()))?;

    // Exactly three space-separated tokens; anything else is rejected.
    let mut tokens = request_line.split(' ').filter(|t| !t.is_empty());
    let (method, target, version) = match (tokens.next(), tokens.next(), tokens.next(), tokens.next())
    {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => {
            return Err(ProxyError::Protocol(format!(
                "malformed request line: {request_line:?}"
            )))
        }
    };

    let mut host_header = None;
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("host") {
                host_header = Some(value.trim().to_string());
                break;
            }
        }
    }

    Ok(RequestHead {
        method: method.to_string(),
        target: target.to_string(),
        version: version.to_string(),
        host_header,
        raw,
    })
}

/// Split `host[:port]`, defaulting the port.
pub(crate) fn split_host_port(authority: &str, default_port: u16) -> Option<(String, u16)> {
    let authority = authority.trim();
    if authority.is_empty() {
        return None;
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => {
            let port = port.parse().ok()?;
            if host.is_empty() {
                return None;
            }
            Some((host.to_ascii_lowercase(), port))
        }
        // No colon, or a bare IPv6 literal (not expected from CONNECT).
        _ => Some((authority.to_ascii_lowercase(), default_port)),
    }
}

/// Derive (url, host, port) for a plain-HTTP request: absolute-form targets
/// carry their own authority, origin-form falls back to the Host header.
pub(crate) fn plain_request_target(head: &RequestHead) -> Option<(String, String, u16)> {
    if let Some(rest) = head.target.strip_prefix("http://") {
        let authority_end = rest.find('/').unwrap_or(rest.len());
        let (host, port) = split_host_port(&rest[..authority_end], 80)?;
        return Some((head.target.clone(), host, port));
    }

    let (host, port) = split_host_port(head.host_header.as_deref()?, 80)?;
    let url = if port == 80 {
        format!("http://{host}{}", head.target)
    } else {
        format!("http://{host}:{port}{}", head.target)
    };
    Some((url, host, port))
}

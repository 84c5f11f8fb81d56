//! Canned HTTP responses: the canonical 403, request rejections, and the
//! CONNECT acknowledgement.
//!
//! The 403 layout is a stable on-wire contract; tests pin it byte-exactly.

/// Body of the canonical block page.
pub const BLOCK_BODY: &str = "<html><head><title>Blocked</title></head>\
<body><h1>Request blocked</h1><p>This request was blocked by ShadowGuard.</p></body></html>";

/// The canonical 403 block response, headers in contract order.
pub fn blocked_response() -> Vec<u8> {
    let mut out = Vec::with_capacity(BLOCK_BODY.len() + 160);
    out.extend_from_slice(b"HTTP/1.1 403 Forbidden\r\n");
    out.extend_from_slice(b"Content-Type: text/html; charset=utf-8\r\n");
    out.extend_from_slice(format!("Content-Length: {}\r\n", BLOCK_BODY.len()).as_bytes());
    out.extend_from_slice(b"Connection: close\r\n");
    out.extend_from_slice(b"X-Blocked: true\r\n");
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(BLOCK_BODY.as_bytes());
    out
}

/// 400 for unparseable or oversized request heads.
pub fn bad_request() -> Vec<u8> {
    b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec()
}

/// 302 used when a rule redirects instead of blocking.
pub fn redirect_response(location: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 302 Found\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
    )
    .into_bytes()
}

/// Acknowledgement sent before a tunnel (bypass or MITM) starts.
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_response_contract() {
        let response = blocked_response();
        let text = String::from_utf8(response).unwrap();
        let expected = format!(
            "HTTP/1.1 403 Forbidden\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\nX-Blocked: true\r\n\r\n{}",
            BLOCK_BODY.len(),
            BLOCK_BODY
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_content_length_matches_body() {
        let response = String::from_utf8(blocked_response()).unwrap();
        let (head, body) = response.split_once("\r\n\r\n").unwrap();
        let declared: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("Content-Length: "))
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(declared, body.len());
    }

    #[test]
    fn test_redirect_response() {
        let response = String::from_utf8(redirect_response("https://example.com/blank.gif")).unwrap();
        assert!(response.starts_with("HTTP/1.1 302 Found\r\n"));
        assert!(response.contains("Location: https://example.com/blank.gif\r\n"));
    }
}

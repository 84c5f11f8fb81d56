//! Plaintext HTTP host extraction for the TCP/80 fast path.

/// Scan an HTTP request head for its `Host:` header, before the blank line.
/// Returns the lowercased host with any port stripped.
pub(crate) fn host_header(payload: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(payload);

    for line in text.split(['\n']) {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            // End of headers.
            return None;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if !name.eq_ignore_ascii_case("host") {
            continue;
        }

        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        // Strip a port; bracketed IPv6 literals keep their brackets.
        let host = if value.starts_with('[') {
            value.split(']').next().map(|v| format!("{v}]"))?
        } else {
            value.split(':').next()?.to_string()
        };
        if host.is_empty() {
            return None;
        }
        return Some(host.to_ascii_lowercase());
    }
    None
}

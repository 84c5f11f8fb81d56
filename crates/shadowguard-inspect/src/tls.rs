//! TLS ClientHello walking for the TCP/443 fast path.

/// Length-checked forward-only reader.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn u8(&mut self) -> Option<u8> {
        Some(self.take(1)?[0])
    }

    fn u16(&mut self) -> Option<u16> {
        let b = self.take(2)?;
        Some(u16::from_be_bytes([b[0], b[1]]))
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        self.take(n).map(|_| ())
    }
}

const CONTENT_TYPE_HANDSHAKE: u8 = 0x16;
const HANDSHAKE_CLIENT_HELLO: u8 = 0x01;
const EXTENSION_SERVER_NAME: u16 = 0x0000;
const SNI_HOST_NAME: u8 = 0x00;

/// Extract the first SNI host name from a TCP payload that begins with a
/// TLS handshake record. Returns the lowercased name, or `None` when the
/// bytes are not a well-formed ClientHello carrying one.
pub(crate) fn client_hello_sni(payload: &[u8]) -> Option<String> {
    let mut record = Cursor::new(payload);

    if record.u8()? != CONTENT_TYPE_HANDSHAKE {
        return None;
    }
    if record.u8()? != 0x03 {
        // legacy_record_version major byte
        return None;
    }
    record.skip(1)?; // version minor
    let record_len = usize::from(record.u16()?);
    // Tolerate a short capture: walk what we have, bounded by the record.
    let body_len = record_len.min(payload.len().saturating_sub(5));
    let mut hs = Cursor::new(record.take(body_len)?);

    if hs.u8()? != HANDSHAKE_CLIENT_HELLO {
        return None;
    }
    let hello_len = {
        let b = hs.take(3)?;
        usize::from(b[0]) << 16 | usize::from(b[1]) << 8 | usize::from(b[2])
    };
    let mut hello = Cursor::new(hs.take(hello_len.min(body_len.saturating_sub(4)))?);

    hello.skip(2)?; // client_version
    hello.skip(32)?; // random
    let session_id_len = usize::from(hello.u8()?);
    hello.skip(session_id_len)?;
    let cipher_suites_len = usize::from(hello.u16()?);
    hello.skip(cipher_suites_len)?;
    let compression_len = usize::from(hello.u8()?);
    hello.skip(compression_len)?;

    let extensions_len = usize::from(hello.u16()?);
    let mut extensions = Cursor::new(hello.take(extensions_len)?);

    while let Some(ext_type) = extensions.u16() {
        let ext_len = usize::from(extensions.u16()?);
        let ext_data = extensions.take(ext_len)?;
        if ext_type == EXTENSION_SERVER_NAME {
            return parse_server_name_list(ext_data);
        }
    }
    None
}

fn parse_server_name_list(data: &[u8]) -> Option<String> {
    let mut list = Cursor::new(data);
    let list_len = usize::from(list.u16()?);
    let mut entries = Cursor::new(list.take(list_len)?);

    while let Some(name_type) = entries.u8() {
        let name_len = usize::from(entries.u16()?);
        let name = entries.take(name_len)?;
        if name_type == SNI_HOST_NAME {
            let host = std::str::from_utf8(name).ok()?;
            if host.is_empty() || !host.is_ascii() {
                return None;
            }
            return Some(host.to_ascii_lowercase());
        }
    }
    None
}

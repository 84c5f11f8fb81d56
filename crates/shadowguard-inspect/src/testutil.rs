//! Hand-rolled packet builders for tests.

/// DNS query payload: standard header (RD set), one A/IN question.
pub(crate) fn dns_query(name: &str) -> Vec<u8> {
    let mut out = vec![
        0x12, 0x34, // id
        0x01, 0x00, // flags: QR=0, RD=1
        0x00, 0x01, // qdcount
        0x00, 0x00, // ancount
        0x00, 0x00, // nscount
        0x00, 0x00, // arcount
    ];
    for label in name.split('.') {
        out.push(label.len() as u8);
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
    out.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]); // QTYPE=A, QCLASS=IN
    out
}

/// UDP datagram with checksum left zero.
pub(crate) fn udp_datagram(dst_port: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&12345u16.to_be_bytes());
    out.extend_from_slice(&dst_port.to_be_bytes());
    out.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(payload);
    out
}

/// TCP segment; `offset_words` > 5 pads the option area with zeros.
pub(crate) fn tcp_segment(dst_port: u16, offset_words: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&54321u16.to_be_bytes());
    out.extend_from_slice(&dst_port.to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes()); // seq
    out.extend_from_slice(&0u32.to_be_bytes()); // ack
    out.push(offset_words << 4);
    out.push(0x18); // PSH|ACK
    out.extend_from_slice(&0xffffu16.to_be_bytes()); // window
    out.extend_from_slice(&[0, 0, 0, 0]); // checksum, urgent
    out.resize(usize::from(offset_words) * 4, 0); // options padding
    out.extend_from_slice(payload);
    out
}

/// IPv4 packet, no options, fragment offset zero.
pub(crate) fn ipv4_packet(protocol: u8, payload: &[u8]) -> Vec<u8> {
    let total = 20 + payload.len();
    let mut out = vec![
        0x45, 0x00, // version/IHL, DSCP
        (total >> 8) as u8,
        total as u8,
        0x00, 0x01, // identification
        0x40, 0x00, // DF, fragment offset 0
        0x40, protocol, // TTL, protocol
        0x00, 0x00, // checksum
        10, 0, 0, 2, // src
        10, 0, 0, 1, // dst
    ];
    out.extend_from_slice(payload);
    out
}

/// IPv6 packet with optional raw extension-header bytes.
pub(crate) fn ipv6_packet(next_header: u8, extensions: &[u8], payload: &[u8]) -> Vec<u8> {
    let body_len = extensions.len() + payload.len();
    let mut out = vec![0x60, 0x00, 0x00, 0x00];
    out.extend_from_slice(&(body_len as u16).to_be_bytes());
    out.push(next_header);
    out.push(64); // hop limit
    out.extend_from_slice(&[0u8; 16]); // src ::
    out.extend_from_slice(&[0u8; 16]); // dst ::
    out.extend_from_slice(extensions);
    out.extend_from_slice(payload);
    out
}

/// TLS 1.2 ClientHello record with the given extensions.
pub(crate) fn client_hello_with_extensions(extensions: &[(u16, &[u8])]) -> Vec<u8> {
    let mut ext_block = Vec::new();
    for (ext_type, data) in extensions {
        ext_block.extend_from_slice(&ext_type.to_be_bytes());
        ext_block.extend_from_slice(&(data.len() as u16).to_be_bytes());
        ext_block.extend_from_slice(data);
    }

    let mut body = Vec::new();
    body.extend_from_slice(&[0x03, 0x03]); // client_version
    body.extend_from_slice(&[0u8; 32]); // random
    body.push(0); // session_id length
    body.extend_from_slice(&[0x00, 0x02, 0x13, 0x01]); // one cipher suite
    body.extend_from_slice(&[0x01, 0x00]); // null compression
    body.extend_from_slice(&(ext_block.len() as u16).to_be_bytes());
    body.extend_from_slice(&ext_block);

    let mut handshake = vec![0x01]; // client_hello
    handshake.push(0);
    handshake.extend_from_slice(&(body.len() as u16).to_be_bytes());
    handshake.extend_from_slice(&body);

    let mut record = vec![0x16, 0x03, 0x03];
    record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
    record.extend_from_slice(&handshake);
    record
}

/// ClientHello whose SNI extension carries `host`.
pub(crate) fn client_hello(host: &str) -> Vec<u8> {
    let mut sni = Vec::new();
    sni.extend_from_slice(&((host.len() + 3) as u16).to_be_bytes()); // list length
    sni.push(0x00); // host_name
    sni.extend_from_slice(&(host.len() as u16).to_be_bytes());
    sni.extend_from_slice(host.as_bytes());
    client_hello_with_extensions(&[(0x0000, &sni)])
}

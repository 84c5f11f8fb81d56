//! IPv4/IPv6 and TCP/UDP header walking.
//!
//! Every parser returns `Option`: `None` means "could not positively
//! identify", which the classifier maps to `Forward`. All slicing is
//! length-checked; nothing here can panic on arbitrary input.

/// Transport payload with its destination port.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Transport<'a> {
    Tcp { dst_port: u16, payload: &'a [u8] },
    Udp { dst_port: u16, payload: &'a [u8] },
}

const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;

/// Parse an IPv4 packet down to its transport payload.
pub(crate) fn parse_ipv4(packet: &[u8]) -> Option<Transport<'_>> {
    if packet.len() < 20 {
        return None;
    }
    if packet[0] >> 4 != 4 {
        return None;
    }
    let header_len = usize::from(packet[0] & 0x0f) * 4;
    if header_len < 20 || packet.len() < header_len {
        return None;
    }

    // Non-first fragments carry no transport header.
    let frag = u16::from_be_bytes([packet[6], packet[7]]);
    if frag & 0x1fff != 0 {
        return None;
    }

    let payload = &packet[header_len..];
    match packet[9] {
        PROTO_TCP => parse_tcp(payload),
        PROTO_UDP => parse_udp(payload),
        _ => None,
    }
}

/// Parse an IPv6 packet, skipping extension headers to reach TCP/UDP.
pub(crate) fn parse_ipv6(packet: &[u8]) -> Option<Transport<'_>> {
    if packet.len() < 40 {
        return None;
    }
    if packet[0] >> 4 != 6 {
        return None;
    }

    let mut next_header = packet[6];
    let mut offset = 40usize;

    // Bounded walk; a legitimate chain is short.
    for _ in 0..8 {
        match next_header {
            PROTO_TCP => return parse_tcp(packet.get(offset..)?),
            PROTO_UDP => return parse_udp(packet.get(offset..)?),
            // Hop-by-hop, routing, destination options: length-prefixed.
            0 | 43 | 60 => {
                let ext = packet.get(offset..offset + 2)?;
                next_header = ext[0];
                offset += (usize::from(ext[1]) + 1) * 8;
            }
            // Authentication header counts in 4-octet units.
            51 => {
                let ext = packet.get(offset..offset + 2)?;
                next_header = ext[0];
                offset += (usize::from(ext[1]) + 2) * 4;
            }
            // Fragments cannot be inspected; let the stack reassemble.
            44 => return None,
            // No next header, ESP, or anything unknown.
            _ => return None,
        }
    }
    None
}

fn parse_tcp(segment: &[u8]) -> Option<Transport<'_>> {
    if segment.len() < 20 {
        return None;
    }
    let dst_port = u16::from_be_bytes([segment[2], segment[3]]);
    let data_offset = usize::from(segment[12] >> 4) * 4;
    if data_offset < 20 || segment.len() < data_offset {
        return None;
    }
    Some(Transport::Tcp {
        dst_port,
        payload: &segment[data_offset..],
    })
}

fn parse_udp(datagram: &[u8]) -> Option<Transport<'_>> {
    if datagram.len() < 8 {
        return None;
    }
    let dst_port = u16::from_be_bytes([datagram[2], datagram[3]]);
    let udp_len = usize::from(u16::from_be_bytes([datagram[4], datagram[5]]));
    if udp_len < 8 {
        return None;
    }
    let end = udp_len.min(datagram.len());
    Some(Transport::Udp {
        dst_port,
        payload: &datagram[8..end],
    })
}

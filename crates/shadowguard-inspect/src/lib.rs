//! shadowguard-inspect: per-packet drop/forward decisions.
//!
//! The classifier inspects the earliest layer of a raw IP datagram that can
//! reveal a hostname (the DNS question on UDP/53, the ClientHello SNI on
//! TCP/443, the `Host:` header on TCP/80) and asks the domain index whether
//! that hostname is blocked.
//!
//! Two rules govern everything here: blocking must be a positive
//! identification (any parse failure forwards), and `classify` is a pure
//! function of the packet bytes and the current index snapshot: no flow
//! table, no locks, nothing that can panic on hostile input.

mod dns;
mod http;
mod ip;
mod tls;
#[cfg(test)]
pub(crate) mod testutil;

use std::sync::Arc;
use tracing::debug;

use shadowguard_index::SharedIndex;

use crate::ip::Transport;

const DNS_PORT: u16 = 53;
const HTTP_PORT: u16 = 80;
const TLS_PORT: u16 = 443;

/// Address family of a raw packet, as reported by the platform tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

/// Verdict for one packet. `Forward` must leave the bytes untouched;
/// `Drop` has no side effect beyond counter bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Forward,
    Drop,
}

/// Stateless packet classifier bound to the live index handle.
#[derive(Debug, Clone)]
pub struct Inspector {
    index: Arc<SharedIndex>,
}

impl Inspector {
    /// Classifier reading snapshots from `index`.
    pub fn new(index: Arc<SharedIndex>) -> Self {
        Self { index }
    }

    /// Decide one packet. Never fails; anything unparseable forwards.
    pub fn classify(&self, packet: &[u8], family: IpFamily) -> Decision {
        let transport = match family {
            IpFamily::V4 => ip::parse_ipv4(packet),
            IpFamily::V6 => ip::parse_ipv6(packet),
        };

        let host = match transport {
            Some(Transport::Udp { dst_port: DNS_PORT, payload }) => dns::query_name(payload),
            Some(Transport::Tcp { dst_port: TLS_PORT, payload }) => tls::client_hello_sni(payload),
            Some(Transport::Tcp { dst_port: HTTP_PORT, payload }) => http::host_header(payload),
            _ => None,
        };

        match host {
            Some(host) if self.index.load().lookup(&host).blocked => {
                debug!(host = %host, "dropping packet for blocked host");
                Decision::Drop
            }
            _ => Decision::Forward,
        }
    }
}

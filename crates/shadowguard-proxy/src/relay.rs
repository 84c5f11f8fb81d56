//! Bidirectional byte pumping.
//!
//! Two read-forward loops, one per direction, each with a 64 KiB buffer.
//! Backpressure is the natural TCP kind: a direction reads again only after
//! its previous write completed. Either side finishing (EOF, error, idle
//! timeout) tears the whole relay down; cancellation does the same.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::ProxyError;

const RELAY_BUF_BYTES: usize = 64 * 1024;

/// Bytes moved in each direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RelayTotals {
    pub client_to_origin: u64,
    pub origin_to_client: u64,
}

/// Pump bytes both ways until EOF, error, idle timeout or cancellation.
pub(crate) async fn pump<C, O>(
    client: C,
    origin: O,
    idle_timeout: Duration,
    cancel: &CancellationToken,
) -> crate::Result<RelayTotals>
where
    C: AsyncRead + AsyncWrite + Unpin,
    O: AsyncRead + AsyncWrite + Unpin,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (origin_read, origin_write) = tokio::io::split(origin);

    let upstream = copy_half(client_read, origin_write, idle_timeout);
    let downstream = copy_half(origin_read, client_write, idle_timeout);
    tokio::pin!(upstream, downstream);

    let mut totals = RelayTotals::default();

    // The first direction to finish ends the relay; dropping the halves
    // closes both sockets.
    tokio::select! {
        () = cancel.cancelled() => Err(ProxyError::Io(std::io::Error::new(
            std::io::ErrorKind::Interrupted,
            "proxy shutting down",
        ))),
        result = &mut upstream => {
            totals.client_to_origin = result?;
            Ok(totals)
        }
        result = &mut downstream => {
            totals.origin_to_client = result?;
            Ok(totals)
        }
    }
}

/// One direction: read, write fully, repeat. EOF flushes and half-closes
/// the write side.
async fn copy_half<R, W>(mut reader: R, mut writer: W, idle: Duration) -> crate::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUF_BYTES];
    let mut total = 0u64;

    loop {
        let n = timeout(idle, reader.read(&mut buf))
            .await
            .map_err(|_| ProxyError::Timeout("streaming (idle)"))??;
        if n == 0 {
            let _ = writer.shutdown().await;
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
}

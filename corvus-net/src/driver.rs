//! Drives one [`Socket`] off a real `tokio` transport: a read loop that
//! turns transport bytes into `complete_read` calls, and a write loop that
//! drains whatever `Socket::write` has queued. This is the `tokio`
//! readiness-based stand-in for the OS completion port spec.md assumes;
//! see `corvus-http2`'s crate docs for why that substitution is sound here.

use std::sync::Arc;
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{trace, warn};

use crate::buffer::BufferPool;
use crate::socket::{Socket, State, DEFAULT_HOUSEKEEPING_INTERVAL};

/// Pump inbound bytes from `stream` into `socket` until a read error or
/// orderly shutdown, pausing between reads whenever the socket has no read
/// credit left (spec §4.4) and resuming once `Socket::read` restores it.
/// Each read is staged through the registered `pool` so its accounting
/// stays live on the hot path, rather than just existing for its own tests.
pub async fn drive_reads(socket: Arc<Socket>, pool: Arc<BufferPool>, mut read_half: tokio::net::tcp::OwnedReadHalf) {
    let slice_size = pool.slice_size();
    loop {
        if !socket.wait_for_read_credit().await {
            return;
        }

        let mut staging = BytesMut::zeroed(slice_size);
        let n = match read_half.read(&mut staging).await {
            Ok(0) => {
                trace!("peer closed the connection");
                socket.complete_read(None);
                return;
            }
            Ok(n) => n,
            Err(err) => {
                warn!(%err, "read error, failing socket");
                socket.fail();
                return;
            }
        };

        let id = pool.acquire();
        let delivered = pool.with_slice_mut(id, |slice| {
            slice[..n].copy_from_slice(&staging[..n]);
            Bytes::copy_from_slice(&slice[..n])
        });
        pool.release(id);

        socket.complete_read(Some(delivered));
    }
}

/// Poll `socket`'s backlog timeout and run its notifier's housekeeping
/// (e.g. HTTP/2 closed-stream reaping) every `poll_interval`, until the
/// socket closes.
pub async fn drive_housekeeping(socket: Arc<Socket>, poll_interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        ticker.tick().await;
        if socket.state() == State::Closed {
            return;
        }
        socket.check_backlog_timeout(Instant::now());
        socket.housekeeping();
    }
}

/// Drain `outbound` (fed by [`Socket::write`], via `promote_writes` once
/// [`Socket::bind_writer`] wires this channel in) onto `stream`, calling
/// `complete_write` once each chunk lands.
pub async fn drive_writes(
    socket: Arc<Socket>,
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut outbound: tokio::sync::mpsc::UnboundedReceiver<Bytes>,
) {
    while let Some(chunk) = outbound.recv().await {
        if let Err(err) = write_half.write_all(&chunk).await {
            warn!(%err, "write error, failing socket");
            socket.fail();
            return;
        }
        socket.complete_write();
    }
}

/// Split a connected stream, wire it to `socket`'s read/write loops, and
/// bind the write channel into `socket` itself so `Socket::write` reaches
/// the transport. The returned sender is handed back only for a caller
/// that wants to push bytes ahead of `Socket`'s own accounting (e.g.
/// `connect`'s `initial_data`); ordinary callers just use `Socket::write`.
pub fn spawn_driver(
    socket: Arc<Socket>,
    pool: Arc<BufferPool>,
    stream: TcpStream,
) -> tokio::sync::mpsc::UnboundedSender<Bytes> {
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    socket.bind_writer(tx.clone());
    tokio::spawn(drive_reads(Arc::clone(&socket), pool, read_half));
    tokio::spawn(drive_writes(Arc::clone(&socket), write_half, rx));
    tokio::spawn(drive_housekeeping(socket, DEFAULT_HOUSEKEEPING_INTERVAL));
    tx
}

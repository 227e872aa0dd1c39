//! `listen` and `connect`, the two ways a [`Socket`] comes into being
//! (spec §4.4). Both hand the resulting socket to a driver task pair and
//! return the live [`Socket`] plus a sender for outbound bytes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::buffer::BufferPool;
use crate::driver::spawn_driver;
use crate::notify::SocketNotify;
use crate::socket::Socket;

/// Produces the notifier that will own an accepted connection, given its
/// peer address — the socket layer's analogue of `IAppSocketNotifyFactory`.
pub trait SocketFactory: Send + Sync {
    fn create(&self, peer: SocketAddr) -> Arc<dyn SocketNotify>;
}

pub struct Connected {
    pub socket: Arc<Socket>,
    pub outbound: UnboundedSender<Bytes>,
}

fn accept_one(stream: TcpStream, pool: &Arc<BufferPool>, notifier: Arc<dyn SocketNotify>) -> Connected {
    let socket = Arc::new(Socket::new(notifier));
    socket.init_notifier_backref();
    socket.begin_accept();
    socket.on_connected();
    let outbound = spawn_driver(Arc::clone(&socket), Arc::clone(pool), stream);
    Connected { socket, outbound }
}

/// Bind `addr` and hand every accepted connection to `factory`, forever
/// (until the task is cancelled). Mirrors `listen(endpoint, factory)`.
pub async fn listen(
    addr: SocketAddr,
    pool: Arc<BufferPool>,
    factory: Arc<dyn SocketFactory>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "accepted connection");
        let notifier = factory.create(peer);
        let _connected = accept_one(stream, &pool, notifier);
        // `_connected` is intentionally dropped here: the driver tasks
        // spawned inside hold their own Arc<Socket>, the notifier is
        // expected to retain whatever handle it needs (e.g. the demux
        // registers the socket against its own match-timeout table), and
        // `Socket::bind_writer` has already given the socket its own clone
        // of the write channel, so dropping this struct's copy doesn't
        // close it.
    }
}

/// Outbound `connect(notifier, remote, local, initial_data, timeout)`.
/// `local` binding is left to the OS (spec doesn't require a specific
/// source port); `initial_data`, if present, is written immediately once
/// connected.
pub async fn connect(
    remote: SocketAddr,
    pool: Arc<BufferPool>,
    notifier: Arc<dyn SocketNotify>,
    initial_data: Option<Bytes>,
    timeout: Duration,
) -> std::io::Result<Connected> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(remote))
        .await
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"))??;
    let socket = Arc::new(Socket::new(notifier));
    socket.init_notifier_backref();
    socket.begin_connect();
    socket.on_connected();
    let outbound = spawn_driver(Arc::clone(&socket), pool, stream);
    if let Some(data) = initial_data {
        socket.write(data);
    }
    Ok(Connected { socket, outbound })
}

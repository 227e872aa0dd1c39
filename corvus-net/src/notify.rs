//! The callback interface a socket owner implements to receive completion
//! notifications (spec §4.4), mirroring [`corvus_core::shutdown::ShutdownNotify`]'s
//! shape: a trait with default no-op methods so callers only override what
//! they need.

use std::sync::Weak;

use bytes::Bytes;

use crate::socket::Socket;

/// Implemented by whatever owns a [`crate::socket::Socket`] for its
/// lifetime — an `AppSocketDemux` notifier, an HTTP/2 connection, or a
/// test harness.
pub trait SocketNotify: Send + Sync {
    /// New bytes arrived. Return `false` to pause read credit until the
    /// owner calls [`crate::socket::Socket::read`] again.
    fn on_read(&self, data: Bytes) -> bool {
        let _ = data;
        true
    }

    /// Fires once inside `write()` when the pre-write ("waiting") byte
    /// count becomes nonzero, and again as an event-queue task once the
    /// in-flight ("incomplete") count drains to zero.
    fn on_buffer_changed(&self, waiting: usize, incomplete: usize) {
        let _ = (waiting, incomplete);
    }

    /// The socket has fully drained its in-flight requests after an error
    /// or an orderly shutdown and is now [`crate::socket::State::Closed`].
    fn on_disconnect(&self) {}

    /// Called once, immediately after the [`Socket`] owning this notifier
    /// is constructed (see [`Socket::init_notifier_backref`]). A notifier
    /// that needs to call back into its own socket later — most notably
    /// `AppSocketDemux`, which rebinds the socket to a different notifier
    /// once it has matched a protocol family — stores this for later
    /// rather than requiring the socket up front, since the socket can't
    /// exist before the notifier that is passed into its constructor does.
    fn attach_socket(&self, socket: Weak<Socket>) {
        let _ = socket;
    }

    /// Called periodically by a driver task alongside
    /// [`Socket::check_backlog_timeout`] — e.g. an HTTP/2 connection reaps
    /// its closed-stream table here. A no-op for notifiers with nothing to
    /// reclaim.
    fn housekeeping(&self) {}
}

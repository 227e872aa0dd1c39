//! The completion-style byte socket layer: a registered buffer pool,
//! per-socket state machine with bounded in-flight reads/writes and
//! backlog-timeout disconnect, and the `tokio` transport driver that feeds
//! it. See `corvus-http2`'s crate docs and DESIGN.md for why this is built
//! over `tokio`'s readiness-based I/O instead of a literal IOCP port.

#![deny(unreachable_pub)]

pub mod buffer;
pub mod driver;
pub mod listener;
pub mod notify;
pub mod socket;

pub use buffer::BufferPool;
pub use listener::{connect, listen, Connected, SocketFactory};
pub use notify::SocketNotify;
pub use socket::{Socket, State};

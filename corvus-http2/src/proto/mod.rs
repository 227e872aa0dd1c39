//! The HTTP/2 connection engine: turns a stream of [`crate::frame::Frame`]s
//! into application-visible [`Event`]s, tracking per-stream state and flow
//! control along the way.

mod conn;
mod error;
mod stream;

pub use conn::{Event, HttpConn, Role};
pub use error::Error;
pub use stream::{HttpStream, State};

//! An HTTP/2 connection engine (RFC 7540) with HPACK header compression
//! (RFC 7541): framing, the stream state machine, flow control, SETTINGS
//! negotiation, and the connection/stream error taxonomy. Pure protocol
//! logic — no socket I/O; see `corvus-net` for the byte-socket layer this
//! is meant to sit on top of.

#![deny(unreachable_pub)]

mod config;
mod preface;

pub mod codec;
pub mod connection;
pub mod frame;
pub mod hpack;
pub mod proto;
pub mod route;

pub use codec::{Codec, CodecError};
pub use config::Http2Config;
pub use connection::Connection;
pub use preface::{is_complete_preface, is_preface_prefix, PREFACE};
pub use proto::{Event, HttpConn, Role};
pub use route::{Handler, MethodMask, Request, Responder, RouteTable};

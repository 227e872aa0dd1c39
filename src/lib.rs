//! `corvus` is the facade crate over the core of a high-throughput network
//! service framework: a completion-driven task runtime, a byte-socket layer,
//! a protocol-sniffing demultiplexer, and a full HTTP/2 + HPACK engine.
//!
//! Each layer lives in its own crate and is re-exported here behind a
//! feature flag so downstream users can depend on just the slice they need.
//!
//! - [`core`] — task runtime, timer wheel, shutdown coordinator, handle maps.
//! - [`net`] — completion-style byte socket layer and buffer pool.
//! - [`demux`] — protocol-family sniffing and dispatch ("AppSocket").
//! - [`http2`] — the HTTP/2 connection engine and HPACK codec.

#![deny(unreachable_pub)]

#[cfg(feature = "core")]
#[doc(inline)]
pub use corvus_core as core;

#[cfg(feature = "net")]
#[doc(inline)]
pub use corvus_net as net;

#[cfg(feature = "demux")]
#[doc(inline)]
pub use corvus_demux as demux;

#[cfg(feature = "http2")]
#[doc(inline)]
pub use corvus_http2 as http2;

#[doc(inline)]
pub use corvus_error as error;

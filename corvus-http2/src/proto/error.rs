//! The connection/stream error taxonomy an HTTP/2 engine dispatches
//! between: a connection error tears the whole connection down behind a
//! `GOAWAY`, a stream error only resets the one stream behind `RST_STREAM`.

use crate::frame::{Reason, StreamId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Fatal to the whole connection; the caller should send `GOAWAY` with
    /// `reason` and `last_stream_id` then close the transport.
    Connection { reason: Reason, debug: &'static str },
    /// Fatal only to one stream; the caller should send `RST_STREAM`.
    Stream {
        stream_id: StreamId,
        reason: Reason,
    },
}

impl Error {
    pub fn connection(reason: Reason, debug: &'static str) -> Self {
        Self::Connection { reason, debug }
    }

    pub fn stream(stream_id: StreamId, reason: Reason) -> Self {
        Self::Stream { stream_id, reason }
    }

    pub fn reason(&self) -> Reason {
        match self {
            Self::Connection { reason, .. } => *reason,
            Self::Stream { reason, .. } => *reason,
        }
    }
}

impl From<crate::frame::Error> for Error {
    /// Frame-parse failures are connection errors unless the frame carried
    /// a concrete stream id, in which case they're scoped to that stream.
    fn from(err: crate::frame::Error) -> Self {
        Self::Connection {
            reason: err.reason(),
            debug: "frame parse error",
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection { reason, debug } => write!(f, "connection error {reason:?}: {debug}"),
            Self::Stream { stream_id, reason } => {
                write!(f, "stream {stream_id:?} error {reason:?}")
            }
        }
    }
}

impl std::error::Error for Error {}

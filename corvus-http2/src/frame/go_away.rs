//! `GOAWAY` frame (RFC 7540 §6.8): announces graceful shutdown, naming the
//! last stream id the sender will process and an error code plus optional
//! debug data.

use bytes::{BufMut, Bytes};

use super::head::{Head, Kind};
use super::reason::Reason;
use super::{Error, StreamId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoAway {
    last_stream_id: StreamId,
    reason: Reason,
    debug_data: Bytes,
}

impl GoAway {
    pub fn new(last_stream_id: StreamId, reason: Reason) -> Self {
        Self {
            last_stream_id,
            reason,
            debug_data: Bytes::new(),
        }
    }

    pub fn with_debug_data(mut self, debug_data: impl Into<Bytes>) -> Self {
        self.debug_data = debug_data.into();
        self
    }

    pub fn last_stream_id(&self) -> StreamId {
        self.last_stream_id
    }

    pub fn reason(&self) -> Reason {
        self.reason
    }

    pub fn debug_data(&self) -> &Bytes {
        &self.debug_data
    }

    pub fn load(payload: &[u8]) -> Result<Self, Error> {
        if payload.len() < 8 {
            return Err(Error::BadFrameSize);
        }
        let last_stream_id = StreamId::parse([payload[0], payload[1], payload[2], payload[3]]);
        let reason = Reason::from(u32::from_be_bytes([
            payload[4], payload[5], payload[6], payload[7],
        ]));
        Ok(Self {
            last_stream_id,
            reason,
            debug_data: Bytes::copy_from_slice(&payload[8..]),
        })
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        let head = Head::new(Kind::GoAway, 0, StreamId::zero());
        head.encode(8 + self.debug_data.len(), dst);
        dst.put_slice(&self.last_stream_id.to_be_bytes());
        dst.put_u32(self.reason.code());
        dst.put_slice(&self.debug_data);
    }
}

impl From<GoAway> for super::Frame {
    fn from(frame: GoAway) -> Self {
        Self::GoAway(frame)
    }
}

//! `RST_STREAM` frame (RFC 7540 §6.4): immediately terminates a stream
//! with an error code, the stream-error tier of spec §7.

use bytes::BufMut;

use super::head::{Head, Kind};
use super::reason::Reason;
use super::{Error, StreamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reset {
    stream_id: StreamId,
    reason: Reason,
}

impl Reset {
    pub fn new(stream_id: StreamId, reason: Reason) -> Self {
        Self { stream_id, reason }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn reason(&self) -> Reason {
        self.reason
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        if payload.len() != 4 {
            return Err(Error::InvalidPayloadLength);
        }
        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }
        let reason = Reason::from(u32::from_be_bytes([
            payload[0], payload[1], payload[2], payload[3],
        ]));
        Ok(Self {
            stream_id: head.stream_id(),
            reason,
        })
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        let head = Head::new(Kind::Reset, 0, self.stream_id);
        head.encode(4, dst);
        dst.put_u32(self.reason.code());
    }
}

impl From<Reset> for super::Frame {
    fn from(frame: Reset) -> Self {
        Self::Reset(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn connection_level_reset_is_rejected() {
        let head = Head::new(Kind::Reset, 0, StreamId::zero());
        let payload = Reason::CANCEL.code().to_be_bytes();
        assert_eq!(Reset::load(head, &payload), Err(Error::InvalidStreamId));
    }

    #[test]
    fn round_trips() {
        let frame = Reset::new(StreamId::new(5), Reason::REFUSED_STREAM);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        let (head, _) = Head::parse(&buf[..super::super::head::HEADER_LEN]);
        let decoded = Reset::load(head, &buf[9..]).unwrap_or_else(|_| panic!("decode failed"));
        assert_eq!(decoded, frame);
    }
}

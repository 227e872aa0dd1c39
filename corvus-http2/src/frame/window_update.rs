//! `WINDOW_UPDATE` frame (RFC 7540 §6.9): a 31-bit increment applied to
//! either the connection window (stream id 0) or a single stream's window.

use bytes::BufMut;

use super::head::{Head, Kind};
use super::{Error, StreamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdate {
    stream_id: StreamId,
    increment: u32,
}

const WINDOW_UPDATE_MASK: u32 = (1 << 31) - 1;

impl WindowUpdate {
    pub fn new(stream_id: StreamId, increment: u32) -> Self {
        Self {
            stream_id,
            increment: increment & WINDOW_UPDATE_MASK,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn size_increment(&self) -> u32 {
        self.increment
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        if payload.len() != 4 {
            return Err(Error::InvalidPayloadLength);
        }
        let increment = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
            & WINDOW_UPDATE_MASK;
        if increment == 0 {
            return Err(Error::InvalidWindowUpdateValue);
        }
        Ok(Self {
            stream_id: head.stream_id(),
            increment,
        })
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        let head = Head::new(Kind::WindowUpdate, 0, self.stream_id);
        head.encode(4, dst);
        dst.put_u32(self.increment);
    }
}

impl From<WindowUpdate> for super::Frame {
    fn from(frame: WindowUpdate) -> Self {
        Self::WindowUpdate(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn zero_increment_is_rejected() {
        let head = Head::new(Kind::WindowUpdate, 0, StreamId::new(3));
        let payload = [0u8, 0, 0, 0];
        assert_eq!(
            WindowUpdate::load(head, &payload),
            Err(Error::InvalidWindowUpdateValue)
        );
    }

    #[test]
    fn round_trips() {
        let frame = WindowUpdate::new(StreamId::new(3), 1024);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        let (head, len) = Head::parse(&buf[..super::super::head::HEADER_LEN]);
        assert_eq!(len, 4);
        let decoded = WindowUpdate::load(head, &buf[9..]).unwrap_or_else(|_| panic!("decode failed"));
        assert_eq!(decoded, frame);
    }
}

//! `DATA` frame (RFC 7540 §6.1): request/response body bytes, optionally
//! padded. Every `DATA` frame debits both the connection and stream flow
//! windows by its full on-wire length, padding included (spec §4.6).

use bytes::{BufMut, Bytes};

use super::head::{Head, Kind};
use super::{Error, StreamId};

const END_STREAM: u8 = 0x1;
const PADDED: u8 = 0x8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    stream_id: StreamId,
    payload: Bytes,
    pad_len: u8,
    end_stream: bool,
}

impl Data {
    pub fn new(stream_id: StreamId, payload: impl Into<Bytes>) -> Self {
        Self {
            stream_id,
            payload: payload.into(),
            pad_len: 0,
            end_stream: false,
        }
    }

    pub fn set_end_stream(&mut self, end_stream: bool) {
        self.end_stream = end_stream;
    }

    pub fn is_end_stream(&self) -> bool {
        self.end_stream
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Bytes this frame debits from flow-control windows: payload plus
    /// padding plus the one-byte pad-length field, per spec §4.6.
    pub fn flow_control_len(&self) -> usize {
        self.payload.len() + self.pad_len as usize + if self.pad_len > 0 { 1 } else { 0 }
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        let mut body = payload;
        let mut pad_len = 0u8;
        if head.flags() & PADDED != 0 {
            if body.is_empty() {
                return Err(Error::TooMuchPadding);
            }
            pad_len = body[0];
            body = &body[1..];
            if pad_len as usize > body.len() {
                return Err(Error::TooMuchPadding);
            }
            body = &body[..body.len() - pad_len as usize];
        }
        Ok(Self {
            stream_id: head.stream_id(),
            payload: Bytes::copy_from_slice(body),
            pad_len,
            end_stream: head.flags() & END_STREAM != 0,
        })
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        let mut flags = 0u8;
        if self.end_stream {
            flags |= END_STREAM;
        }
        if self.pad_len > 0 {
            flags |= PADDED;
        }
        let head = Head::new(Kind::Data, flags, self.stream_id);
        let mut len = self.payload.len();
        if self.pad_len > 0 {
            len += 1 + self.pad_len as usize;
        }
        head.encode(len, dst);
        if self.pad_len > 0 {
            dst.put_u8(self.pad_len);
        }
        dst.put_slice(&self.payload);
        for _ in 0..self.pad_len {
            dst.put_u8(0);
        }
    }
}

impl From<Data> for super::Frame {
    fn from(frame: Data) -> Self {
        Self::Data(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn round_trips_without_padding() {
        let mut frame = Data::new(StreamId::new(1), Bytes::from_static(b"hi"));
        frame.set_end_stream(true);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        let (head, len) = Head::parse(&buf[..super::super::head::HEADER_LEN]);
        assert_eq!(len, 2);
        let decoded = Data::load(head, &buf[9..]).unwrap_or_else(|_| panic!("decode failed"));
        assert_eq!(decoded, frame);
        assert!(decoded.is_end_stream());
    }

    #[test]
    fn pad_length_exceeding_payload_is_rejected() {
        let head = Head::new(Kind::Data, PADDED, StreamId::new(1));
        let payload = [5u8]; // claims 5 bytes padding, none present
        assert_eq!(Data::load(head, &payload), Err(Error::TooMuchPadding));
    }
}

//! The fixed 9-byte frame header (spec §6): a 24-bit length, an 8-bit
//! type, an 8-bit flags field, and a 31-bit stream id with its reserved
//! high bit.

use bytes::BufMut;

use super::StreamId;

pub const HEADER_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Data,
    Headers,
    Priority,
    Reset,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl Kind {
    fn from_u8(byte: u8) -> Self {
        match byte {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x2 => Self::Priority,
            0x3 => Self::Reset,
            0x4 => Self::Settings,
            0x5 => Self::PushPromise,
            0x6 => Self::Ping,
            0x7 => Self::GoAway,
            0x8 => Self::WindowUpdate,
            0x9 => Self::Continuation,
            other => Self::Unknown(other),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Data => 0x0,
            Self::Headers => 0x1,
            Self::Priority => 0x2,
            Self::Reset => 0x3,
            Self::Settings => 0x4,
            Self::PushPromise => 0x5,
            Self::Ping => 0x6,
            Self::GoAway => 0x7,
            Self::WindowUpdate => 0x8,
            Self::Continuation => 0x9,
            Self::Unknown(byte) => byte,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Head {
    kind: Kind,
    flags: u8,
    stream_id: StreamId,
}

impl Head {
    pub fn new(kind: Kind, flags: u8, stream_id: StreamId) -> Self {
        Self {
            kind,
            flags,
            stream_id,
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    /// Parse a 9-byte header; `bytes` must be exactly [`HEADER_LEN`] long.
    /// Returns the header plus the declared payload length.
    pub fn parse(bytes: &[u8]) -> (Self, u32) {
        debug_assert_eq!(bytes.len(), HEADER_LEN);
        let length = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
        let kind = Kind::from_u8(bytes[3]);
        let flags = bytes[4];
        let stream_id = StreamId::parse([bytes[5], bytes[6], bytes[7], bytes[8]]);
        (
            Self {
                kind,
                flags,
                stream_id,
            },
            length,
        )
    }

    pub fn encode(&self, payload_len: usize, dst: &mut impl BufMut) {
        debug_assert!(payload_len <= 0xff_ffff, "frame payload exceeds 24-bit length");
        let len_bytes = (payload_len as u32).to_be_bytes();
        dst.put_slice(&len_bytes[1..]);
        dst.put_u8(self.kind.to_u8());
        dst.put_u8(self.flags);
        dst.put_slice(&self.stream_id.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn round_trips_through_encode_parse() {
        let head = Head::new(Kind::Headers, 0x05, StreamId::new(3));
        let mut buf = BytesMut::new();
        head.encode(38, &mut buf);
        assert_eq!(buf.len(), HEADER_LEN);
        let (parsed, len) = Head::parse(&buf);
        assert_eq!(parsed, head);
        assert_eq!(len, 38);
    }

    #[test]
    fn unknown_type_round_trips_as_unknown() {
        let head = Head::new(Kind::Unknown(0xaa), 0, StreamId::zero());
        let mut buf = BytesMut::new();
        head.encode(0, &mut buf);
        let (parsed, _) = Head::parse(&buf);
        assert_eq!(parsed.kind(), Kind::Unknown(0xaa));
    }
}

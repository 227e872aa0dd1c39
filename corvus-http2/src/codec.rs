//! Byte-stream framing glue: buffers incoming bytes until a whole frame
//! header-plus-payload is available and decodes it, and encodes outgoing
//! [`Frame`]s straight onto the wire buffer. This is the seam between the
//! engine in `proto` and whatever byte transport feeds it (`corvus-net`'s
//! `Socket`, or a plain `TcpStream` wrapped in `tokio_util::codec::Framed`
//! for a standalone test).

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{Error, Frame, Head, Reason, HEADER_LEN};

/// Wraps a [`Decoder`]/[`Encoder`] pair around [`Frame`], enforcing a
/// maximum payload length (the local `SETTINGS_MAX_FRAME_SIZE`) on
/// incoming frames the way a real peer negotiation would.
pub struct Codec {
    max_frame_len: usize,
}

impl Codec {
    pub fn new(max_frame_len: u32) -> Self {
        Self {
            max_frame_len: max_frame_len as usize,
        }
    }

    pub fn set_max_frame_len(&mut self, max_frame_len: u32) {
        self.max_frame_len = max_frame_len as usize;
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(crate::frame::DEFAULT_MAX_FRAME_SIZE)
    }
}

/// A parse failure tagged with whether it should be reported as a
/// connection-level (`GOAWAY`) or stream-level (`RST_STREAM`) error; the
/// decoder itself has no stream-id-scoped state, so it leaves that call to
/// whoever owns the connection, except for the one case it must veto
/// outright: a declared length over the negotiated maximum.
#[derive(Debug)]
pub enum CodecError {
    Frame(Error),
    Io(std::io::Error),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<Error> for CodecError {
    fn from(err: Error) -> Self {
        Self::Frame(err)
    }
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Frame(e) => write!(f, "frame error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl std::error::Error for CodecError {}

impl CodecError {
    pub fn reason(&self) -> Reason {
        match self {
            Self::Frame(e) => e.reason(),
            Self::Io(_) => Reason::INTERNAL_ERROR,
        }
    }
}

impl Decoder for Codec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }
        let (head, len) = Head::parse(&src[..HEADER_LEN]);
        let len = len as usize;
        if len > self.max_frame_len {
            return Err(Error::BadFrameSize.into());
        }
        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }
        src.advance(HEADER_LEN);
        let payload = src.split_to(len);
        let frame = Frame::load(head, &payload)?;
        Ok(Some(frame))
    }
}

impl Encoder<Frame> for Codec {
    type Error = CodecError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), CodecError> {
        frame.encode(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Ping;

    #[test]
    fn decode_waits_for_a_full_header_then_a_full_payload() {
        let mut codec = Codec::default();
        let mut buf = BytesMut::new();
        Frame::Ping(Ping::new([1; 8])).encode(&mut buf);

        let mut partial = BytesMut::from(&buf[..HEADER_LEN + 3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        let mut whole = buf.clone();
        let frame = codec.decode(&mut whole).unwrap().unwrap();
        assert_eq!(frame, Frame::Ping(Ping::new([1; 8])));
        assert!(whole.is_empty());
    }

    #[test]
    fn oversized_declared_length_is_a_frame_size_error() {
        let mut codec = Codec::new(16);
        let mut buf = BytesMut::new();
        buf.put_slice(&[0, 0, 100]); // 24-bit length = 100, over the 16-byte cap
        buf.put_u8(0x6); // PING
        buf.put_u8(0);
        buf.put_slice(&[0, 0, 0, 0]);
        buf.resize(buf.len() + 100, 0);

        match codec.decode(&mut buf) {
            Err(CodecError::Frame(Error::BadFrameSize)) => {}
            other => panic!("expected BadFrameSize, got {other:?}"),
        }
    }

    #[test]
    fn encode_then_decode_round_trips() {
        let mut codec = Codec::default();
        let mut buf = BytesMut::new();
        let original = Frame::Ping(Ping::new([7; 8]));
        codec.encode(original.clone(), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, original);
    }
}

//! `HEADERS`, `PUSH_PROMISE` and `CONTINUATION` frames (RFC 7540 §6.2,
//! §6.6, §6.10). All three carry an opaque HPACK header-block fragment;
//! the fragment is only decodable once every `CONTINUATION` up to
//! `END_HEADERS` has been concatenated onto it (spec §4.6 frame parser).

use bytes::{BufMut, Bytes};

use super::head::{Head, Kind};
use super::priority::StreamDependency;
use super::{Error, StreamId};

const END_STREAM: u8 = 0x1;
const END_HEADERS: u8 = 0x4;
const PADDED: u8 = 0x8;
const PRIORITY: u8 = 0x20;

fn split_padding(head_flags: u8, mut payload: &[u8]) -> Result<(&[u8], u8), Error> {
    if head_flags & PADDED == 0 {
        return Ok((payload, 0));
    }
    if payload.is_empty() {
        return Err(Error::TooMuchPadding);
    }
    let pad_len = payload[0];
    payload = &payload[1..];
    if pad_len as usize > payload.len() {
        return Err(Error::TooMuchPadding);
    }
    Ok((&payload[..payload.len() - pad_len as usize], pad_len))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headers {
    stream_id: StreamId,
    header_block_fragment: Bytes,
    dependency: Option<StreamDependency>,
    end_headers: bool,
    end_stream: bool,
}

impl Headers {
    pub fn new(stream_id: StreamId, header_block_fragment: impl Into<Bytes>) -> Self {
        Self {
            stream_id,
            header_block_fragment: header_block_fragment.into(),
            dependency: None,
            end_headers: true,
            end_stream: false,
        }
    }

    pub fn set_end_stream(&mut self, end_stream: bool) {
        self.end_stream = end_stream;
    }

    pub fn set_end_headers(&mut self, end_headers: bool) {
        self.end_headers = end_headers;
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_headers(&self) -> bool {
        self.end_headers
    }

    pub fn is_end_stream(&self) -> bool {
        self.end_stream
    }

    pub fn header_block_fragment(&self) -> &Bytes {
        &self.header_block_fragment
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }
        let (mut body, _pad_len) = split_padding(head.flags(), payload)?;
        let dependency = if head.flags() & PRIORITY != 0 {
            if body.len() < 5 {
                return Err(Error::InvalidPayloadLength);
            }
            let (dep_bytes, rest) = body.split_at(5);
            body = rest;
            let raw = u32::from_be_bytes([dep_bytes[0], dep_bytes[1], dep_bytes[2], dep_bytes[3]]);
            Some(StreamDependency::new(
                StreamId::new(raw & ((1 << 31) - 1)),
                dep_bytes[4],
                raw & (1 << 31) != 0,
            ))
        } else {
            None
        };
        Ok(Self {
            stream_id: head.stream_id(),
            header_block_fragment: Bytes::copy_from_slice(body),
            dependency,
            end_headers: head.flags() & END_HEADERS != 0,
            end_stream: head.flags() & END_STREAM != 0,
        })
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        let mut flags = 0u8;
        if self.end_stream {
            flags |= END_STREAM;
        }
        if self.end_headers {
            flags |= END_HEADERS;
        }
        let head = Head::new(Kind::Headers, flags, self.stream_id);
        head.encode(self.header_block_fragment.len(), dst);
        dst.put_slice(&self.header_block_fragment);
    }
}

impl From<Headers> for super::Frame {
    fn from(frame: Headers) -> Self {
        Self::Headers(frame)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPromise {
    stream_id: StreamId,
    promised_stream_id: StreamId,
    header_block_fragment: Bytes,
    end_headers: bool,
}

impl PushPromise {
    pub fn new(
        stream_id: StreamId,
        promised_stream_id: StreamId,
        header_block_fragment: impl Into<Bytes>,
    ) -> Self {
        Self {
            stream_id,
            promised_stream_id,
            header_block_fragment: header_block_fragment.into(),
            end_headers: true,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn promised_stream_id(&self) -> StreamId {
        self.promised_stream_id
    }

    pub fn is_end_headers(&self) -> bool {
        self.end_headers
    }

    pub fn header_block_fragment(&self) -> &Bytes {
        &self.header_block_fragment
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }
        let (body, _pad_len) = split_padding(head.flags(), payload)?;
        if body.len() < 4 {
            return Err(Error::InvalidPayloadLength);
        }
        let promised_stream_id =
            StreamId::parse([body[0], body[1], body[2], body[3]]);
        Ok(Self {
            stream_id: head.stream_id(),
            promised_stream_id,
            header_block_fragment: Bytes::copy_from_slice(&body[4..]),
            end_headers: head.flags() & END_HEADERS != 0,
        })
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        let flags = if self.end_headers { END_HEADERS } else { 0 };
        let head = Head::new(Kind::PushPromise, flags, self.stream_id);
        head.encode(4 + self.header_block_fragment.len(), dst);
        dst.put_slice(&self.promised_stream_id.to_be_bytes());
        dst.put_slice(&self.header_block_fragment);
    }
}

impl From<PushPromise> for super::Frame {
    fn from(frame: PushPromise) -> Self {
        Self::PushPromise(frame)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    stream_id: StreamId,
    header_block_fragment: Bytes,
    end_headers: bool,
}

impl Continuation {
    pub fn new(stream_id: StreamId, header_block_fragment: impl Into<Bytes>) -> Self {
        Self {
            stream_id,
            header_block_fragment: header_block_fragment.into(),
            end_headers: true,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_headers(&self) -> bool {
        self.end_headers
    }

    pub fn header_block_fragment(&self) -> &Bytes {
        &self.header_block_fragment
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }
        Ok(Self {
            stream_id: head.stream_id(),
            header_block_fragment: Bytes::copy_from_slice(payload),
            end_headers: head.flags() & END_HEADERS != 0,
        })
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        let flags = if self.end_headers { END_HEADERS } else { 0 };
        let head = Head::new(Kind::Continuation, flags, self.stream_id);
        head.encode(self.header_block_fragment.len(), dst);
        dst.put_slice(&self.header_block_fragment);
    }
}

impl From<Continuation> for super::Frame {
    fn from(frame: Continuation) -> Self {
        Self::Continuation(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn headers_round_trip_without_priority() {
        let mut frame = Headers::new(StreamId::new(1), Bytes::from_static(b"hpack-bytes"));
        frame.set_end_stream(true);
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        let (head, _) = Head::parse(&buf[..super::super::head::HEADER_LEN]);
        let decoded = Headers::load(head, &buf[9..]).unwrap_or_else(|_| panic!("decode failed"));
        assert_eq!(decoded, frame);
    }

    #[test]
    fn connection_level_headers_rejected() {
        let head = Head::new(Kind::Headers, END_HEADERS, StreamId::zero());
        assert_eq!(Headers::load(head, &[]), Err(Error::InvalidStreamId));
    }

    #[test]
    fn continuation_preserves_end_headers_flag() {
        let frame = Continuation::new(StreamId::new(3), Bytes::from_static(b"more"));
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        let (head, _) = Head::parse(&buf[..super::super::head::HEADER_LEN]);
        let decoded = Continuation::load(head, &buf[9..]).unwrap_or_else(|_| panic!("decode failed"));
        assert!(decoded.is_end_headers());
    }
}

//! `PING` frame (RFC 7540 §6.7): an 8-byte opaque payload echoed back with
//! the `ACK` flag set.

use bytes::BufMut;

use super::head::{Head, Kind};
use super::{Error, StreamId};

const ACK: u8 = 0x1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    ack: bool,
    payload: [u8; 8],
}

impl Ping {
    pub fn new(payload: [u8; 8]) -> Self {
        Self { ack: false, payload }
    }

    pub fn pong(payload: [u8; 8]) -> Self {
        Self { ack: true, payload }
    }

    pub fn is_ack(&self) -> bool {
        self.ack
    }

    pub fn payload(&self) -> [u8; 8] {
        self.payload
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        if !head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }
        if payload.len() != 8 {
            return Err(Error::BadFrameSize);
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(payload);
        Ok(Self {
            ack: head.flags() & ACK != 0,
            payload: buf,
        })
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        let head = Head::new(
            Kind::Ping,
            if self.ack { ACK } else { 0 },
            StreamId::zero(),
        );
        head.encode(8, dst);
        dst.put_slice(&self.payload);
    }
}

impl From<Ping> for super::Frame {
    fn from(frame: Ping) -> Self {
        Self::Ping(frame)
    }
}

//! `PRIORITY` frame (RFC 7540 §6.3). Parsed and validated — a
//! self-dependency is a stream error per RFC 7540 §5.3.1 — but carries no
//! scheduling weight: RFC 7540's priority tree was later deprecated
//! (RFC 9113), so this is intentionally advisory-only (see DESIGN.md).

use bytes::BufMut;

use super::head::{Head, Kind};
use super::{Error, StreamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamDependency {
    dependency_id: StreamId,
    weight: u8,
    is_exclusive: bool,
}

impl StreamDependency {
    pub fn new(dependency_id: StreamId, weight: u8, is_exclusive: bool) -> Self {
        Self {
            dependency_id,
            weight,
            is_exclusive,
        }
    }

    pub fn dependency_id(&self) -> StreamId {
        self.dependency_id
    }

    fn load(payload: &[u8]) -> Result<Self, Error> {
        if payload.len() != 5 {
            return Err(Error::InvalidPayloadLength);
        }
        let raw = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        Ok(Self {
            dependency_id: StreamId::new(raw & ((1 << 31) - 1)),
            weight: payload[4],
            is_exclusive: raw & (1 << 31) != 0,
        })
    }

    fn encode(&self, dst: &mut impl BufMut) {
        let mut raw = self.dependency_id.as_u32();
        if self.is_exclusive {
            raw |= 1 << 31;
        }
        dst.put_u32(raw);
        dst.put_u8(self.weight);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    stream_id: StreamId,
    dependency: StreamDependency,
}

impl Priority {
    pub fn new(stream_id: StreamId, dependency: StreamDependency) -> Result<Self, Error> {
        if dependency.dependency_id == stream_id {
            return Err(Error::InvalidDependencyId);
        }
        Ok(Self {
            stream_id,
            dependency,
        })
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn dependency(&self) -> StreamDependency {
        self.dependency
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Self, Error> {
        let dependency = StreamDependency::load(payload)?;
        if dependency.dependency_id == head.stream_id() {
            return Err(Error::InvalidDependencyId);
        }
        Ok(Self {
            stream_id: head.stream_id(),
            dependency,
        })
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        let head = Head::new(Kind::Priority, 0, self.stream_id);
        head.encode(5, dst);
        self.dependency.encode(dst);
    }
}

impl From<Priority> for super::Frame {
    fn from(frame: Priority) -> Self {
        Self::Priority(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_dependency_is_rejected() {
        let head = Head::new(Kind::Priority, 0, StreamId::new(3));
        let mut payload = 3u32.to_be_bytes().to_vec();
        payload.push(16);
        assert_eq!(
            Priority::load(head, &payload),
            Err(Error::InvalidDependencyId)
        );
    }
}

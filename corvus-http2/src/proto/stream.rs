//! Per-stream state (RFC 7540 §5.1) plus the flow-control window and
//! pending-header bookkeeping a live stream carries.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::frame::StreamId;
use crate::hpack::HeaderField;

/// RFC 7540 §5.1's stream state machine, plus a `Deleted` tombstone state:
/// streams linger here for a grace period after `Closed` so a late,
/// harmlessly-racing frame from the peer doesn't have to be treated as a
/// protocol error (an open question the original left to the GC the
/// per-connection stream table already performs; see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
    Deleted,
}

impl State {
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed | Self::Deleted)
    }

    pub fn can_send_data(self) -> bool {
        matches!(self, Self::Open | Self::HalfClosedRemote)
    }

    pub fn can_recv_data(self) -> bool {
        matches!(self, Self::Open | Self::HalfClosedLocal)
    }

    /// Transition on sending `END_STREAM` locally.
    pub fn send_end_stream(self) -> Self {
        match self {
            Self::Open => Self::HalfClosedLocal,
            Self::HalfClosedRemote => Self::Closed,
            other => other,
        }
    }

    /// Transition on receiving `END_STREAM` from the peer.
    pub fn recv_end_stream(self) -> Self {
        match self {
            Self::Open => Self::HalfClosedRemote,
            Self::HalfClosedLocal => Self::Closed,
            other => other,
        }
    }
}

/// A concatenated, not-yet-decoded header block: fragments from `HEADERS`
/// and any trailing `CONTINUATION`s accumulate here until `END_HEADERS`.
#[derive(Debug, Default)]
pub struct PendingHeaderBlock {
    buf: Vec<u8>,
}

impl PendingHeaderBlock {
    pub fn push(&mut self, fragment: &Bytes) {
        self.buf.extend_from_slice(fragment);
    }

    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}

/// A `DATA` write that didn't fully fit under the send window at the time
/// of the call (spec §4.6): held here until a `WINDOW_UPDATE` grows the
/// window enough to emit more of it.
#[derive(Debug)]
pub struct PendingData {
    pub payload: Bytes,
    pub end_stream: bool,
}

#[derive(Debug)]
pub struct HttpStream {
    id: StreamId,
    state: State,
    /// Signed per RFC 7540 §6.9.2: a `SETTINGS_INITIAL_WINDOW_SIZE`
    /// decrease can drive an already-open stream's window negative.
    send_window: i64,
    recv_window: i64,
    pending_headers: PendingHeaderBlock,
    headers: Vec<HeaderField>,
    unsent: VecDeque<PendingData>,
}

impl HttpStream {
    pub fn new(id: StreamId, initial_send_window: u32, initial_recv_window: u32) -> Self {
        Self {
            id,
            state: State::Idle,
            send_window: initial_send_window as i64,
            recv_window: initial_recv_window as i64,
            pending_headers: PendingHeaderBlock::default(),
            headers: Vec::new(),
            unsent: VecDeque::new(),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn set_state(&mut self, state: State) {
        self.state = state;
    }

    pub fn send_window(&self) -> i64 {
        self.send_window
    }

    pub fn recv_window(&self) -> i64 {
        self.recv_window
    }

    pub fn adjust_send_window(&mut self, delta: i64) {
        self.send_window += delta;
    }

    pub fn debit_send_window(&mut self, amount: usize) {
        self.send_window -= amount as i64;
    }

    pub fn debit_recv_window(&mut self, amount: usize) {
        self.recv_window -= amount as i64;
    }

    pub fn credit_recv_window(&mut self, amount: u32) {
        self.recv_window += amount as i64;
    }

    pub fn pending_headers_mut(&mut self) -> &mut PendingHeaderBlock {
        &mut self.pending_headers
    }

    pub fn set_headers(&mut self, headers: Vec<HeaderField>) {
        self.headers = headers;
    }

    pub fn headers(&self) -> &[HeaderField] {
        &self.headers
    }

    pub fn has_unsent(&self) -> bool {
        !self.unsent.is_empty()
    }

    pub fn queue_unsent(&mut self, payload: Bytes, end_stream: bool) {
        self.unsent.push_back(PendingData { payload, end_stream });
    }

    pub fn pop_unsent(&mut self) -> Option<PendingData> {
        self.unsent.pop_front()
    }

    pub fn push_front_unsent(&mut self, data: PendingData) {
        self.unsent.push_front(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_stream_both_ways_closes() {
        let mut s = State::Open;
        s = s.send_end_stream();
        assert_eq!(s, State::HalfClosedLocal);
        s = s.recv_end_stream();
        assert_eq!(s, State::Closed);
        assert!(s.is_closed());
    }

    #[test]
    fn pending_header_block_accumulates_fragments() {
        let mut block = PendingHeaderBlock::default();
        block.push(&Bytes::from_static(b"ab"));
        block.push(&Bytes::from_static(b"cd"));
        assert_eq!(block.take(), b"abcd".to_vec());
        assert!(block.take().is_empty());
    }
}

//! The per-connection HTTP/2 engine: stream table, HPACK codec pair,
//! connection-level flow control, and SETTINGS negotiation. Pure protocol
//! logic — reading and writing the underlying transport is the socket
//! layer's job; this type only turns inbound [`Frame`]s into [`Event`]s
//! and queues outbound frames in response.

use std::collections::HashMap;

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::frame::{
    self, Data, Frame, GoAway, Ping, Priority, Reason, Reset, Settings, SettingsConfig,
    StreamId, WindowUpdate, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_SETTINGS_HEADER_TABLE_SIZE,
};
use crate::hpack::{Decoder, Encoder, HeaderField};

use super::error::Error;
use super::stream::{HttpStream, State};

/// Which end of the connection this engine is acting as; determines
/// outgoing stream id parity (RFC 7540 §5.1.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    fn first_stream_id(self) -> u32 {
        match self {
            Self::Client => 1,
            Self::Server => 2,
        }
    }
}

/// One inbound occurrence the connection engine surfaces to the
/// application layer after processing a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Headers {
        stream_id: StreamId,
        headers: Vec<HeaderField>,
        end_stream: bool,
    },
    Data {
        stream_id: StreamId,
        payload: Bytes,
        end_stream: bool,
    },
    StreamReset {
        stream_id: StreamId,
        reason: Reason,
    },
    SettingsAcked,
    GoAway {
        last_stream_id: StreamId,
        reason: Reason,
    },
    Ping {
        payload: [u8; 8],
    },
}

pub struct HttpConn {
    role: Role,
    streams: HashMap<StreamId, HttpStream>,
    next_outgoing_stream_id: u32,
    last_peer_stream_id: StreamId,
    hpack_encoder: Encoder,
    hpack_decoder: Decoder,
    local_settings: SettingsConfig,
    peer_settings: SettingsConfig,
    unacked_local_settings: u32,
    send_window: i64,
    recv_window: i64,
    goaway_sent: bool,
    goaway_received: bool,
    /// A `HEADERS`/`PUSH_PROMISE` whose `END_HEADERS` has not yet arrived;
    /// while set, any frame other than a `CONTINUATION` on the same stream
    /// is a connection error (RFC 7540 §6.10).
    header_block_in_progress: Option<StreamId>,
    max_unacked_settings: u32,
}

impl HttpConn {
    pub fn new(role: Role, config: crate::config::Http2Config) -> Self {
        let local_settings = config.local_settings;
        let header_table_size = local_settings.header_table_size();
        Self {
            role,
            streams: HashMap::new(),
            next_outgoing_stream_id: role.first_stream_id(),
            last_peer_stream_id: StreamId::zero(),
            hpack_encoder: Encoder::new(DEFAULT_SETTINGS_HEADER_TABLE_SIZE as usize),
            hpack_decoder: Decoder::new(header_table_size as usize),
            local_settings,
            peer_settings: SettingsConfig::default(),
            unacked_local_settings: 0,
            send_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            recv_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            goaway_sent: false,
            goaway_received: false,
            header_block_in_progress: None,
            max_unacked_settings: config.max_unacked_settings,
        }
    }

    /// The initial `SETTINGS` frame to send right after the connection
    /// preface, per RFC 7540 §3.5.
    pub fn initial_settings_frame(&mut self) -> Frame {
        self.unacked_local_settings += 1;
        Settings {
            config: self.local_settings.clone(),
            ..Settings::default()
        }
        .into()
    }

    fn allocate_stream_id(&mut self) -> StreamId {
        let id = StreamId::new(self.next_outgoing_stream_id);
        self.next_outgoing_stream_id += 2;
        id
    }

    /// Open a new locally-initiated stream and encode its request/response
    /// headers, returning the `HEADERS` frame to send.
    pub fn send_headers(
        &mut self,
        headers: &[HeaderField],
        end_stream: bool,
    ) -> Result<(StreamId, Frame), Error> {
        let stream_id = self.allocate_stream_id();
        let mut stream = HttpStream::new(
            stream_id,
            self.peer_settings.initial_window_size(),
            self.local_settings.initial_window_size(),
        );
        stream.set_state(if end_stream {
            State::HalfClosedLocal
        } else {
            State::Open
        });
        self.streams.insert(stream_id, stream);

        let mut block = BytesMut::new();
        self.hpack_encoder.encode(headers, &mut block);
        let mut frame = frame::Headers::new(stream_id, block.freeze());
        frame.set_end_stream(end_stream);
        Ok((stream_id, frame.into()))
    }

    /// Encode and send response headers on a stream the *peer* opened
    /// (spec §4.6 "Routing"): unlike [`Self::send_headers`], this attaches
    /// to the existing stream table entry rather than allocating a new
    /// stream id.
    pub fn send_response_headers(
        &mut self,
        stream_id: StreamId,
        headers: &[HeaderField],
        end_stream: bool,
    ) -> Result<Frame, Error> {
        let stream = self
            .streams
            .get_mut(&stream_id)
            .ok_or_else(|| Error::stream(stream_id, Reason::STREAM_CLOSED))?;
        if !stream.state().can_send_data() {
            return Err(Error::stream(stream_id, Reason::STREAM_CLOSED));
        }

        let mut block = BytesMut::new();
        self.hpack_encoder.encode(headers, &mut block);
        let mut frame = frame::Headers::new(stream_id, block.freeze());
        frame.set_end_stream(end_stream);
        if end_stream {
            let new_state = stream.state().send_end_stream();
            stream.set_state(new_state);
        }
        Ok(frame.into())
    }

    /// Queue `payload` for `stream_id`, emitting as many `DATA` frames as
    /// the connection and stream send windows currently allow and holding
    /// the remainder back on the stream (spec §4.6's flow-control stall):
    /// a `WINDOW_UPDATE` later drains it via [`Self::receive`].
    pub fn send_data(&mut self, stream_id: StreamId, payload: Bytes, end_stream: bool) -> Result<Vec<Frame>, Error> {
        let stream = self
            .streams
            .get_mut(&stream_id)
            .ok_or_else(|| Error::connection(Reason::PROTOCOL_ERROR, "data on unknown stream"))?;
        if !stream.state().can_send_data() {
            return Err(Error::stream(stream_id, Reason::STREAM_CLOSED));
        }
        stream.queue_unsent(payload, end_stream);
        Ok(self.drain_unsent(stream_id))
    }

    /// Emit as many queued `DATA` frames for `stream_id` as the current
    /// send windows allow, splitting the head of the queue if only part of
    /// it fits. Leaves anything still over-window on the stream.
    fn drain_unsent(&mut self, stream_id: StreamId) -> Vec<Frame> {
        let mut frames = Vec::new();
        loop {
            let Some(stream) = self.streams.get_mut(&stream_id) else {
                break;
            };
            let avail = self.send_window.min(stream.send_window());
            if avail <= 0 {
                break;
            }
            let Some(mut pending) = stream.pop_unsent() else {
                break;
            };
            let avail = avail as usize;
            if pending.payload.len() <= avail {
                let len = pending.payload.len() as i64;
                self.send_window -= len;
                stream.debit_send_window(pending.payload.len());
                let mut frame = Data::new(stream_id, pending.payload);
                frame.set_end_stream(pending.end_stream);
                if pending.end_stream {
                    let new_state = stream.state().send_end_stream();
                    stream.set_state(new_state);
                }
                frames.push(frame.into());
            } else {
                let send_now = pending.payload.split_to(avail);
                self.send_window -= avail as i64;
                stream.debit_send_window(avail);
                frames.push(Data::new(stream_id, send_now).into());
                stream.push_front_unsent(pending);
                break;
            }
        }
        frames
    }

    /// Process one inbound frame, returning application-visible events and
    /// any frames this engine wants sent in response (SETTINGS ACK, PING
    /// pong, window updates the caller chooses to honor immediately).
    pub fn receive(&mut self, frame: Frame) -> Result<(Vec<Event>, Vec<Frame>), Error> {
        if let Some(pending) = self.header_block_in_progress {
            if !matches!(frame, Frame::Continuation(_)) || frame.stream_id() != pending {
                return Err(Error::connection(
                    Reason::PROTOCOL_ERROR,
                    "expected CONTINUATION to finish header block",
                ));
            }
        }

        match frame {
            Frame::Settings(settings) => self.receive_settings(settings),
            Frame::Ping(ping) => Ok(self.receive_ping(ping)),
            Frame::WindowUpdate(update) => self.receive_window_update(update),
            Frame::GoAway(goaway) => Ok(self.receive_goaway(goaway)),
            Frame::Reset(reset) => Ok(self.receive_reset(reset)),
            Frame::Priority(priority) => Ok(self.receive_priority(priority)),
            Frame::Headers(headers) => self.receive_headers(headers),
            Frame::Continuation(cont) => self.receive_continuation(cont),
            Frame::PushPromise(_) => Err(self.push_promise_error()),
            Frame::Data(data) => self.receive_data(data),
        }
    }

    /// `PUSH_PROMISE` is not something this engine can act on regardless of
    /// negotiation (spec §1's Non-goal: "client-initiated HTTP/2 server
    /// push beyond the wire encoding"), but the error wording still reflects
    /// which RFC 7540 §6.6 condition actually applies: an endpoint that
    /// explicitly disabled push via `SETTINGS_ENABLE_PUSH=0` treats a
    /// `PUSH_PROMISE` as a protocol violation of its own negotiated
    /// settings, while one that left push enabled (the default) is
    /// rejecting it only because this implementation never processes it.
    fn push_promise_error(&self) -> Error {
        if self.local_settings.enable_push() {
            Error::connection(
                Reason::PROTOCOL_ERROR,
                "PUSH_PROMISE is not supported by this implementation",
            )
        } else {
            Error::connection(
                Reason::PROTOCOL_ERROR,
                "PUSH_PROMISE received after SETTINGS_ENABLE_PUSH=0",
            )
        }
    }

    fn receive_settings(&mut self, settings: Settings) -> Result<(Vec<Event>, Vec<Frame>), Error> {
        if settings.is_ack() {
            if self.unacked_local_settings == 0 {
                return Err(Error::connection(
                    Reason::PROTOCOL_ERROR,
                    "SETTINGS ACK with none outstanding",
                ));
            }
            self.unacked_local_settings -= 1;
            return Ok((vec![Event::SettingsAcked], Vec::new()));
        }

        if let Some(new_window) = settings.config.initial_window_size {
            let old_window = self.peer_settings.initial_window_size();
            let delta = new_window as i64 - old_window as i64;
            for stream in self.streams.values_mut() {
                stream.adjust_send_window(delta);
            }
            trace!(delta, "retroactively adjusted stream send windows");
        }
        if let Some(size) = settings.config.header_table_size {
            self.hpack_encoder.queue_resize(size as usize);
        }
        self.merge_peer_settings(settings.config);
        Ok((Vec::new(), vec![Settings::ack().into()]))
    }

    fn merge_peer_settings(&mut self, config: SettingsConfig) {
        macro_rules! merge {
            ($field:ident) => {
                if config.$field.is_some() {
                    self.peer_settings.$field = config.$field;
                }
            };
        }
        merge!(header_table_size);
        merge!(enable_push);
        merge!(max_concurrent_streams);
        merge!(initial_window_size);
        merge!(max_frame_size);
        merge!(max_header_list_size);
        merge!(enable_connect_protocol);
    }

    fn receive_ping(&mut self, ping: Ping) -> (Vec<Event>, Vec<Frame>) {
        if ping.is_ack() {
            return (vec![Event::Ping { payload: ping.payload() }], Vec::new());
        }
        (Vec::new(), vec![Ping::pong(ping.payload()).into()])
    }

    fn receive_window_update(&mut self, update: WindowUpdate) -> Result<(Vec<Event>, Vec<Frame>), Error> {
        let mut frames = Vec::new();
        if update.stream_id().is_zero() {
            self.send_window = self
                .send_window
                .checked_add(update.size_increment() as i64)
                .ok_or_else(|| Error::connection(Reason::FLOW_CONTROL_ERROR, "connection window overflow"))?;
            let stalled: Vec<StreamId> = self
                .streams
                .iter()
                .filter(|(_, s)| s.has_unsent())
                .map(|(id, _)| *id)
                .collect();
            for stream_id in stalled {
                if self.send_window <= 0 {
                    break;
                }
                frames.extend(self.drain_unsent(stream_id));
            }
        } else if let Some(stream) = self.streams.get_mut(&update.stream_id()) {
            stream.adjust_send_window(update.size_increment() as i64);
            frames.extend(self.drain_unsent(update.stream_id()));
        }
        Ok((Vec::new(), frames))
    }

    fn receive_goaway(&mut self, goaway: GoAway) -> (Vec<Event>, Vec<Frame>) {
        self.goaway_received = true;
        debug!(reason = ?goaway.reason(), "peer initiated GOAWAY");
        (
            vec![Event::GoAway {
                last_stream_id: goaway.last_stream_id(),
                reason: goaway.reason(),
            }],
            Vec::new(),
        )
    }

    fn receive_reset(&mut self, reset: Reset) -> (Vec<Event>, Vec<Frame>) {
        if let Some(stream) = self.streams.get_mut(&reset.stream_id()) {
            stream.set_state(State::Closed);
        }
        (
            vec![Event::StreamReset {
                stream_id: reset.stream_id(),
                reason: reset.reason(),
            }],
            Vec::new(),
        )
    }

    fn receive_priority(&mut self, priority: Priority) -> (Vec<Event>, Vec<Frame>) {
        // Advisory only: acknowledged and otherwise ignored (see
        // frame::Priority's doc comment).
        trace!(stream_id = ?priority.stream_id(), "ignoring advisory PRIORITY");
        (Vec::new(), Vec::new())
    }

    fn receive_headers(&mut self, headers: frame::Headers) -> Result<(Vec<Event>, Vec<Frame>), Error> {
        let stream_id = headers.stream_id();
        if self.role == Role::Server && !stream_id.client_initiated() {
            return Err(Error::connection(Reason::PROTOCOL_ERROR, "even-numbered client stream"));
        }
        self.last_peer_stream_id = stream_id;

        let stream = self.streams.entry(stream_id).or_insert_with(|| {
            HttpStream::new(
                stream_id,
                self.peer_settings.initial_window_size(),
                self.local_settings.initial_window_size(),
            )
        });
        stream.set_state(State::Open);
        stream.pending_headers_mut().push(headers.header_block_fragment());

        if !headers.is_end_headers() {
            self.header_block_in_progress = Some(stream_id);
            return Ok((Vec::new(), Vec::new()));
        }
        self.finish_header_block(stream_id, headers.is_end_stream())
    }

    fn receive_continuation(&mut self, cont: frame::Continuation) -> Result<(Vec<Event>, Vec<Frame>), Error> {
        let stream_id = cont.stream_id();
        let end_stream = {
            let stream = self
                .streams
                .get_mut(&stream_id)
                .ok_or_else(|| Error::connection(Reason::PROTOCOL_ERROR, "CONTINUATION for unknown stream"))?;
            stream.pending_headers_mut().push(cont.header_block_fragment());
            stream.state() == State::HalfClosedRemote
        };
        if !cont.is_end_headers() {
            return Ok((Vec::new(), Vec::new()));
        }
        self.header_block_in_progress = None;
        self.finish_header_block(stream_id, end_stream)
    }

    fn finish_header_block(&mut self, stream_id: StreamId, end_stream: bool) -> Result<(Vec<Event>, Vec<Frame>), Error> {
        let block = self
            .streams
            .get_mut(&stream_id)
            .expect("stream present while finishing its header block")
            .pending_headers_mut()
            .take();

        let mut fields = Vec::new();
        self.hpack_decoder
            .decode(&block, &mut fields)
            .map_err(|_| Error::connection(Reason::COMPRESSION_ERROR, "HPACK decode failure"))?;

        if let Some(stream) = self.streams.get_mut(&stream_id) {
            if end_stream {
                let new_state = stream.state().recv_end_stream();
                stream.set_state(new_state);
            }
            stream.set_headers(fields.clone());
        }

        Ok((
            vec![Event::Headers {
                stream_id,
                headers: fields,
                end_stream,
            }],
            Vec::new(),
        ))
    }

    fn receive_data(&mut self, data: Data) -> Result<(Vec<Event>, Vec<Frame>), Error> {
        let stream_id = data.stream_id();
        let debit = data.flow_control_len();
        self.recv_window -= debit as i64;
        if self.recv_window < 0 {
            return Err(Error::connection(Reason::FLOW_CONTROL_ERROR, "connection recv window exceeded"));
        }

        let stream = self
            .streams
            .get_mut(&stream_id)
            .ok_or_else(|| Error::stream(stream_id, Reason::STREAM_CLOSED))?;
        if !stream.state().can_recv_data() {
            return Err(Error::stream(stream_id, Reason::STREAM_CLOSED));
        }
        stream.debit_recv_window(debit);
        if stream.recv_window() < 0 {
            return Err(Error::stream(stream_id, Reason::FLOW_CONTROL_ERROR));
        }
        if data.is_end_stream() {
            let new_state = stream.state().recv_end_stream();
            stream.set_state(new_state);
        }

        Ok((
            vec![Event::Data {
                stream_id,
                payload: data.payload().clone(),
                end_stream: data.is_end_stream(),
            }],
            Vec::new(),
        ))
    }

    /// `WINDOW_UPDATE` a caller should send after the application consumes
    /// `consumed` bytes of DATA, replenishing both the connection and
    /// stream receive windows back toward their configured initial size.
    pub fn ack_consumed(&mut self, stream_id: StreamId, consumed: u32) -> Vec<Frame> {
        if consumed == 0 {
            return Vec::new();
        }
        self.recv_window += consumed as i64;
        let mut frames = vec![WindowUpdate::new(StreamId::zero(), consumed).into()];
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.credit_recv_window(consumed);
            frames.push(WindowUpdate::new(stream_id, consumed).into());
        }
        frames
    }

    pub fn go_away(&mut self, reason: Reason) -> Frame {
        self.goaway_sent = true;
        GoAway::new(self.last_peer_stream_id, reason).into()
    }

    /// Check the leading bytes of a freshly-accepted server connection
    /// against the RFC 7540 §3.5 client preface, before any of it is
    /// handed to the frame codec. A mismatch is a connection error; since
    /// it's caught before any stream exists, the `GOAWAY` `go_away`
    /// produces in response naturally carries `last_stream_id = 0`.
    pub fn validate_preface(&self, buf: &[u8]) -> Result<(), Error> {
        debug_assert_eq!(self.role, Role::Server, "only servers receive a preface to validate");
        if crate::preface::is_complete_preface(buf) {
            Ok(())
        } else {
            Err(Error::connection(Reason::PROTOCOL_ERROR, "invalid connection preface"))
        }
    }

    pub fn is_settings_unacked_limit_exceeded(&self) -> bool {
        self.unacked_local_settings > self.max_unacked_settings
    }

    pub fn stream(&self, stream_id: StreamId) -> Option<&HttpStream> {
        self.streams.get(&stream_id)
    }

    /// Reclaim stream-table memory across a long-lived connection. This
    /// engine has no wall clock of its own (see the crate's flow-control
    /// docs), so the grace period `State::Deleted` exists for is measured
    /// in calls to this method rather than elapsed time: a `Closed` stream
    /// is tombstoned as `Deleted` on one call and only actually dropped on
    /// the next, giving one full reap cycle for a frame the peer sent
    /// just before seeing our half of the close to arrive and be ignored
    /// as stale rather than bouncing off a missing stream-id lookup.
    /// Callers are expected to invoke this periodically (e.g. alongside
    /// the `corvus_net` socket's backlog-timeout poll).
    pub fn reap_closed_streams(&mut self) {
        self.streams.retain(|_, s| s.state() != State::Deleted);
        for stream in self.streams.values_mut() {
            if stream.state() == State::Closed {
                stream.set_state(State::Deleted);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_allocates_odd_stream_ids() {
        let mut conn = HttpConn::new(Role::Client, crate::config::Http2Config::default());
        let (first, _) = conn
            .send_headers(&[HeaderField::new(":method", "GET")], true)
            .unwrap_or_else(|_| panic!("send_headers failed"));
        let (second, _) = conn
            .send_headers(&[HeaderField::new(":method", "GET")], true)
            .unwrap_or_else(|_| panic!("send_headers failed"));
        assert!(first.client_initiated());
        assert_eq!(second.as_u32(), first.as_u32() + 2);
    }

    #[test]
    fn push_promise_is_rejected_as_unsupported_when_push_is_still_enabled() {
        let conn = HttpConn::new(Role::Client, crate::config::Http2Config::default());
        assert!(conn.local_settings.enable_push());
        let err = conn.push_promise_error();
        assert_eq!(err.reason(), Reason::PROTOCOL_ERROR);
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn push_promise_is_rejected_as_disabled_once_local_settings_say_so() {
        let mut conn = HttpConn::new(Role::Client, crate::config::Http2Config::default());
        conn.local_settings.enable_push = Some(false);
        let err = conn.push_promise_error();
        assert_eq!(err.reason(), Reason::PROTOCOL_ERROR);
        assert!(err.to_string().contains("SETTINGS_ENABLE_PUSH"));
    }

    #[test]
    fn settings_ack_without_outstanding_is_an_error() {
        let mut conn = HttpConn::new(Role::Server, crate::config::Http2Config::default());
        let err = conn.receive(Settings::ack().into()).unwrap_err();
        assert_eq!(err.reason(), Reason::PROTOCOL_ERROR);
    }

    #[test]
    fn settings_roundtrip_acks() {
        let mut conn = HttpConn::new(Role::Server, crate::config::Http2Config::default());
        let (events, frames) = conn
            .receive(Settings::default().into())
            .unwrap_or_else(|_| panic!("receive failed"));
        assert!(events.is_empty());
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Frame::Settings(ref s) if s.is_ack()));
    }

    #[test]
    fn header_block_split_across_continuation_decodes_once_complete() {
        let mut server = HttpConn::new(Role::Server, crate::config::Http2Config::default());
        let mut client_encoder = Encoder::new(4096);
        let headers = vec![HeaderField::new(":method", "GET"), HeaderField::new(":path", "/")];
        let mut block = BytesMut::new();
        client_encoder.encode(&headers, &mut block);
        let (first_half, second_half) = block.split_at(1);

        let mut h = frame::Headers::new(StreamId::new(1), Bytes::copy_from_slice(first_half));
        h.set_end_headers(false);
        let (events, _) = server.receive(h.into()).unwrap_or_else(|_| panic!("receive failed"));
        assert!(events.is_empty());

        let cont = frame::Continuation::new(StreamId::new(1), Bytes::copy_from_slice(second_half));
        let (events, _) = server.receive(cont.into()).unwrap_or_else(|_| panic!("receive failed"));
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Headers { headers, .. } => assert_eq!(headers.len(), 2),
            other => panic!("expected Headers event, got {other:?}"),
        }
    }

    #[test]
    fn send_data_over_window_holds_back_and_drains_on_window_update() {
        let mut client = HttpConn::new(Role::Client, crate::config::Http2Config::default());
        let (stream_id, _) = client
            .send_headers(&[HeaderField::new(":method", "POST")], false)
            .unwrap_or_else(|_| panic!("send_headers failed"));

        // Peer only grants a 1-byte window before we've seen its SETTINGS.
        client.streams.get_mut(&stream_id).unwrap().adjust_send_window(
            1 - DEFAULT_INITIAL_WINDOW_SIZE as i64,
        );

        let frames = client
            .send_data(stream_id, Bytes::from_static(b"hi"), true)
            .unwrap_or_else(|_| panic!("send_data failed"));
        assert_eq!(frames.len(), 1);
        match &frames[0] {
            Frame::Data(d) => {
                assert_eq!(d.payload().as_ref(), b"h");
                assert!(!d.is_end_stream());
            }
            other => panic!("expected Data frame, got {other:?}"),
        }
        assert!(client.streams.get(&stream_id).unwrap().has_unsent());

        let (_, drained) = client
            .receive(WindowUpdate::new(stream_id, 1).into())
            .unwrap_or_else(|_| panic!("receive failed"));
        assert_eq!(drained.len(), 1);
        match &drained[0] {
            Frame::Data(d) => {
                assert_eq!(d.payload().as_ref(), b"i");
                assert!(d.is_end_stream());
            }
            other => panic!("expected Data frame, got {other:?}"),
        }
        assert!(!client.streams.get(&stream_id).unwrap().has_unsent());
    }

    #[test]
    fn closed_streams_are_reaped_after_one_grace_cycle() {
        let mut server = HttpConn::new(Role::Server, crate::config::Http2Config::default());
        let mut h = frame::Headers::new(StreamId::new(1), Bytes::new());
        h.set_end_headers(true);
        h.set_end_stream(true);
        server.receive(h.into()).unwrap_or_else(|_| panic!("receive failed"));
        server.streams.get_mut(&StreamId::new(1)).unwrap().set_state(State::Closed);

        server.reap_closed_streams();
        assert_eq!(server.streams.get(&StreamId::new(1)).unwrap().state(), State::Deleted);

        server.reap_closed_streams();
        assert!(server.streams.get(&StreamId::new(1)).is_none());
    }

    #[test]
    fn data_exceeding_connection_window_is_rejected() {
        let mut server = HttpConn::new(Role::Server, crate::config::Http2Config::default());
        let mut h = frame::Headers::new(StreamId::new(1), Bytes::new());
        h.set_end_headers(true);
        server.receive(h.into()).unwrap_or_else(|_| panic!("receive failed"));

        let huge = vec![0u8; DEFAULT_INITIAL_WINDOW_SIZE as usize + 1];
        let data = Data::new(StreamId::new(1), Bytes::from(huge));
        let err = server.receive(data.into()).unwrap_err();
        assert_eq!(err.reason(), Reason::FLOW_CONTROL_ERROR);
    }
}

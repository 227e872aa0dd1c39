//! Glues [`Codec`], [`HttpConn`] and [`RouteTable`] onto a live
//! `corvus_net::Socket` — the notifier an `AppSocketDemux` installs once a
//! connection has matched the HTTP/2 family. Everything upstream of here
//! is pure protocol logic with no socket I/O; this is the one place that
//! crosses back over into the byte-socket layer.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};

use corvus_net::notify::SocketNotify;
use corvus_net::socket::Socket;

use crate::codec::Codec;
use crate::config::Http2Config;
use crate::frame::{Frame, Reason, Reset, StreamId};
use crate::hpack::HeaderField;
use crate::proto::{Event, HttpConn, Role};
use crate::proto::Error as ProtoError;
use crate::route::{MethodMask, Request, Responder, RouteTable};

struct Assembling {
    headers: Vec<HeaderField>,
    body: BytesMut,
}

struct Inner {
    conn: HttpConn,
    codec: Codec,
    incoming: BytesMut,
    preface_checked: bool,
    assembling: HashMap<StreamId, Assembling>,
}

/// The HTTP/2 connection engine wired onto a socket, implementing
/// [`SocketNotify`] directly: every byte the transport delivers is fed
/// through the frame codec and the protocol state machine in one place.
pub struct Connection {
    role: Role,
    inner: Mutex<Inner>,
    socket: Mutex<Option<Weak<Socket>>>,
    routes: Arc<RouteTable>,
    /// A weak handle to this same `Connection`, handed out to dispatched
    /// [`Request`]s as their [`Responder`] so a handler can reply on the
    /// stream it arrived on without the connection having to be `Arc`-held
    /// by anything other than its own socket.
    self_weak: Weak<Connection>,
}

impl Connection {
    pub fn new(role: Role, config: Http2Config, routes: Arc<RouteTable>) -> Arc<Self> {
        let max_frame_len = config.local_settings.max_frame_size();
        Arc::new_cyclic(|self_weak| Self {
            role,
            inner: Mutex::new(Inner {
                conn: HttpConn::new(role, config),
                codec: Codec::new(max_frame_len),
                incoming: BytesMut::new(),
                preface_checked: role == Role::Client,
                assembling: HashMap::new(),
            }),
            socket: Mutex::new(None),
            routes,
            self_weak: self_weak.clone(),
        })
    }

    /// Send the connection preface and initial `SETTINGS`. Callers send
    /// this once the underlying socket is confirmed connected (a client
    /// dials out and immediately says hello; a server instead waits to
    /// see the client's preface arrive through [`Self::on_read`]).
    pub fn start(&self) {
        if self.role != Role::Client {
            return;
        }
        let Some(socket) = self.upgrade_socket() else {
            return;
        };
        socket.write(Bytes::from_static(crate::preface::PREFACE));
        let settings = {
            let mut inner = self.inner.lock();
            inner.conn.initial_settings_frame()
        };
        self.send_frames(&socket, vec![settings]);
    }

    fn upgrade_socket(&self) -> Option<Arc<Socket>> {
        self.socket.lock().as_ref().and_then(Weak::upgrade)
    }

    fn send_frames(&self, socket: &Arc<Socket>, frames: Vec<Frame>) {
        if frames.is_empty() {
            return;
        }
        let mut buf = BytesMut::new();
        let mut inner = self.inner.lock();
        for frame in frames {
            let _ = inner.codec.encode(frame, &mut buf);
        }
        drop(inner);
        socket.write(buf.freeze());
    }

    fn fail_connection(&self, socket: &Arc<Socket>, reason: Reason, debug_msg: &str) {
        warn!(?reason, debug_msg, "tearing down HTTP/2 connection");
        let goaway = self.inner.lock().conn.go_away(reason);
        self.send_frames(socket, vec![goaway]);
        socket.disconnect();
    }

    /// Called once a stream's `HEADERS` + `DATA` are fully assembled;
    /// builds the [`Request`] and hands it to the route table (spec §4.6
    /// "Routing").
    fn dispatch(&self, stream_id: StreamId, assembled: Assembling) {
        let path = assembled
            .headers
            .iter()
            .find(|h| &*h.name == ":path")
            .map(|h| h.value.to_string())
            .unwrap_or_default();
        let method = assembled
            .headers
            .iter()
            .find(|h| &*h.name == ":method")
            .and_then(|h| MethodMask::from_method_name(&h.value));

        let Some(method) = method else {
            debug!(?stream_id, "request with no usable :method, dropping");
            return;
        };

        let request = Request {
            request_id: stream_id,
            stream_id,
            path,
            method,
            headers: assembled.headers,
            body: assembled.body.freeze(),
            responder: Responder::new(self.self_weak.clone(), stream_id),
        };
        if self.routes.dispatch(request).is_err() {
            trace!(?stream_id, "no route matched");
        }
    }

    /// Encode and send `headers` (and `body`, if non-empty) as the response
    /// on `stream_id`, called back into from a dispatched request's
    /// [`Responder`] (spec §4.6 "Routing"). A silent no-op once the
    /// connection's socket has already gone away.
    pub(crate) fn send_response(&self, stream_id: StreamId, headers: &[HeaderField], body: Bytes, end_stream: bool) {
        let Some(socket) = self.upgrade_socket() else {
            return;
        };

        let mut inner = self.inner.lock();
        let header_frame = match inner.conn.send_response_headers(stream_id, headers, body.is_empty() && end_stream) {
            Ok(frame) => frame,
            Err(err) => {
                let reason = err.reason();
                drop(inner);
                self.fail_connection(&socket, reason, "failed to send response headers");
                return;
            }
        };

        let mut frames = vec![header_frame];
        if !body.is_empty() {
            match inner.conn.send_data(stream_id, body, end_stream) {
                Ok(data_frames) => frames.extend(data_frames),
                Err(err) => {
                    let reason = err.reason();
                    drop(inner);
                    self.fail_connection(&socket, reason, "failed to send response body");
                    return;
                }
            }
        }
        drop(inner);
        self.send_frames(&socket, frames);
    }
}

impl SocketNotify for Connection {
    fn on_read(&self, data: Bytes) -> bool {
        let Some(socket) = self.upgrade_socket() else {
            return true;
        };

        let mut inner = self.inner.lock();
        inner.incoming.extend_from_slice(&data);

        if !inner.preface_checked {
            const PREFACE_LEN: usize = 24;
            if inner.incoming.len() < PREFACE_LEN {
                return true;
            }
            let head = inner.incoming.split_to(PREFACE_LEN);
            if let Err(err) = inner.conn.validate_preface(&head) {
                drop(inner);
                self.fail_connection(&socket, err.reason(), "invalid connection preface");
                return true;
            }
            inner.preface_checked = true;
            let settings = inner.conn.initial_settings_frame();
            drop(inner);
            self.send_frames(&socket, vec![settings]);
            inner = self.inner.lock();
        }

        let mut outgoing = Vec::new();
        let mut to_dispatch = Vec::new();
        loop {
            let frame = match inner.codec.decode(&mut inner.incoming) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    let reason = err.reason();
                    drop(inner);
                    self.fail_connection(&socket, reason, "frame codec error");
                    return true;
                }
            };
            match inner.conn.receive(frame) {
                Ok((events, frames)) => {
                    outgoing.extend(frames);
                    for event in events {
                        match event {
                            Event::Headers { stream_id, headers, end_stream } => {
                                let entry = inner.assembling.entry(stream_id).or_insert_with(|| Assembling {
                                    headers: Vec::new(),
                                    body: BytesMut::new(),
                                });
                                entry.headers = headers;
                                if end_stream {
                                    if let Some(assembled) = inner.assembling.remove(&stream_id) {
                                        to_dispatch.push((stream_id, assembled));
                                    }
                                }
                            }
                            Event::Data { stream_id, payload, end_stream } => {
                                let consumed = payload.len() as u32;
                                if let Some(entry) = inner.assembling.get_mut(&stream_id) {
                                    entry.body.extend_from_slice(&payload);
                                }
                                // The body is fully buffered here rather than
                                // streamed to the handler, so it's safe to
                                // immediately credit back the window it
                                // occupied (spec §4.6's flow control).
                                outgoing.extend(inner.conn.ack_consumed(stream_id, consumed));
                                if end_stream {
                                    if let Some(assembled) = inner.assembling.remove(&stream_id) {
                                        to_dispatch.push((stream_id, assembled));
                                    }
                                }
                            }
                            Event::GoAway { .. } => {
                                drop(inner);
                                socket.disconnect();
                                return true;
                            }
                            Event::StreamReset { .. } | Event::SettingsAcked | Event::Ping { .. } => {}
                        }
                    }
                }
                Err(ProtoError::Stream { stream_id, reason }) => {
                    outgoing.push(Reset::new(stream_id, reason).into());
                }
                Err(err @ ProtoError::Connection { .. }) => {
                    let reason = err.reason();
                    drop(inner);
                    self.fail_connection(&socket, reason, "protocol error");
                    return true;
                }
            }
        }
        drop(inner);

        self.send_frames(&socket, outgoing);
        for (stream_id, assembled) in to_dispatch {
            self.dispatch(stream_id, assembled);
        }
        true
    }

    fn on_disconnect(&self) {
        debug!("HTTP/2 connection's socket disconnected");
    }

    fn attach_socket(&self, socket: Weak<Socket>) {
        *self.socket.lock() = Some(socket);
    }

    /// Driven by the socket's periodic driver task alongside its
    /// backlog-timeout check; reclaims this connection's closed-stream
    /// table entries (see [`HttpConn::reap_closed_streams`]).
    fn housekeeping(&self) {
        self.inner.lock().conn.reap_closed_streams();
    }
}

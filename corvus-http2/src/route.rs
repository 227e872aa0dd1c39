//! The route table a completed request is handed to once its `HEADERS`
//! (and any `DATA`) have been fully received (spec §4.6, §6): `(path
//! prefix, method mask) → handler`, looked up by longest matching prefix.
//! Registration is rare (configuration time); lookup happens on every
//! request, so the table is a `parking_lot::RwLock` rather than a mutex.

use std::sync::{Arc, Weak};

use bitflags::bitflags;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::connection::Connection;
use crate::frame::StreamId;
use crate::hpack::HeaderField;

bitflags! {
    /// A bitfield over the eight methods the spec calls out explicitly.
    /// Anything outside that set (a custom method, a typo) simply never
    /// matches any registered route.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodMask: u8 {
        const CONNECT = 0b0000_0001;
        const DELETE  = 0b0000_0010;
        const GET     = 0b0000_0100;
        const HEAD    = 0b0000_1000;
        const OPTIONS = 0b0001_0000;
        const POST    = 0b0010_0000;
        const PUT     = 0b0100_0000;
        const TRACE   = 0b1000_0000;
    }
}

impl MethodMask {
    /// Map a `:method` pseudo-header value to its bit, if it's one of the
    /// eight the mask covers.
    pub fn from_method_name(method: &str) -> Option<Self> {
        Some(match method {
            "CONNECT" => Self::CONNECT,
            "DELETE" => Self::DELETE,
            "GET" => Self::GET,
            "HEAD" => Self::HEAD,
            "OPTIONS" => Self::OPTIONS,
            "POST" => Self::POST,
            "PUT" => Self::PUT,
            "TRACE" => Self::TRACE,
            _ => return None,
        })
    }
}

/// A fully-assembled request, correlated back to its HTTP/2 stream by
/// `request_id` (spec §4.6's "responses are correlated back to the
/// HTTP/2 stream by that id" — here `request_id` and `stream_id` are the
/// same value since one connection's route table only ever sees its own
/// streams, but the field is kept distinct to match the spec's language).
/// `responder` is that correlation made actionable: a handler calls
/// `request.responder.respond(..)` to send the reply on this same stream.
#[derive(Debug, Clone)]
pub struct Request {
    pub request_id: StreamId,
    pub stream_id: StreamId,
    pub path: String,
    pub method: MethodMask,
    pub headers: Vec<HeaderField>,
    pub body: bytes::Bytes,
    pub responder: Responder,
}

/// A handler's one-shot handle back to the connection its request arrived
/// on, for sending the response on the same stream (spec §4.6). Holds only
/// a weak reference: if the connection's socket has already gone away by
/// the time a handler gets around to replying, `respond` is a silent no-op
/// rather than a panic or a dangling write.
#[derive(Debug, Clone)]
pub struct Responder {
    connection: Weak<Connection>,
    stream_id: StreamId,
}

impl Responder {
    pub(crate) fn new(connection: Weak<Connection>, stream_id: StreamId) -> Self {
        Self { connection, stream_id }
    }

    /// A responder with no live connection behind it; `respond` is then
    /// always a no-op. For constructing a [`Request`] outside a real
    /// connection (tests, synthetic requests).
    pub fn detached(stream_id: StreamId) -> Self {
        Self {
            connection: Weak::new(),
            stream_id,
        }
    }

    /// Encode `headers` (and `body`, if non-empty) and send them back as
    /// the response on the stream this request arrived on.
    pub fn respond(&self, headers: &[HeaderField], body: Bytes, end_stream: bool) {
        if let Some(connection) = self.connection.upgrade() {
            connection.send_response(self.stream_id, headers, body, end_stream);
        }
    }
}

pub trait Handler: Send + Sync {
    fn handle(&self, request: Request);
}

struct Route {
    path_prefix: String,
    methods: MethodMask,
    handler: Arc<dyn Handler>,
}

/// `(path-prefix, method-mask) -> handler`, matched by longest prefix
/// among the routes whose mask includes the request's method.
#[derive(Default)]
pub struct RouteTable {
    routes: RwLock<Vec<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path_prefix: impl Into<String>, methods: MethodMask, handler: Arc<dyn Handler>) {
        let mut routes = self.routes.write();
        routes.push(Route {
            path_prefix: path_prefix.into(),
            methods,
            handler,
        });
        routes.sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));
    }

    /// Find the longest-prefix route whose mask includes `method`, if any.
    pub fn dispatch(&self, request: Request) -> Result<(), Request> {
        let routes = self.routes.read();
        let found = routes
            .iter()
            .find(|r| request.path.starts_with(&r.path_prefix) && r.methods.contains(request.method));
        match found {
            Some(route) => {
                let handler = Arc::clone(&route.handler);
                drop(routes);
                handler.handle(request);
                Ok(())
            }
            None => Err(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(AtomicUsize);

    impl Handler for Counting {
        fn handle(&self, _request: Request) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn req(path: &str, method: MethodMask) -> Request {
        Request {
            request_id: StreamId::new(1),
            stream_id: StreamId::new(1),
            path: path.to_string(),
            method,
            headers: Vec::new(),
            body: bytes::Bytes::new(),
            responder: Responder::detached(StreamId::new(1)),
        }
    }

    #[test]
    fn longest_prefix_wins_over_a_shorter_registered_match() {
        let table = RouteTable::new();
        let root = Arc::new(Counting(AtomicUsize::new(0)));
        let api = Arc::new(Counting(AtomicUsize::new(0)));
        table.register("/", MethodMask::GET, root.clone());
        table.register("/api/", MethodMask::GET, api.clone());

        table.dispatch(req("/api/widgets", MethodMask::GET)).unwrap_or_else(|_| panic!("no route matched"));
        assert_eq!(api.0.load(Ordering::SeqCst), 1);
        assert_eq!(root.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn method_outside_mask_is_unrouted() {
        let table = RouteTable::new();
        table.register("/", MethodMask::GET, Arc::new(Counting(AtomicUsize::new(0))));
        let rejected = table.dispatch(req("/", MethodMask::POST));
        assert!(rejected.is_err());
    }

    #[test]
    fn unrecognized_method_name_maps_to_none() {
        assert_eq!(MethodMask::from_method_name("PATCH"), None);
        assert_eq!(MethodMask::from_method_name("GET"), Some(MethodMask::GET));
    }
}

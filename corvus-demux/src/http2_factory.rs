//! The concrete [`Factory`](crate::demux::Factory) an embedder registers
//! for [`Family::Http2`]: every matched connection gets a fresh
//! `corvus_http2::Connection` in the server role, sharing one
//! [`RouteTable`] across the listener.

use std::net::SocketAddr;
use std::sync::Arc;

use corvus_http2::{Connection, Http2Config, Role, RouteTable};
use corvus_net::notify::SocketNotify;

use crate::demux::Factory;
use crate::family::Family;

/// Hands a matched HTTP/2 connection off to a fresh
/// `corvus_http2::Connection`, all sharing one route table.
pub struct Http2Factory {
    config: Http2Config,
    routes: Arc<RouteTable>,
}

impl Http2Factory {
    pub fn new(routes: Arc<RouteTable>) -> Self {
        Self {
            config: Http2Config::default(),
            routes,
        }
    }

    pub fn with_config(config: Http2Config, routes: Arc<RouteTable>) -> Self {
        Self { config, routes }
    }
}

impl Factory for Http2Factory {
    fn create(&self, family: Family, _peer: SocketAddr) -> Arc<dyn SocketNotify> {
        debug_assert_eq!(family, Family::Http2, "Http2Factory registered for the wrong family");
        Connection::new(Role::Server, self.config.clone(), self.routes.clone())
    }
}

//! `AppSocketDemux` (spec §4.5): the listener-side protocol sniffer. Every
//! accepted connection gets a hidden byte-buffering notifier first; once a
//! registered [`Matcher`](crate::family::Matcher) (or the hard-coded
//! fallback in [`crate::byte_matcher`]) settles on a [`Family`], the demux
//! hands the connection to that family's [`Factory`] and steps out of the
//! way for good.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use corvus_core::timer::{Timer, TimerNotify, TimerWheel};
use corvus_net::listener::SocketFactory;
use corvus_net::notify::SocketNotify;
use corvus_net::socket::Socket;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};

use crate::byte_matcher;
use crate::family::{Family, MatchResult, Matcher};

/// Tunables for the match phase (spec §4.5). Nothing here comes from a CLI
/// or config file (out of scope); the embedding application builds one of
/// these and passes it to [`AppSocketDemux::new`].
#[derive(Debug, Clone)]
pub struct DemuxConfig {
    /// How long a connection may sit unmatched before being disconnected.
    pub match_timeout: Duration,
    /// How often the match-timeout is checked (spec: "on a 2-second timer").
    pub poll_interval: Duration,
    /// Buffered-byte threshold at which a `Supported`-only verdict (no
    /// family has said `Preferred`) is accepted rather than waiting for
    /// more bytes.
    pub supported_cap: usize,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            match_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(2),
            supported_cap: 16 * 1024,
        }
    }
}

/// Given a matched family, produce the notifier that will own the
/// connection from here on — the demux's analogue of
/// [`corvus_net::listener::SocketFactory`], keyed additionally by family.
pub trait Factory: Send + Sync {
    fn create(&self, family: Family, peer: SocketAddr) -> Arc<dyn SocketNotify>;
}

#[derive(Default)]
struct FamilyRegistration {
    matcher: Option<Arc<dyn Matcher>>,
    factory: Option<Arc<dyn Factory>>,
}

/// Registered protocol families plus the match-phase tunables. Shared by
/// every connection the demux accepts; wrapped in a single `RwLock` per
/// family table since registration (configuration) is rare and dispatch
/// (every accepted connection reads it) is frequent — the shared/exclusive
/// split spec §5 calls for.
pub struct AppSocketDemux {
    config: DemuxConfig,
    registrations: RwLock<IndexMap<Family, FamilyRegistration>>,
    timers: Arc<TimerWheel>,
    driver_started: AtomicBool,
}

impl AppSocketDemux {
    pub fn new(config: DemuxConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            registrations: RwLock::new(IndexMap::new()),
            timers: Arc::new(TimerWheel::new()),
            driver_started: AtomicBool::new(false),
        })
    }

    /// Spawn the task that periodically drains the match-timeout
    /// [`TimerWheel`], started lazily on the first accepted connection so
    /// that building an `AppSocketDemux` outside a tokio runtime (as the
    /// unit tests below do) never touches `tokio::spawn`.
    fn ensure_timeout_driver(self: &Arc<Self>) {
        if self.driver_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let timers = Arc::clone(&self.timers);
        let poll_interval = self.config.poll_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                timers.dispatch_due();
            }
        });
    }

    /// Override the hard-coded byte matcher for `family`. Families with no
    /// registered matcher still participate in matching via
    /// [`crate::byte_matcher::matches`].
    pub fn register_matcher(&self, family: Family, matcher: Arc<dyn Matcher>) {
        self.registrations.write().entry(family).or_default().matcher = Some(matcher);
    }

    /// Register the factory that builds the protocol notifier once
    /// `family` wins the match. A family with no factory can still be
    /// matched but the connection is dropped, since there is nowhere to
    /// hand it.
    pub fn register_factory(&self, family: Family, factory: Arc<dyn Factory>) {
        self.registrations.write().entry(family).or_default().factory = Some(factory);
    }

    /// Rank every registered family's verdict via [`MatchResult::is_better_than`]
    /// (spec §4.5): the first `Preferred` wins outright; otherwise the
    /// best-ranked verdict seen so far is kept, ties going to whichever
    /// family registered first since a later equal-rank result never beats
    /// (only ever *ties*) the one already held.
    fn evaluate(&self, buf: &[u8]) -> Verdict {
        let regs = self.registrations.read();
        let mut best: Option<(Family, MatchResult)> = None;
        for (family, reg) in regs.iter() {
            let result = match &reg.matcher {
                Some(matcher) => matcher.matches(buf),
                None => byte_matcher::matches(*family, buf),
            };
            if result == MatchResult::Preferred {
                return Verdict::Matched(*family);
            }
            if best.map_or(true, |(_, current)| result.is_better_than(current)) {
                best = Some((*family, result));
            }
        }
        match best {
            Some((family, MatchResult::Supported)) if buf.len() >= self.config.supported_cap => {
                Verdict::Matched(family)
            }
            _ => Verdict::Undecided,
        }
    }

    fn factory_for(&self, family: Family) -> Option<Arc<dyn Factory>> {
        self.registrations.read().get(&family).and_then(|r| r.factory.clone())
    }
}

enum Verdict {
    Matched(Family),
    Undecided,
}

/// Wraps an [`AppSocketDemux`] so it can implement the foreign
/// [`SocketFactory`] trait (the orphan rule won't let us impl a foreign
/// trait directly on `Arc<AppSocketDemux>`).
pub struct DemuxListener(pub Arc<AppSocketDemux>);

impl SocketFactory for DemuxListener {
    fn create(&self, peer: SocketAddr) -> Arc<dyn SocketNotify> {
        self.0.ensure_timeout_driver();
        let state = Arc::new(MatchState::new(Arc::clone(&self.0), peer));
        state.arm_timeout();
        state
    }
}

/// The hidden per-connection byte-buffering notifier a demux installs on
/// every accepted socket until a family wins (or the match times out).
struct MatchState {
    demux: Arc<AppSocketDemux>,
    peer: SocketAddr,
    buf: Mutex<BytesMut>,
    socket: Mutex<Option<Weak<Socket>>>,
    timer: Mutex<Option<Timer>>,
    decided: AtomicBool,
}

impl MatchState {
    fn new(demux: Arc<AppSocketDemux>, peer: SocketAddr) -> Self {
        Self {
            demux,
            peer,
            buf: Mutex::new(BytesMut::new()),
            socket: Mutex::new(None),
            timer: Mutex::new(None),
            decided: AtomicBool::new(false),
        }
    }

    /// Register this state's match-timeout with the demux's shared
    /// [`TimerWheel`]. Only called from [`DemuxListener::create`], so it
    /// never runs outside a tokio context.
    fn arm_timeout(self: &Arc<Self>) {
        let notifier: Arc<dyn TimerNotify> = Arc::clone(self) as Arc<dyn TimerNotify>;
        let (timer, _) = self
            .demux
            .timers
            .update(notifier, self.demux.config.match_timeout, false);
        *self.timer.lock() = Some(timer);
    }

    /// Hand the connection to `family`'s factory: construct its notifier,
    /// replay whatever we've buffered so far into it, then swap the socket
    /// over to it for good.
    fn hand_off(&self, family: Family) {
        self.decided.store(true, Ordering::SeqCst);
        if let Some(timer) = self.timer.lock().take() {
            self.demux.timers.close_wait(&timer);
        }
        let Some(factory) = self.demux.factory_for(family) else {
            warn!(?family, peer = %self.peer, "matched family has no registered factory, disconnecting");
            if let Some(socket) = self.socket.lock().as_ref().and_then(Weak::upgrade) {
                socket.disconnect();
            }
            return;
        };

        let notifier = factory.create(family, self.peer);
        let socket = self.socket.lock().as_ref().and_then(Weak::upgrade);
        if let Some(socket) = &socket {
            notifier.attach_socket(Arc::downgrade(socket));
        }
        let buffered = std::mem::take(&mut *self.buf.lock()).freeze();
        debug!(?family, peer = %self.peer, buffered = buffered.len(), "appsocket matched, handing off");
        if !buffered.is_empty() {
            notifier.on_read(buffered);
        }
        if let Some(socket) = socket {
            socket.rebind_notifier(notifier);
        }
    }
}

impl SocketNotify for MatchState {
    fn on_read(&self, data: Bytes) -> bool {
        if self.decided.load(Ordering::SeqCst) {
            return true;
        }
        self.buf.lock().extend_from_slice(&data);
        let snapshot = self.buf.lock().clone().freeze();
        match self.demux.evaluate(&snapshot) {
            Verdict::Matched(family) => {
                trace!(?family, peer = %self.peer, "appsocket family matched");
                self.hand_off(family);
            }
            Verdict::Undecided => {}
        }
        true
    }

    fn on_disconnect(&self) {
        trace!(peer = %self.peer, "appsocket connection disconnected before a family matched");
        self.decided.store(true, Ordering::SeqCst);
        if let Some(timer) = self.timer.lock().take() {
            self.demux.timers.close_wait(&timer);
        }
    }

    fn attach_socket(&self, socket: Weak<Socket>) {
        *self.socket.lock() = Some(socket);
    }
}

impl TimerNotify for MatchState {
    fn on_timer(&self, _now: Instant) -> Option<Duration> {
        if self.decided.swap(true, Ordering::SeqCst) {
            return None;
        }
        warn!(peer = %self.peer, "appsocket match timed out, disconnecting");
        if let Some(socket) = self.socket.lock().as_ref().and_then(Weak::upgrade) {
            socket.disconnect();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct RecordingFactory {
        created: AtomicUsize,
    }

    impl Factory for RecordingFactory {
        fn create(&self, _family: Family, _peer: SocketAddr) -> Arc<dyn SocketNotify> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Arc::new(Sink::default())
        }
    }

    #[derive(Default)]
    struct Sink {
        reads: Mutex<Vec<Bytes>>,
    }

    impl SocketNotify for Sink {
        fn on_read(&self, data: Bytes) -> bool {
            self.reads.lock().push(data);
            true
        }
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn full_preface_matches_http2_and_hands_off_buffered_bytes() {
        let demux = AppSocketDemux::new(DemuxConfig::default());
        let factory = Arc::new(RecordingFactory {
            created: AtomicUsize::new(0),
        });
        demux.register_factory(Family::Http2, factory.clone());
        demux.register_factory(Family::Byte, factory.clone());

        let state = MatchState::new(Arc::clone(&demux), peer());
        state.on_read(Bytes::from_static(corvus_http2::PREFACE));

        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert!(state.decided.load(Ordering::SeqCst));
    }

    #[test]
    fn byte_family_wins_once_cap_is_reached_with_no_preference() {
        let mut config = DemuxConfig::default();
        config.supported_cap = 4;
        let demux = AppSocketDemux::new(config);
        let factory = Arc::new(RecordingFactory {
            created: AtomicUsize::new(0),
        });
        demux.register_factory(Family::Byte, factory.clone());

        let state = MatchState::new(Arc::clone(&demux), peer());
        state.on_read(Bytes::from_static(b"ab"));
        assert_eq!(factory.created.load(Ordering::SeqCst), 0, "not enough bytes yet");
        state.on_read(Bytes::from_static(b"cd"));
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn no_factory_for_matched_family_is_a_noop_disconnect() {
        let demux = AppSocketDemux::new(DemuxConfig::default());
        // HTTP/2 has no factory registered at all.
        let state = MatchState::new(Arc::clone(&demux), peer());
        state.on_read(Bytes::from_static(corvus_http2::PREFACE));
        assert!(state.decided.load(Ordering::SeqCst));
    }

    #[test]
    fn registration_order_breaks_preferred_ties() {
        // Two matchers both answering `Preferred` for the same bytes; the
        // first-registered family should win.
        struct AlwaysPreferred;
        impl Matcher for AlwaysPreferred {
            fn matches(&self, _bytes_so_far: &[u8]) -> MatchResult {
                MatchResult::Preferred
            }
        }

        let demux = AppSocketDemux::new(DemuxConfig::default());
        demux.register_matcher(Family::Tls, Arc::new(AlwaysPreferred));
        demux.register_matcher(Family::Http2, Arc::new(AlwaysPreferred));
        let tls_factory = Arc::new(RecordingFactory {
            created: AtomicUsize::new(0),
        });
        let http2_factory = Arc::new(RecordingFactory {
            created: AtomicUsize::new(0),
        });
        demux.register_factory(Family::Tls, tls_factory.clone());
        demux.register_factory(Family::Http2, http2_factory.clone());

        let state = MatchState::new(Arc::clone(&demux), peer());
        state.on_read(Bytes::from_static(b"x"));

        assert_eq!(tls_factory.created.load(Ordering::SeqCst), 1);
        assert_eq!(http2_factory.created.load(Ordering::SeqCst), 0);
    }
}

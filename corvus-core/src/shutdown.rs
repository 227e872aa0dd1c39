//! Three-phase shutdown coordinator: client connections are torn down
//! first, then connections to upstream servers, finally consoles used to
//! monitor the process. Each phase calls every registered handler once
//! with `first_try = true`; handlers that call [`shutdown_incomplete`]
//! during that call are revisited, one at a time in reverse registration
//! order, with `first_try = false`, until each returns without flagging
//! incomplete.
//!
//! A watchdog bounds the whole shutdown to two minutes by default, reset
//! by [`ShutdownCoordinator::delay`] and disabled by
//! [`ShutdownCoordinator::disable_timeout`]. Unlike the C++ original, which
//! kills the process outright on expiry, [`ShutdownCoordinator::shutdown`]
//! returns [`ShutdownOutcome::TimedOut`] and leaves the fatal decision to
//! the caller (typically `std::process::exit` from `main`), since a
//! library has no business calling that on its own.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::timer::{Timer, TimerNotify, TimerWheel};

/// Implemented by components that need to release resources during
/// process shutdown. All three methods default to doing nothing, so
/// implementors only override the phases that matter to them.
pub trait ShutdownNotify: Send + Sync {
    fn on_shutdown_client(&self, first_try: bool) {
        let _ = first_try;
    }
    fn on_shutdown_server(&self, first_try: bool) {
        let _ = first_try;
    }
    fn on_shutdown_console(&self, first_try: bool) {
        let _ = first_try;
    }
}

thread_local! {
    static INCOMPLETE: Cell<bool> = const { Cell::new(false) };
}

/// Call from inside a `ShutdownNotify` handler to signal it needs to be
/// revisited before this phase can end.
pub fn shutdown_incomplete() {
    INCOMPLETE.with(|c| c.set(true));
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Client,
    Server,
    Console,
}

/// Result of running [`ShutdownCoordinator::shutdown`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Completed,
    TimedOut,
}

/// The [`TimerNotify`] the coordinator registers with its [`TimerWheel`] to
/// back the watchdog: firing just flips a shared flag, since the thing that
/// needs to observe expiry is [`ShutdownCoordinator::timed_out`], not a
/// callback-driven action.
struct Watchdog {
    expired: Arc<AtomicBool>,
}

impl TimerNotify for Watchdog {
    fn on_timer(&self, _now: std::time::Instant) -> Option<Duration> {
        self.expired.store(true, Ordering::SeqCst);
        None
    }
}

pub struct ShutdownCoordinator {
    handlers: Mutex<Vec<Arc<dyn ShutdownNotify>>>,
    timers: TimerWheel,
    watchdog: Mutex<Option<Timer>>,
    timed_out: Arc<AtomicBool>,
    disable_timeout: AtomicBool,
    poll_interval: Duration,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            timers: TimerWheel::new(),
            watchdog: Mutex::new(None),
            timed_out: Arc::new(AtomicBool::new(false)),
            disable_timeout: AtomicBool::new(false),
            poll_interval: Duration::from_millis(50),
        }
    }

    #[cfg(test)]
    fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Self::new()
        }
    }

    /// Register a handler to be notified on each shutdown phase, in the
    /// order registration happened; retries on incomplete handlers walk
    /// this list in reverse, and the first (`first_try = true`) pass over
    /// each phase visits the most recently registered handler first.
    pub fn monitor(&self, handler: Arc<dyn ShutdownNotify>) {
        self.handlers.lock().push(handler);
    }

    /// Reset the watchdog deadline to two minutes from now. Calling this
    /// repeatedly from inside a handler can delay shutdown indefinitely;
    /// use with caution.
    pub fn delay(&self) {
        self.arm_watchdog(Self::DEFAULT_TIMEOUT);
    }

    fn arm_watchdog(&self, timeout: Duration) {
        if self.disable_timeout.load(Ordering::SeqCst) {
            return;
        }
        self.timed_out.store(false, Ordering::SeqCst);
        let mut watchdog = self.watchdog.lock();
        match watchdog.as_ref() {
            Some(timer) => {
                self.timers.rearm(timer, timeout, false);
            }
            None => {
                let notifier: Arc<dyn TimerNotify> = Arc::new(Watchdog {
                    expired: self.timed_out.clone(),
                });
                let (timer, _) = self.timers.update(notifier, timeout, false);
                *watchdog = Some(timer);
            }
        }
    }

    /// Disable (or re-enable) the watchdog entirely. For debugging only;
    /// intended to be driven by user configuration, not called casually.
    pub fn disable_timeout(&self, disable: bool) {
        self.disable_timeout.store(disable, Ordering::SeqCst);
        if disable {
            if let Some(timer) = self.watchdog.lock().take() {
                self.timers.close_wait(&timer);
            }
            self.timed_out.store(false, Ordering::SeqCst);
        }
    }

    /// Run all three shutdown phases in order. Returns as soon as any
    /// phase's watchdog expires.
    pub fn shutdown(&self) -> ShutdownOutcome {
        if !self.disable_timeout.load(Ordering::SeqCst) && self.watchdog.lock().is_none() {
            self.delay();
        }
        for phase in [Phase::Client, Phase::Server, Phase::Console] {
            debug!(?phase, "shutdown phase starting");
            if self.run_phase(phase) == ShutdownOutcome::TimedOut {
                warn!(?phase, "shutdown watchdog expired");
                return ShutdownOutcome::TimedOut;
            }
        }
        ShutdownOutcome::Completed
    }

    fn run_phase(&self, phase: Phase) -> ShutdownOutcome {
        let handlers = self.handlers.lock().clone();
        let mut incomplete = Vec::new();
        for (index, handler) in handlers.iter().enumerate().rev() {
            if self.timed_out() {
                return ShutdownOutcome::TimedOut;
            }
            if Self::dispatch(phase, handler.as_ref(), true) {
                incomplete.push(index);
            }
        }

        for &index in incomplete.iter() {
            let handler = &handlers[index];
            loop {
                if self.timed_out() {
                    return ShutdownOutcome::TimedOut;
                }
                if !Self::dispatch(phase, handler.as_ref(), false) {
                    break;
                }
                std::thread::sleep(self.poll_interval);
            }
        }

        ShutdownOutcome::Completed
    }

    fn dispatch(phase: Phase, handler: &dyn ShutdownNotify, first_try: bool) -> bool {
        INCOMPLETE.with(|c| c.set(false));
        match phase {
            Phase::Client => handler.on_shutdown_client(first_try),
            Phase::Server => handler.on_shutdown_server(first_try),
            Phase::Console => handler.on_shutdown_console(first_try),
        }
        INCOMPLETE.with(|c| c.get())
    }

    fn timed_out(&self) -> bool {
        self.timers.dispatch_due();
        self.timed_out.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    struct Recorder {
        calls: StdMutex<Vec<(&'static str, bool)>>,
        client_tries_left: AtomicUsize,
    }

    impl Recorder {
        fn new(client_tries_left: usize) -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                client_tries_left: AtomicUsize::new(client_tries_left),
            }
        }
    }

    impl ShutdownNotify for Recorder {
        fn on_shutdown_client(&self, first_try: bool) {
            self.calls.lock().unwrap().push(("client", first_try));
            let remaining = self.client_tries_left.load(Ordering::SeqCst);
            if remaining > 0 {
                self.client_tries_left.store(remaining - 1, Ordering::SeqCst);
                shutdown_incomplete();
            }
        }

        fn on_shutdown_server(&self, first_try: bool) {
            self.calls.lock().unwrap().push(("server", first_try));
        }

        fn on_shutdown_console(&self, first_try: bool) {
            self.calls.lock().unwrap().push(("console", first_try));
        }
    }

    #[test]
    fn completes_immediately_with_no_incomplete_handlers() {
        let coordinator = ShutdownCoordinator::with_poll_interval(Duration::from_millis(1));
        let recorder = Arc::new(Recorder::new(0));
        coordinator.monitor(recorder.clone());
        assert_eq!(coordinator.shutdown(), ShutdownOutcome::Completed);
        let calls = recorder.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            [
                ("client", true),
                ("server", true),
                ("console", true),
            ]
        );
    }

    #[test]
    fn incomplete_handler_is_retried_until_it_finishes() {
        let coordinator = ShutdownCoordinator::with_poll_interval(Duration::from_millis(1));
        let recorder = Arc::new(Recorder::new(2));
        coordinator.monitor(recorder.clone());
        assert_eq!(coordinator.shutdown(), ShutdownOutcome::Completed);
        let calls = recorder.calls.lock().unwrap();
        let client_calls: Vec<_> = calls.iter().filter(|(p, _)| *p == "client").collect();
        assert_eq!(
            client_calls,
            vec![&("client", true), &("client", false), &("client", false)]
        );
    }

    #[test]
    fn retries_run_in_reverse_registration_order() {
        let coordinator = ShutdownCoordinator::with_poll_interval(Duration::from_millis(1));
        let first = Arc::new(Recorder::new(1));
        let second = Arc::new(Recorder::new(1));
        coordinator.monitor(first.clone());
        coordinator.monitor(second.clone());
        coordinator.shutdown();

        // both should have completed; this mostly documents that
        // registration order doesn't deadlock retries against each other
        assert_eq!(first.client_tries_left.load(Ordering::SeqCst), 0);
        assert_eq!(second.client_tries_left.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn watchdog_expiry_is_reported_without_killing_the_process() {
        struct NeverFinishes;
        impl ShutdownNotify for NeverFinishes {
            fn on_shutdown_client(&self, _first_try: bool) {
                shutdown_incomplete();
            }
        }

        let coordinator = ShutdownCoordinator::with_poll_interval(Duration::from_millis(1));
        coordinator.disable_timeout(false);
        coordinator.arm_watchdog(Duration::from_millis(10));
        coordinator.monitor(Arc::new(NeverFinishes));
        assert_eq!(coordinator.shutdown(), ShutdownOutcome::TimedOut);
    }

    #[test]
    fn disabling_timeout_clears_the_watchdog() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.delay();
        assert!(coordinator.watchdog.lock().is_some());
        coordinator.disable_timeout(true);
        assert!(coordinator.watchdog.lock().is_none());
    }

    #[test]
    fn first_try_pass_runs_newest_registration_first() {
        struct Tagged {
            name: &'static str,
            order: Arc<StdMutex<Vec<&'static str>>>,
        }
        impl ShutdownNotify for Tagged {
            fn on_shutdown_client(&self, _first_try: bool) {
                self.order.lock().unwrap().push(self.name);
            }
        }

        let coordinator = ShutdownCoordinator::with_poll_interval(Duration::from_millis(1));
        let order = Arc::new(StdMutex::new(Vec::new()));
        coordinator.monitor(Arc::new(Tagged {
            name: "first",
            order: order.clone(),
        }));
        coordinator.monitor(Arc::new(Tagged {
            name: "second",
            order: order.clone(),
        }));
        coordinator.shutdown();

        assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
    }
}

//! Min-heap timer wheel. Each registered notifier owns at most one live
//! timer entry; re-arming bumps an instance counter so a stale heap entry
//! left behind by a reschedule is recognized and discarded instead of
//! firing twice.
//!
//! The wheel does not run its own thread: [`Queue`](crate::task::Queue)'s
//! event-queue worker asks it for [`next_wait`](TimerWheel::next_wait) to
//! bound its condvar wait, and calls [`dispatch_due`](TimerWheel::dispatch_due)
//! whenever it wakes with no posted task, so every timer callback still
//! runs on the single event thread.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

/// Implemented by anything that wants to be woken at a point in time.
///
/// Returning `Some(duration)` reschedules the timer relative to `now`;
/// returning `None` is the `kTimerInfinite` case and leaves the timer idle
/// until [`TimerWheel::update`] is called again.
pub trait TimerNotify: Send + Sync {
    fn on_timer(&self, now: Instant) -> Option<Duration>;
}

struct Entry {
    instance: u64,
    closing: bool,
    /// The expiration last successfully armed for this record, if any;
    /// lets [`TimerWheel::arm`] judge "sooner" for `only_if_sooner` without
    /// the caller having to keep its own copy.
    expires: Option<Instant>,
}

struct Record {
    notifier: Arc<dyn TimerNotify>,
    state: Mutex<Entry>,
    instance: AtomicU64,
}

/// A live registration returned by [`TimerWheel::update`]; dropping it does
/// not cancel the timer; call [`TimerWheel::close_wait`] explicitly.
#[derive(Clone)]
pub struct Timer(Arc<Record>);

#[derive(PartialEq, Eq)]
struct HeapKey {
    expires: Instant,
    instance: u64,
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.expires
            .cmp(&other.expires)
            .then(self.instance.cmp(&other.instance))
    }
}
impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct HeapEntry {
    key: HeapKey,
    record: Arc<Record>,
}
impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}
impl Eq for HeapEntry {}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Heap ordered earliest-expiration-first, guarded by a single mutex; the
/// single event thread is the only dispatcher, so contention is limited to
/// `update`/`close_wait` calls racing a dispatch.
pub struct TimerWheel {
    heap: Mutex<BinaryHeap<Reverse<HeapEntry>>>,
}

impl Default for TimerWheel {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerWheel {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
        }
    }

    /// Arm or rearm `notifier` to fire after `wait`. If `only_if_sooner` is
    /// set and the notifier already has a pending timer that fires sooner,
    /// the existing schedule is kept. Returns the timer's handle and the
    /// `Instant` at which it will fire.
    pub fn update(
        &self,
        notifier: Arc<dyn TimerNotify>,
        wait: Duration,
        only_if_sooner: bool,
    ) -> (Timer, Instant) {
        let expires = Instant::now() + wait;
        let record = Arc::new(Record {
            notifier,
            state: Mutex::new(Entry {
                instance: 0,
                closing: false,
                expires: None,
            }),
            instance: AtomicU64::new(0),
        });
        let armed = self.arm(&record, expires, only_if_sooner);
        (Timer(record), armed)
    }

    /// Rearm an existing [`Timer`] (as returned from a prior `on_timer`
    /// reschedule or a fresh call to [`update`](Self::update)).
    pub fn rearm(&self, timer: &Timer, wait: Duration, only_if_sooner: bool) -> Instant {
        let expires = Instant::now() + wait;
        self.arm(&timer.0, expires, only_if_sooner)
    }

    /// Arm `record` to fire at `expires`, unless `only_if_sooner` is set and
    /// the record already has a live schedule that fires at or before
    /// `expires` — in which case that existing schedule is left alone.
    /// Returns the expiration actually in effect afterward.
    fn arm(&self, record: &Arc<Record>, expires: Instant, only_if_sooner: bool) -> Instant {
        if only_if_sooner {
            let state = record.state.lock();
            if let Some(current_expires) = state.expires {
                if !state.closing && current_expires <= expires {
                    return current_expires;
                }
            }
        }
        let instance = record.instance.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = record.state.lock();
            state.instance = instance;
            state.closing = false;
            state.expires = Some(expires);
        }
        let mut heap = self.heap.lock();
        heap.push(Reverse(HeapEntry {
            key: HeapKey { expires, instance },
            record: Arc::clone(record),
        }));
        expires
    }

    /// Cancel `timer`. If its callback is currently running on this thread
    /// (re-entrant close from inside `on_timer`), it is marked for closure
    /// instead, since there is nothing else to wait on: every callback runs
    /// on the single event thread, so "wait for it to finish" can never
    /// mean blocking on another thread in the standard configuration.
    pub fn close_wait(&self, timer: &Timer) {
        let mut state = timer.0.state.lock();
        state.closing = true;
        state.instance = timer.0.instance.fetch_add(1, Ordering::SeqCst) + 1;
    }

    /// Duration until the earliest live entry, or `None` if the wheel is
    /// empty (the `kTimerInfinite` case: wait without a bound).
    pub fn next_wait(&self) -> Option<Duration> {
        let heap = self.heap.lock();
        heap.peek().map(|Reverse(entry)| {
            entry
                .key
                .expires
                .saturating_duration_since(Instant::now())
        })
    }

    /// Pop and invoke every entry whose expiration has passed, rescheduling
    /// those whose callback returns `Some(duration)`. Must only be called
    /// from the event thread.
    pub fn dispatch_due(&self) {
        let now = Instant::now();
        loop {
            let due = {
                let mut heap = self.heap.lock();
                match heap.peek() {
                    Some(Reverse(entry)) if entry.key.expires <= now => {
                        heap.pop().map(|Reverse(e)| e)
                    }
                    _ => None,
                }
            };
            let Some(entry) = due else { break };

            let current_instance = { entry.record.state.lock().instance };
            if entry.key.instance != current_instance {
                trace!("dropping stale timer entry");
                continue;
            }
            let closing = entry.record.state.lock().closing;
            if closing {
                continue;
            }

            match entry.record.notifier.on_timer(now) {
                Some(wait) => {
                    let still_closing = entry.record.state.lock().closing;
                    if !still_closing {
                        self.arm(&entry.record, Instant::now() + wait, false);
                    }
                }
                None => {
                    // kTimerInfinite: leave idle until explicitly rearmed.
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingTimer {
        fires: AtomicUsize,
        reschedule: Option<Duration>,
    }

    impl TimerNotify for CountingTimer {
        fn on_timer(&self, _now: Instant) -> Option<Duration> {
            self.fires.fetch_add(1, Ordering::SeqCst);
            self.reschedule
        }
    }

    #[test]
    fn due_timer_fires_once() {
        let wheel = TimerWheel::new();
        let timer = Arc::new(CountingTimer {
            fires: AtomicUsize::new(0),
            reschedule: None,
        });
        wheel.update(timer.clone(), Duration::from_millis(1), false);
        std::thread::sleep(Duration::from_millis(5));
        wheel.dispatch_due();
        assert_eq!(timer.fires.load(Ordering::SeqCst), 1);
        wheel.dispatch_due();
        assert_eq!(timer.fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn rescheduling_timer_fires_repeatedly() {
        let wheel = TimerWheel::new();
        let timer = Arc::new(CountingTimer {
            fires: AtomicUsize::new(0),
            reschedule: Some(Duration::from_millis(1)),
        });
        wheel.update(timer.clone(), Duration::from_millis(1), false);
        for _ in 0..3 {
            std::thread::sleep(Duration::from_millis(3));
            wheel.dispatch_due();
        }
        assert_eq!(timer.fires.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn closed_timer_does_not_fire() {
        let wheel = TimerWheel::new();
        let timer = Arc::new(CountingTimer {
            fires: AtomicUsize::new(0),
            reschedule: None,
        });
        let (handle, _) = wheel.update(timer.clone(), Duration::from_millis(1), false);
        wheel.close_wait(&handle);
        std::thread::sleep(Duration::from_millis(5));
        wheel.dispatch_due();
        assert_eq!(timer.fires.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn next_wait_none_when_empty() {
        let wheel = TimerWheel::new();
        assert!(wheel.next_wait().is_none());
    }

    #[test]
    fn only_if_sooner_keeps_the_earlier_schedule() {
        let wheel = TimerWheel::new();
        let timer = Arc::new(CountingTimer {
            fires: AtomicUsize::new(0),
            reschedule: None,
        });
        let (handle, first_expires) = wheel.update(timer.clone(), Duration::from_millis(5), false);
        let kept = wheel.rearm(&handle, Duration::from_secs(10), true);
        assert_eq!(kept, first_expires);

        std::thread::sleep(Duration::from_millis(10));
        wheel.dispatch_due();
        assert_eq!(timer.fires.load(Ordering::SeqCst), 1, "the original, sooner schedule should have fired");
    }

    #[test]
    fn only_if_sooner_still_moves_to_an_earlier_time() {
        let wheel = TimerWheel::new();
        let timer = Arc::new(CountingTimer {
            fires: AtomicUsize::new(0),
            reschedule: None,
        });
        let (handle, first_expires) = wheel.update(timer.clone(), Duration::from_secs(10), false);
        let moved = wheel.rearm(&handle, Duration::from_millis(1), true);
        assert!(moved < first_expires);

        std::thread::sleep(Duration::from_millis(5));
        wheel.dispatch_due();
        assert_eq!(timer.fires.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn next_wait_bounds_earliest_entry() {
        let wheel = TimerWheel::new();
        let timer = Arc::new(CountingTimer {
            fires: AtomicUsize::new(0),
            reschedule: None,
        });
        wheel.update(timer, Duration::from_secs(10), false);
        let wait = wheel.next_wait().unwrap();
        assert!(wait <= Duration::from_secs(10));
    }
}

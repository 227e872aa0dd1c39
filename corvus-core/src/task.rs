//! Completion-driven task runtime: a single designated event queue, a
//! fixed-size compute queue, and any number of named user queues, all
//! serviced by plain OS threads pulling work off a FIFO deque.
//!
//! Every queue is a [`parking_lot::Mutex`]-guarded deque plus a condition
//! variable; growing a queue spawns more worker threads, shrinking one posts
//! as many sentinel "end thread" jobs as threads need to retire. The event
//! queue additionally folds the process's [`TimerWheel`](crate::timer::TimerWheel)
//! into its wait: instead of blocking forever on the condvar, its worker
//! bounds the wait by the wheel's next expiration and drains due timers
//! before looking at posted work again. That keeps "callbacks run on the
//! event thread" true for timers without needing a second dispatch loop.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::handle::{Handle, HandleMap};
use crate::timer::TimerWheel;

/// A unit of work posted to a queue.
pub type BoxTask = Box<dyn FnOnce() + Send + 'static>;

/// Handle identifying a queue created by a [`TaskRuntime`].
pub type QueueHandle = Handle<Arc<Queue>>;

thread_local! {
    static IN_EVENT_THREAD: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Returns `true` if called from the process's single event-queue thread.
///
/// Socket and protocol callbacks rely on this invariant to skip
/// re-dispatching work that is already running in the right place.
pub fn in_event_thread() -> bool {
    IN_EVENT_THREAD.with(|c| c.get())
}

enum Job {
    Task(BoxTask),
    EndThread,
}

struct QueueState {
    jobs: VecDeque<Job>,
    current_threads: usize,
    want_threads: usize,
}

/// A named FIFO queue serviced by zero or more worker threads.
pub struct Queue {
    name: String,
    is_event: bool,
    state: Mutex<QueueState>,
    not_empty: Condvar,
    timers: Option<Arc<TimerWheel>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("is_event", &self.is_event)
            .field("current_threads", &state.current_threads)
            .field("want_threads", &state.want_threads)
            .field("pending", &state.jobs.len())
            .finish()
    }
}

impl Queue {
    fn new(name: String, is_event: bool, timers: Option<Arc<TimerWheel>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            is_event,
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                current_threads: 0,
                want_threads: 0,
            }),
            not_empty: Condvar::new(),
            timers,
            threads: Mutex::new(Vec::new()),
        })
    }

    fn push(self: &Arc<Self>, job: Job) {
        let mut state = self.state.lock();
        state.jobs.push_back(job);
        self.not_empty.notify_one();
    }

    fn push_many(self: &Arc<Self>, jobs: impl IntoIterator<Item = Job>) {
        let mut state = self.state.lock();
        let mut count = 0usize;
        for job in jobs {
            state.jobs.push_back(job);
            count += 1;
        }
        drop(state);
        if count > 1 {
            self.not_empty.notify_all();
        } else if count == 1 {
            self.not_empty.notify_one();
        }
    }

    fn set_threads(self: &Arc<Self>, want: usize) {
        let mut spawn = 0usize;
        let mut retire = 0usize;
        {
            let mut state = self.state.lock();
            state.want_threads = want;
            if want > state.current_threads {
                spawn = want - state.current_threads;
                state.current_threads = want;
            } else if want < state.current_threads {
                retire = state.current_threads - want;
                state.current_threads = want;
            }
        }
        for _ in 0..retire {
            self.push(Job::EndThread);
        }
        for n in 0..spawn {
            let queue = Arc::clone(self);
            let name = format!("{}-{n}", queue.name);
            let handle = std::thread::Builder::new()
                .name(name)
                .spawn(move || queue.worker_loop())
                .expect("failed to spawn task queue worker thread");
            self.threads.lock().push(handle);
        }
    }

    fn worker_loop(self: Arc<Self>) {
        if self.is_event {
            IN_EVENT_THREAD.with(|c| c.set(true));
        }
        debug!(queue = %self.name, "task queue worker starting");
        loop {
            let job = {
                let mut state = self.state.lock();
                loop {
                    if let Some(job) = state.jobs.pop_front() {
                        break job;
                    }
                    match self.timers.as_ref().and_then(|t| t.next_wait()) {
                        Some(wait) => {
                            drop(
                                self.not_empty
                                    .wait_for(&mut state, wait.min(Duration::from_secs(3600))),
                            );
                        }
                        None => self.not_empty.wait(&mut state),
                    }
                    if let Some(job) = state.jobs.pop_front() {
                        break job;
                    }
                    if let Some(timers) = &self.timers {
                        // Run due timers without holding the queue lock.
                        drop(state);
                        timers.dispatch_due();
                        state = self.state.lock();
                    }
                }
            };
            match job {
                Job::Task(task) => {
                    trace!(queue = %self.name, "running task");
                    task();
                }
                Job::EndThread => {
                    debug!(queue = %self.name, "task queue worker retiring");
                    break;
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The process's task runtime: an event queue, a compute queue, and any
/// number of additional named queues created at runtime.
pub struct TaskRuntime {
    queues: Mutex<HandleMap<Arc<Queue>>>,
    event: QueueHandle,
    compute: QueueHandle,
    timers: Arc<TimerWheel>,
}

impl TaskRuntime {
    /// Build a runtime with a one-thread event queue and an N-thread compute
    /// queue, `compute_threads` defaulting to the number of available cores
    /// when zero is passed.
    pub fn new(compute_threads: usize) -> Arc<Self> {
        let timers = Arc::new(TimerWheel::new());
        let mut queues = HandleMap::new();

        let event_queue = Queue::new("event".into(), true, Some(Arc::clone(&timers)));
        let event = queues.insert(Arc::clone(&event_queue));
        event_queue.set_threads(1);

        let compute_threads = if compute_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            compute_threads
        };
        let compute_queue = Queue::new("compute".into(), false, None);
        let compute = queues.insert(Arc::clone(&compute_queue));
        compute_queue.set_threads(compute_threads);

        Arc::new(Self {
            queues: Mutex::new(queues),
            event,
            compute,
            timers,
        })
    }

    pub fn event_queue(&self) -> QueueHandle {
        self.event
    }

    pub fn compute_queue(&self) -> QueueHandle {
        self.compute
    }

    /// The timer wheel folded into the event queue's wait loop.
    pub fn timers(&self) -> &Arc<TimerWheel> {
        &self.timers
    }

    /// Create a new named queue with `threads` worker threads.
    pub fn create_queue(&self, name: impl Into<String>, threads: usize) -> QueueHandle {
        let queue = Queue::new(name.into(), false, None);
        let handle = self.queues.lock().insert(Arc::clone(&queue));
        queue.set_threads(threads);
        handle
    }

    /// Grow or shrink a queue's worker thread count.
    pub fn set_queue_threads(&self, queue: QueueHandle, threads: usize) {
        let q = self.queue(queue);
        q.set_threads(threads);
    }

    fn queue(&self, handle: QueueHandle) -> Arc<Queue> {
        Arc::clone(
            self.queues
                .lock()
                .get(handle)
                .expect("use of a released queue handle"),
        )
    }

    pub fn post(&self, queue: QueueHandle, task: impl FnOnce() + Send + 'static) {
        self.queue(queue).push(Job::Task(Box::new(task)));
    }

    /// Post a batch of tasks atomically: either all land before the next
    /// pop or none do, and worker threads are woken at most once per batch.
    pub fn post_many<I>(&self, queue: QueueHandle, tasks: I)
    where
        I: IntoIterator<Item = BoxTask>,
    {
        self.queue(queue)
            .push_many(tasks.into_iter().map(Job::Task));
    }

    pub fn post_event(&self, task: impl FnOnce() + Send + 'static) {
        self.post(self.event, task);
    }

    pub fn post_compute(&self, task: impl FnOnce() + Send + 'static) {
        self.post(self.compute, task);
    }

    /// Create a one-shot single-thread queue, run `task` on it, and let the
    /// thread retire once `task` returns. Meant for long-lived loops (a
    /// listener accept loop, a signal dispatcher) that occupy a thread for
    /// the life of the process; the queue handle is intentionally leaked
    /// since nothing else will ever post to it.
    pub fn push_once(&self, name: impl Into<String>, task: impl FnOnce() + Send + 'static) {
        let name = name.into();
        let queue = Queue::new(name, false, None);
        let _handle = self.queues.lock().insert(Arc::clone(&queue));
        queue.push(Job::Task(Box::new(task)));
        queue.set_threads(1);
    }

    /// Shut every queue down by retiring all of its worker threads and
    /// joining them. Intended to be called once, during process shutdown.
    pub fn join_all(&self) {
        let handles: Vec<Arc<Queue>> = self.queues.lock().iter().map(|(_, q)| Arc::clone(q)).collect();
        for queue in &handles {
            queue.set_threads(0);
        }
        for queue in handles {
            let mut threads = queue.threads.lock();
            for handle in threads.drain(..) {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn posted_tasks_run_fifo() {
        let rt = TaskRuntime::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let order = Arc::clone(&order);
            rt.post(rt.compute_queue(), move || order.lock().push(i));
        }
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn event_queue_callbacks_see_in_event_thread() {
        let rt = TaskRuntime::new(1);
        let (tx, rx) = std::sync::mpsc::channel();
        rt.post_event(move || tx.send(in_event_thread()).unwrap());
        assert!(rx.recv_timeout(Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn compute_queue_threads_are_not_the_event_thread() {
        let rt = TaskRuntime::new(1);
        let (tx, rx) = std::sync::mpsc::channel();
        rt.post_compute(move || tx.send(in_event_thread()).unwrap());
        assert!(!rx.recv_timeout(Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn shrinking_a_queue_retires_threads() {
        let rt = TaskRuntime::new(1);
        let q = rt.create_queue("shrink-me", 4);
        {
            let queues = rt.queues.lock();
            let queue = queues.get(q).unwrap();
            std::thread::sleep(Duration::from_millis(50));
            assert_eq!(queue.state.lock().current_threads, 4);
        }
        rt.set_queue_threads(q, 1);
        std::thread::sleep(Duration::from_millis(100));
        let queues = rt.queues.lock();
        let queue = queues.get(q).unwrap();
        assert_eq!(queue.state.lock().current_threads, 1);
    }

    #[test]
    fn post_many_runs_every_task() {
        let rt = TaskRuntime::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<BoxTask> = (0..10)
            .map(|_| {
                let counter = Arc::clone(&counter);
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }) as BoxTask
            })
            .collect();
        rt.post_many(rt.compute_queue(), tasks);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}

//! Completion-driven task/event runtime: handle-indexed slot maps, a task
//! queue runtime with a dedicated event thread, a timer wheel folded into
//! that thread's idle wait, and a three-phase shutdown coordinator.
//!
//! Everything downstream (the socket layer, the protocol demultiplexer,
//! the HTTP/2 engine) is built as callbacks dispatched through
//! [`task::TaskRuntime::post_event`], so this crate is where the
//! single-event-thread invariant actually lives.

#![deny(unreachable_pub)]

pub mod handle;
pub mod shutdown;
pub mod task;
pub mod timer;

pub use handle::{Handle, HandleMap};
pub use shutdown::{shutdown_incomplete, ShutdownCoordinator, ShutdownNotify, ShutdownOutcome};
pub use task::{in_event_thread, BoxTask, QueueHandle, TaskRuntime};
pub use timer::{Timer, TimerNotify, TimerWheel};

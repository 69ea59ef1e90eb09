// src/dag/mod.rs

//! Task graphs and per-run scheduling.
//!
//! - [`graph`] holds the append-only [`Graph`] builder and the [`TaskId`]
//!   handles it hands out.
//! - [`task_info`] defines [`Task`] plus its run condition and retry policy.
//! - [`task_fn`] wraps caller-supplied actions into [`TaskFn`].
//! - [`flow`] is the immutable compiled [`Flow`].
//! - [`scheduler`] contains the per-run state machine that decides which
//!   tasks run, which are skipped, and when the run is over.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions and statistics.

pub mod flow;
pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task_fn;
pub mod task_info;

pub use flow::Flow;
pub use graph::{Graph, TaskId, TaskIds};
pub use scheduler::Scheduler;
pub use scheduler_step::{ScheduledTask, SchedulerStep};
pub use task_fn::{BoxFuture, TaskFn};
pub use task_info::{RetryPolicy, RunCondition, Task, TaskOutcome, TaskRunState};

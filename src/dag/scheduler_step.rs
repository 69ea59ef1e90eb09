// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::dag::task_fn::TaskFn;
use crate::dag::task_info::RetryPolicy;
use crate::engine::TaskName;

/// A task the scheduler wants executed now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    /// Position of the task in its flow; echoed back on completion.
    pub index: usize,
    pub name: TaskName,
    pub func: TaskFn,
    pub retry: RetryPolicy,
}

/// Structured result of a single scheduler "step".
///
/// Useful for tests that drive the scheduler by hand and assert on what
/// changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks that moved to `Running` in this step.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks that were skipped in this step, by condition or because of a
    /// failed ancestor.
    pub newly_skipped: Vec<TaskName>,
    /// Tasks that reached `Failed` in this step.
    pub newly_failed: Vec<TaskName>,
    /// Whether every task is terminal after this step.
    pub run_just_finished: bool,
}

impl SchedulerStep {
    pub fn scheduled_names(&self) -> Vec<&str> {
        self.newly_scheduled.iter().map(|t| t.name.as_str()).collect()
    }
}

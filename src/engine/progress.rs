// src/engine/progress.rs

//! Live run statistics and the progress callback.

use std::collections::BTreeSet;

use crate::dag::TaskOutcome;
use crate::engine::TaskName;

/// Snapshot of a run's task states.
///
/// Every task is in exactly one of the sets at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub flow_name: String,
    pub total: usize,
    pub pending: BTreeSet<TaskName>,
    pub running: BTreeSet<TaskName>,
    pub succeeded: BTreeSet<TaskName>,
    pub condition_skipped: BTreeSet<TaskName>,
    pub dependency_skipped: BTreeSet<TaskName>,
    pub failed: BTreeSet<TaskName>,
    /// The task that most recently reached a terminal state.
    pub last_completed: Option<TaskName>,
}

impl Stats {
    pub fn new<'a>(flow_name: &str, tasks: impl IntoIterator<Item = &'a str>) -> Self {
        let pending: BTreeSet<TaskName> = tasks.into_iter().map(str::to_string).collect();
        Self {
            flow_name: flow_name.to_string(),
            total: pending.len(),
            pending,
            running: BTreeSet::new(),
            succeeded: BTreeSet::new(),
            condition_skipped: BTreeSet::new(),
            dependency_skipped: BTreeSet::new(),
            failed: BTreeSet::new(),
            last_completed: None,
        }
    }

    pub(crate) fn mark_running(&mut self, name: &str) {
        if self.pending.remove(name) {
            self.running.insert(name.to_string());
        }
    }

    pub(crate) fn mark_done(&mut self, name: &str, outcome: TaskOutcome) {
        // Skipped and cancelled tasks go straight from pending to terminal.
        if !self.running.remove(name) {
            self.pending.remove(name);
        }
        let set = match outcome {
            TaskOutcome::Succeeded => &mut self.succeeded,
            TaskOutcome::ConditionSkipped => &mut self.condition_skipped,
            TaskOutcome::DependencySkipped => &mut self.dependency_skipped,
            TaskOutcome::Failed => &mut self.failed,
        };
        set.insert(name.to_string());
        self.last_completed = Some(name.to_string());
    }

    /// Number of tasks in a terminal state.
    pub fn completed(&self) -> usize {
        self.succeeded.len()
            + self.condition_skipped.len()
            + self.dependency_skipped.len()
            + self.failed.len()
    }

    /// `floor(100 * completed / total)`; an empty flow is always at 100.
    pub fn progress_percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (self.completed() * 100 / self.total) as u8
    }

    pub fn is_finished(&self) -> bool {
        self.completed() == self.total
    }
}

/// Callback invoked after every task state transition.
///
/// Reports are delivered in-line on the run's coordinating loop, in the order
/// the transitions happened. A slow reporter slows the whole run.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, stats: &Stats);
}

impl<F> ProgressReporter for F
where
    F: Fn(&Stats) + Send + Sync,
{
    fn report(&self, stats: &Stats) {
        self(stats)
    }
}

/// Caller-facing summary of a run's state.
///
/// ```
/// # use reconcile_flow::engine::{Stats, make_description};
/// let stats = Stats::new("Shoot reconciliation", ["Deploying namespace"]);
/// assert_eq!(make_description(&stats), "Starting Shoot reconciliation");
/// ```
pub fn make_description(stats: &Stats) -> String {
    if stats.is_finished() {
        return format!("{} finished", stats.flow_name);
    }
    if stats.completed() == 0 && stats.running.is_empty() {
        return format!("Starting {}", stats.flow_name);
    }
    if !stats.running.is_empty() {
        return stats
            .running
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
    }
    match &stats.last_completed {
        Some(last) => format!("Completed {last}"),
        None => format!("Starting {}", stats.flow_name),
    }
}

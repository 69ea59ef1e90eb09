// src/dag/state_manager.rs

//! Per-run state management for the tasks of a flow.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::dag::flow::Flow;
use crate::dag::task_info::{TaskOutcome, TaskRunState};
use crate::engine::TaskName;
use crate::engine::progress::Stats;

/// Owns all mutable bookkeeping of a single run: task states, the number of
/// unfinished dependencies per task, and the live [`Stats`].
pub struct StateManager<'f> {
    flow: &'f Flow,
    states: Vec<TaskRunState>,
    /// Dependencies of each task that have not reached a terminal state yet.
    remaining_deps: Vec<usize>,
    /// Set once any dependency ended `Failed` or `DependencySkipped`.
    blocked: Vec<bool>,
    terminal: usize,
    stats: Stats,
}

impl<'f> StateManager<'f> {
    pub fn new(flow: &'f Flow) -> Self {
        let remaining_deps = flow.tasks().iter().map(|t| t.dependencies.len()).collect();
        let stats = Stats::new(flow.name(), flow.task_names());

        Self {
            flow,
            states: vec![TaskRunState::Pending; flow.len()],
            remaining_deps,
            blocked: vec![false; flow.len()],
            terminal: 0,
            stats,
        }
    }

    pub fn state_of(&self, index: usize) -> TaskRunState {
        self.states[index]
    }

    /// Whether an upstream failure means this task must be skipped.
    pub fn is_blocked(&self, index: usize) -> bool {
        self.blocked[index]
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Move a pending task to `Running`.
    pub fn mark_running(&mut self, index: usize) {
        let flow = self.flow;
        let name = &flow.task(index).name;
        if self.states[index] != TaskRunState::Pending {
            warn!(task = %name, state = ?self.states[index], "only pending tasks can start running");
            return;
        }
        self.states[index] = TaskRunState::Running;
        self.stats.mark_running(name);
    }

    /// Record a terminal outcome for a task and return the dependents whose
    /// dependencies are now all terminal.
    pub fn mark_done(&mut self, index: usize, outcome: TaskOutcome) -> Vec<usize> {
        let flow = self.flow;
        let name = &flow.task(index).name;
        if self.states[index].is_terminal() {
            warn!(task = %name, state = ?self.states[index], "task already terminal; ignoring");
            return Vec::new();
        }

        self.states[index] = TaskRunState::Done(outcome);
        self.terminal += 1;
        self.stats.mark_done(name, outcome);

        let mut ready = Vec::new();
        for &dependent in flow.dependents(index) {
            if !outcome.unblocks_dependents() {
                self.blocked[dependent] = true;
            }
            self.remaining_deps[dependent] -= 1;
            if self.remaining_deps[dependent] == 0 {
                debug!(
                    task = %flow.task(dependent).name,
                    blocked = self.blocked[dependent],
                    "all dependencies terminal"
                );
                ready.push(dependent);
            }
        }
        ready
    }

    pub fn all_tasks_terminal(&self) -> bool {
        self.terminal == self.states.len()
    }

    /// Outcomes of every task that reached a terminal state.
    pub fn outcomes(&self) -> BTreeMap<TaskName, TaskOutcome> {
        self.states
            .iter()
            .enumerate()
            .filter_map(|(i, state)| match state {
                TaskRunState::Done(outcome) => Some((self.flow.task(i).name.clone(), *outcome)),
                _ => None,
            })
            .collect()
    }

    pub fn into_stats(self) -> Stats {
        self.stats
    }
}

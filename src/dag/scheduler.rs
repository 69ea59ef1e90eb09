// src/dag/scheduler.rs

use std::collections::VecDeque;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::flow::Flow;
use crate::dag::scheduler_step::{ScheduledTask, SchedulerStep};
use crate::dag::state_manager::StateManager;
use crate::dag::task_info::{TaskOutcome, TaskRunState};
use crate::engine::progress::{ProgressReporter, Stats};
use crate::engine::report::RunReport;
use crate::errors::{AggregatedError, TaskError, TaskFailure};

/// Per-run state machine over an immutable [`Flow`].
///
/// The scheduler is synchronous and performs no IO. It is responsible for:
/// - deciding when a task's dependencies are all terminal
/// - evaluating run conditions and skipping tasks
/// - skipping the transitive dependents of failed tasks
/// - collecting failure causes in the order tasks failed
/// - reporting progress after every state transition
///
/// The async runtime feeds it completions and dispatches whatever it
/// schedules.
pub struct Scheduler<'f> {
    flow: &'f Flow,
    state: StateManager<'f>,
    cancellation: CancellationToken,
    reporter: Option<Arc<dyn ProgressReporter>>,
    failures: Vec<TaskError>,
    started: bool,
}

impl<'f> Scheduler<'f> {
    pub fn new(
        flow: &'f Flow,
        cancellation: CancellationToken,
        reporter: Option<Arc<dyn ProgressReporter>>,
    ) -> Self {
        Self {
            flow,
            state: StateManager::new(flow),
            cancellation,
            reporter,
            failures: Vec::new(),
            started: false,
        }
    }

    /// Resolve the flow's root tasks.
    pub fn start(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.started {
            warn!(flow = %self.flow.name(), "scheduler already started; ignoring");
            return step;
        }
        self.started = true;

        debug!(flow = %self.flow.name(), roots = self.flow.roots().len(), "scheduler: starting run");
        self.resolve(self.flow.roots().iter().copied().collect(), &mut step);
        step.run_just_finished = self.state.all_tasks_terminal();
        step
    }

    /// Handle the end of a task's execution.
    pub fn step_completion(
        &mut self,
        index: usize,
        result: Result<(), TaskFailure>,
    ) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if index >= self.flow.len() {
            warn!(index, "completion for unknown task; ignoring");
            return step;
        }
        let flow = self.flow;
        let name = &flow.task(index).name;
        if self.state.state_of(index) != TaskRunState::Running {
            warn!(
                task = %name,
                state = ?self.state.state_of(index),
                "completion for task that is not running; ignoring"
            );
            return step;
        }

        let mut queue = VecDeque::new();
        match result {
            Ok(()) => {
                info!(task = %name, "task succeeded");
                self.finish(index, TaskOutcome::Succeeded, &mut queue);
            }
            Err(cause) => {
                warn!(task = %name, error = %cause, "task failed; skipping its dependents");
                self.fail(index, cause, &mut queue, &mut step);
            }
        }

        self.resolve(queue, &mut step);
        step.run_just_finished = self.state.all_tasks_terminal();
        if step.run_just_finished {
            info!(flow = %flow.name(), "scheduler: all tasks terminal");
        }
        step
    }

    pub fn is_finished(&self) -> bool {
        self.state.all_tasks_terminal()
    }

    pub fn run_state_of(&self, name: &str) -> Option<TaskRunState> {
        let index = self.flow.task_names().position(|n| n == name)?;
        Some(self.state.state_of(index))
    }

    pub fn stats(&self) -> &Stats {
        self.state.stats()
    }

    /// Failures recorded so far, in the order tasks failed.
    pub fn failures(&self) -> &[TaskError] {
        &self.failures
    }

    pub fn into_report(self) -> RunReport {
        let outcomes = self.state.outcomes();
        let error = if self.failures.is_empty() {
            None
        } else {
            Some(AggregatedError::new(self.flow.name(), self.failures))
        };
        RunReport::new(outcomes, self.state.into_stats(), error)
    }

    /// Decide what happens to each task whose dependencies are all terminal.
    /// Skips cascade through the queue; runnable tasks end up in `step`.
    fn resolve(&mut self, mut queue: VecDeque<usize>, step: &mut SchedulerStep) {
        let flow = self.flow;
        while let Some(index) = queue.pop_front() {
            let task = flow.task(index);

            if self.state.is_blocked(index) {
                info!(task = %task.name, "skipping task because a dependency did not succeed");
                step.newly_skipped.push(task.name.clone());
                self.finish(index, TaskOutcome::DependencySkipped, &mut queue);
                continue;
            }

            if !task.condition.should_run() {
                info!(task = %task.name, "skipping task because its run condition is not met");
                step.newly_skipped.push(task.name.clone());
                self.finish(index, TaskOutcome::ConditionSkipped, &mut queue);
                continue;
            }

            if self.cancellation.is_cancelled() {
                self.fail(index, TaskFailure::Cancelled { last: None }, &mut queue, step);
                continue;
            }

            info!(task = %task.name, retry = ?task.retry, "starting task");
            self.state.mark_running(index);
            self.report();
            step.newly_scheduled.push(ScheduledTask {
                index,
                name: task.name.clone(),
                func: task.func.clone(),
                retry: task.retry,
            });
        }
    }

    fn fail(
        &mut self,
        index: usize,
        cause: TaskFailure,
        queue: &mut VecDeque<usize>,
        step: &mut SchedulerStep,
    ) {
        let name = self.flow.task(index).name.clone();
        step.newly_failed.push(name.clone());
        self.failures.push(TaskError { task: name, cause });
        self.finish(index, TaskOutcome::Failed, queue);
    }

    fn finish(&mut self, index: usize, outcome: TaskOutcome, queue: &mut VecDeque<usize>) {
        let ready = self.state.mark_done(index, outcome);
        self.report();
        queue.extend(ready);
    }

    fn report(&self) {
        if let Some(reporter) = &self.reporter {
            reporter.report(self.state.stats());
        }
    }
}

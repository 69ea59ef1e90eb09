use std::collections::{BTreeSet, HashSet};

use anyhow::anyhow;
use proptest::prelude::*;
use reconcile_flow::dag::{Flow, Graph, Scheduler, Task, TaskFn, TaskIds, TaskOutcome, TaskRunState};
use reconcile_flow::errors::TaskFailure;
use tokio_util::sync::CancellationToken;

// Task N may only depend on tasks 0..N-1, so every generated graph is a DAG.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<BTreeSet<usize>>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        )
        .prop_map(|raw_deps| {
            raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    if i == 0 {
                        BTreeSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    }
                })
                .collect()
        })
    })
}

fn build_flow(deps: &[BTreeSet<usize>]) -> Flow {
    let mut g = Graph::new("property");
    let mut ids = Vec::with_capacity(deps.len());
    for (i, task_deps) in deps.iter().enumerate() {
        let mut after = TaskIds::new();
        for &d in task_deps {
            after.insert(ids[d]);
        }
        ids.push(g.add(Task::new(format!("task_{i}"), TaskFn::noop()).depends_on(after)));
    }
    g.compile().expect("generated graph is valid")
}

/// Outcome every task must end up with, computed in insertion order.
fn expected_outcomes(deps: &[BTreeSet<usize>], failing: &HashSet<usize>) -> Vec<TaskOutcome> {
    let mut outcomes: Vec<TaskOutcome> = Vec::with_capacity(deps.len());
    for (i, task_deps) in deps.iter().enumerate() {
        let blocked = task_deps
            .iter()
            .any(|&d| outcomes[d] != TaskOutcome::Succeeded);
        let outcome = if blocked {
            TaskOutcome::DependencySkipped
        } else if failing.contains(&i) {
            TaskOutcome::Failed
        } else {
            TaskOutcome::Succeeded
        };
        outcomes.push(outcome);
    }
    outcomes
}

proptest! {
    #[test]
    fn test_scheduler_terminates_with_isolated_failures(
        deps in dag_strategy(12),
        failing in proptest::collection::hash_set(0..12usize, 0..4),
        picks in proptest::collection::vec(any::<usize>(), 64),
    ) {
        let flow = build_flow(&deps);
        let mut scheduler = Scheduler::new(&flow, CancellationToken::new(), None);

        let mut running: Vec<usize> = scheduler
            .start()
            .newly_scheduled
            .into_iter()
            .map(|t| t.index)
            .collect();
        let mut picks = picks.into_iter().cycle();
        let mut steps = 0;

        // Complete running tasks in an arbitrary order.
        while !running.is_empty() {
            steps += 1;
            prop_assert!(steps <= deps.len(), "more completions than tasks");

            let pick = picks.next().unwrap_or(0) % running.len();
            let index = running.swap_remove(pick);
            let result = if failing.contains(&index) {
                Err(TaskFailure::Fatal(anyhow!("task_{index} failed")))
            } else {
                Ok(())
            };
            let step = scheduler.step_completion(index, result);
            running.extend(step.newly_scheduled.into_iter().map(|t| t.index));
        }

        prop_assert!(scheduler.is_finished());

        let expected = expected_outcomes(&deps, &failing);
        for (i, outcome) in expected.iter().enumerate() {
            let name = format!("task_{i}");
            prop_assert_eq!(scheduler.run_state_of(&name), Some(TaskRunState::Done(*outcome)));
        }

        let failed = expected.iter().filter(|o| **o == TaskOutcome::Failed).count();
        prop_assert_eq!(scheduler.failures().len(), failed);

        let stats = scheduler.stats();
        prop_assert_eq!(stats.completed(), deps.len());
        prop_assert_eq!(stats.progress_percent(), 100);
        prop_assert!(stats.running.is_empty() && stats.pending.is_empty());
    }
}

// tests/property_scheduler.rs

use std::collections::HashSet;

use proptest::prelude::*;

use jobgraph::dag::{TaskGraph, TaskGuard};
use jobgraph::types::{JobStatus, TaskId, TaskStatus};
use jobgraph_test_utils::builders::memory_engine;
use jobgraph_test_utils::tasks::{EventLog, RecordingTask};

/// One generated task: dependencies on lower indices, a guard and whether
/// its body fails.
#[derive(Debug, Clone)]
struct Shape {
    deps: Vec<usize>,
    guard: TaskGuard,
    fails: bool,
}

fn guard_strategy() -> impl Strategy<Value = TaskGuard> {
    prop_oneof![
        3 => Just(TaskGuard::AllPredecessorsSucceeded),
        2 => Just(TaskGuard::AllPredecessorsCompleted),
        1 => Just(TaskGuard::AllAncestorsSucceeded),
    ]
}

// Acyclic by construction: task N only depends on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<Shape>> {
    (1..=max_tasks).prop_flat_map(|n| {
        proptest::collection::vec(
            (
                proptest::collection::vec(any::<usize>(), 0..3),
                guard_strategy(),
                proptest::bool::weighted(0.25),
            ),
            n,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (potential, guard, fails))| {
                    let deps: HashSet<usize> = if i == 0 {
                        HashSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    };
                    let mut deps: Vec<usize> = deps.into_iter().collect();
                    deps.sort_unstable();
                    Shape { deps, guard, fails }
                })
                .collect()
        })
    })
}

fn name(i: usize) -> String {
    format!("task_{i}")
}

/// Statuses every node must end up with, derived from the guard rules.
fn expected_statuses(shapes: &[Shape]) -> Vec<TaskStatus> {
    let mut out: Vec<TaskStatus> = Vec::with_capacity(shapes.len());
    let mut ancestors: Vec<HashSet<usize>> = Vec::with_capacity(shapes.len());

    for shape in shapes {
        let mut anc = HashSet::new();
        for &d in &shape.deps {
            anc.insert(d);
            anc.extend(ancestors[d].iter().copied());
        }

        let runs = match shape.guard {
            TaskGuard::AllPredecessorsSucceeded => {
                shape.deps.iter().all(|&d| out[d] == TaskStatus::Passed)
            }
            TaskGuard::AllPredecessorsCompleted => true,
            TaskGuard::AllAncestorsSucceeded => anc.iter().all(|&a| out[a] == TaskStatus::Passed),
        };

        out.push(match (runs, shape.fails) {
            (false, _) => TaskStatus::Skipped,
            (true, true) => TaskStatus::Failed,
            (true, false) => TaskStatus::Passed,
        });
        ancestors.push(anc);
    }
    out
}

fn build(shapes: &[Shape], log: &EventLog) -> anyhow::Result<(TaskGraph, Vec<TaskId>)> {
    let mut g = TaskGraph::new();
    let mut ids: Vec<TaskId> = Vec::with_capacity(shapes.len());
    for (i, shape) in shapes.iter().enumerate() {
        let mut task = RecordingTask::new(&name(i), log);
        if shape.fails {
            task = task.failing();
        }
        let deps: Vec<TaskId> = shape.deps.iter().map(|&d| ids[d]).collect();
        ids.push(g.add_task(task, shape.guard, &deps)?);
    }
    Ok((g, ids))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn every_job_settles_as_the_guards_dictate(shapes in dag_strategy(9), pool in 1usize..4) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let log = EventLog::new();
        let (graph, ids) = build(&shapes, &log).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let (engine, _store) = memory_engine(pool, 1);

        let job = rt
            .block_on(async {
                tokio::time::timeout(
                    std::time::Duration::from_secs(10),
                    engine.submit("prop", graph, true),
                )
                .await
            })
            .map_err(|_| TestCaseError::fail("job did not terminate"))?
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let expected = expected_statuses(&shapes);

        prop_assert!(job.is_finished());
        for (i, id) in ids.iter().enumerate() {
            let status = job.task_status(*id);
            prop_assert_eq!(status, Some(expected[i]), "task {}", name(i));
            prop_assert_eq!(log.ran(&name(i)), expected[i] != TaskStatus::Skipped);
        }

        // A task never starts before a predecessor that ran has finished.
        for (i, shape) in shapes.iter().enumerate() {
            if !log.ran(&name(i)) {
                continue;
            }
            for &d in &shape.deps {
                if log.ran(&name(d)) {
                    prop_assert!(
                        log.finished_before(&name(d), &name(i)),
                        "{} started before {} finished", name(i), name(d)
                    );
                }
            }
        }

        prop_assert!(log.max_concurrency() <= pool);

        let any_failed = expected.contains(&TaskStatus::Failed);
        let want = if any_failed { JobStatus::Failed } else { JobStatus::Passed };
        prop_assert_eq!(job.status(), want);

        rt.block_on(engine.shutdown()).map_err(|e| TestCaseError::fail(e.to_string()))?;
    }
}

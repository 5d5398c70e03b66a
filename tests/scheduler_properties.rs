// tests/scheduler_properties.rs

use std::collections::HashSet;

use fetchdag::dag::{
    RoundExit, Scheduler, SchedulerStep, SkipReason, TaskId, TaskSpec, TaskState,
};
use fetchdag::exec::ToolError;
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use serde_json::json;

// Task `i + 1` may only depend on tasks `1..=i`, so every plan is acyclic.
fn plan_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<Vec<TaskId>>> {
    (1..=max_tasks)
        .prop_flat_map(|n| {
            proptest::collection::vec(proptest::collection::vec(any::<u32>(), 0..3), n)
        })
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, picks)| {
                    let i = i as TaskId;
                    let mut deps: Vec<TaskId> = if i == 0 {
                        Vec::new()
                    } else {
                        picks.into_iter().map(|p| p % i + 1).collect()
                    };
                    deps.sort_unstable();
                    deps.dedup();
                    deps
                })
                .collect()
        })
}

struct Harness {
    scheduler: Scheduler,
    running: Vec<TaskId>,
    dispatched: HashSet<TaskId>,
    max_concurrency: usize,
}

impl Harness {
    fn absorb(&mut self, step: SchedulerStep) -> Result<(), TestCaseError> {
        for task in step.newly_scheduled {
            prop_assert!(self.dispatched.insert(task.id), "task {} dispatched twice", task.id);
            for dep in self.scheduler.graph().dependencies_of(task.id) {
                prop_assert_eq!(
                    self.scheduler.state_of(dep),
                    Some(TaskState::Done),
                    "task {} ran before dependency {} was done",
                    task.id,
                    dep
                );
            }
            self.running.push(task.id);
        }
        self.running.retain(|id| !step.cancelled.contains(id));
        prop_assert!(self.scheduler.running_count() <= self.max_concurrency);
        prop_assert_eq!(self.scheduler.running_count(), self.running.len());
        Ok(())
    }

    fn complete_one(&mut self, pick: usize, failing: &HashSet<TaskId>) -> Result<(), TestCaseError> {
        if self.running.is_empty() {
            return Ok(());
        }
        let id = self.running.remove(pick % self.running.len());
        let outcome = if failing.contains(&id) {
            Err(ToolError::Execution(format!("task {id} failed")))
        } else {
            Ok(json!(id))
        };
        let step = self.scheduler.handle_completion(id, outcome);
        self.absorb(step)
    }
}

proptest! {
    #[test]
    fn every_round_terminates_and_respects_dependencies(
        deps in plan_strategy(12),
        failing in proptest::collection::hash_set(1u32..=12, 0..4),
        picks in proptest::collection::vec(any::<usize>(), 64),
        max_concurrency in 1usize..4,
        with_join in any::<bool>(),
    ) {
        let mut h = Harness {
            scheduler: Scheduler::new(max_concurrency),
            running: Vec::new(),
            dispatched: HashSet::new(),
            max_concurrency,
        };
        let mut picks = picks.into_iter().cycle();

        // Interleave planning with completions, as a streaming planner would.
        for (i, task_deps) in deps.iter().enumerate() {
            let spec = TaskSpec::new(i as TaskId + 1, "tool").with_deps(task_deps.iter().copied());
            let step = h.scheduler.handle_planned(spec).expect("acyclic plan");
            h.absorb(step)?;

            let pick = picks.next().unwrap_or(0);
            if pick % 2 == 0 {
                h.complete_one(pick / 2, &failing)?;
            }
        }
        if with_join {
            let sentinel = deps.len() as TaskId + 1;
            let step = h.scheduler.handle_planned(TaskSpec::new(sentinel, "join")).expect("join");
            h.absorb(step)?;
        }
        let step = h.scheduler.handle_stream_closed().expect("closed");
        h.absorb(step)?;

        while !h.running.is_empty() {
            let pick = picks.next().unwrap_or(0);
            h.complete_one(pick, &failing)?;
        }

        let s = &h.scheduler;
        prop_assert!(s.is_finished());
        if with_join {
            prop_assert_eq!(s.exit(), Some(RoundExit::JoinReached { sentinel: deps.len() as TaskId + 1 }));
        } else {
            prop_assert_eq!(s.exit(), Some(RoundExit::Completed));
        }

        for node in s.graph().tasks() {
            prop_assert!(node.state().is_terminal(), "task {} left {:?}", node.id, node.state());
            match node.state() {
                TaskState::Done if !node.is_join() => {
                    prop_assert!(s.deps_satisfied(node.id));
                    prop_assert!(!failing.contains(&node.id));
                }
                TaskState::Failed => prop_assert!(failing.contains(&node.id)),
                TaskState::Skipped => {
                    let Some(SkipReason::UpstreamFailed { dependency }) = node.skip_reason() else {
                        return Err(TestCaseError::fail(format!("task {} skipped without cause", node.id)));
                    };
                    prop_assert!(node.deps.contains(&dependency));
                    prop_assert!(matches!(
                        s.state_of(dependency),
                        Some(TaskState::Failed) | Some(TaskState::Skipped)
                    ));
                }
                _ => {}
            }
        }

        let reported: Vec<TaskId> = s.report().iter().map(|r| r.id).collect();
        let expected: Vec<TaskId> = (1..=deps.len() as TaskId).collect();
        prop_assert_eq!(reported, expected);
    }
}

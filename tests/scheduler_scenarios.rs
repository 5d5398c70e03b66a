// tests/scheduler_scenarios.rs

use fetchdag::dag::{
    GraphError, RoundExit, Scheduler, SchedulerStep, SkipReason, TaskId, TaskOutcome, TaskSpec,
    TaskState,
};
use fetchdag::exec::ToolError;
use fetchdag_test_utils::builders::{join, task, task_with_args};
use fetchdag_test_utils::init_tracing;
use serde_json::json;

fn scheduled(step: &SchedulerStep) -> Vec<TaskId> {
    step.newly_scheduled.iter().map(|t| t.id).collect()
}

#[test]
fn two_searches_then_summary_with_substituted_results() {
    init_tracing();
    let mut s = Scheduler::new(4);

    assert_eq!(scheduled(&s.handle_planned(task(1, "search", "a")).unwrap()), vec![1]);
    assert_eq!(scheduled(&s.handle_planned(task(2, "search", "b")).unwrap()), vec![2]);
    let step = s
        .handle_planned(task_with_args(3, "summarize", json!({"0": "$1", "1": "${2}"})))
        .unwrap();
    assert!(step.newly_scheduled.is_empty());
    assert_eq!(s.state_of(3), Some(TaskState::Pending));
    s.handle_stream_closed().unwrap();

    // Completion order does not matter.
    assert!(s.handle_completion(2, Ok(json!("rb"))).newly_scheduled.is_empty());
    let step = s.handle_completion(1, Ok(json!("ra")));
    assert_eq!(step.newly_scheduled.len(), 1);
    assert_eq!(step.newly_scheduled[0].id, 3);
    assert_eq!(step.newly_scheduled[0].args, json!({"0": "ra", "1": "rb"}));

    let step = s.handle_completion(3, Ok(json!("summary")));
    assert!(step.round_finished);
    assert_eq!(s.exit(), Some(RoundExit::Completed));

    let report = s.report();
    assert_eq!(report.len(), 3);
    assert!(report.iter().all(|r| r.outcome.is_done()));
    assert_eq!(report[2].args, json!({"0": "ra", "1": "rb"}));
}

#[test]
fn failure_skips_only_its_dependents() {
    init_tracing();
    let mut s = Scheduler::new(4);

    s.handle_planned(task(1, "search", "a")).unwrap();
    s.handle_planned(task(2, "fetch", "b")).unwrap();
    s.handle_planned(task_with_args(3, "summarize", json!({"text": "$2"})))
        .unwrap();
    s.handle_planned(task_with_args(4, "format", json!({"text": "$1"})))
        .unwrap();
    s.handle_stream_closed().unwrap();

    let step = s.handle_completion(2, Err(ToolError::Execution("boom".into())));
    assert_eq!(step.newly_skipped, vec![3]);

    let step = s.handle_completion(1, Ok(json!("ra")));
    assert_eq!(scheduled(&step), vec![4]);
    let step = s.handle_completion(4, Ok(json!("formatted")));
    assert!(step.round_finished);

    let report = s.report();
    assert!(matches!(report[1].outcome, TaskOutcome::Failed { .. }));
    assert_eq!(
        report[2].outcome,
        TaskOutcome::Skipped {
            reason: SkipReason::UpstreamFailed { dependency: 2 }
        }
    );
    assert!(report[3].outcome.is_done());
}

#[test]
fn skips_propagate_transitively() {
    let mut s = Scheduler::new(4);
    s.handle_planned(task(1, "a", "x")).unwrap();
    s.handle_planned(task(2, "b", "$1")).unwrap();
    s.handle_planned(task(3, "c", "$2")).unwrap();
    s.handle_stream_closed().unwrap();

    let step = s.handle_completion(1, Err(ToolError::Timeout(std::time::Duration::from_secs(1))));
    assert_eq!(step.newly_skipped, vec![2, 3]);
    assert!(step.round_finished);
}

#[test]
fn task_declared_after_its_dependency_failed_is_skipped_on_arrival() {
    let mut s = Scheduler::new(4);
    s.handle_planned(task(1, "a", "x")).unwrap();
    s.handle_completion(1, Err(ToolError::Execution("no".into())));

    let step = s.handle_planned(task(2, "b", "$1")).unwrap();
    assert_eq!(step.newly_skipped, vec![2]);
    assert_eq!(s.state_of(2), Some(TaskState::Skipped));
}

#[test]
fn cycle_is_rejected_before_anything_runs() {
    let mut s = Scheduler::new(4);
    let step = s
        .handle_planned(TaskSpec::new(1, "a").with_deps([2]))
        .unwrap();
    assert!(step.newly_scheduled.is_empty());

    let err = s
        .handle_planned(TaskSpec::new(2, "b").with_deps([1]))
        .unwrap_err();
    assert_eq!(err, GraphError::CyclicDependency { members: vec![1, 2] });
    assert_eq!(s.running_count(), 0);
}

#[test]
fn dangling_reference_is_reported_at_close() {
    let mut s = Scheduler::new(4);
    s.handle_planned(task(1, "a", "$7")).unwrap();
    let err = s.handle_stream_closed().unwrap_err();
    assert_eq!(err, GraphError::DanglingReference { task: 1, missing: 7 });
}

#[test]
fn structural_errors_on_declaration() {
    let mut s = Scheduler::new(4);
    assert_eq!(
        s.handle_planned(task(1, "a", "$1")).unwrap_err(),
        GraphError::SelfReference { task: 1 }
    );

    let mut s = Scheduler::new(4);
    s.handle_planned(task(1, "a", "x")).unwrap();
    assert_eq!(
        s.handle_planned(task(1, "b", "y")).unwrap_err(),
        GraphError::DuplicateTask { task: 1 }
    );
}

#[test]
fn forward_reference_resolves_when_the_task_arrives() {
    let mut s = Scheduler::new(4);
    s.handle_planned(task(2, "b", "$1")).unwrap();
    assert_eq!(scheduled(&s.handle_planned(task(1, "a", "x")).unwrap()), vec![1]);

    let step = s.handle_completion(1, Ok(json!("one")));
    assert_eq!(scheduled(&step), vec![2]);
    assert_eq!(step.newly_scheduled[0].args, json!({"input": "one"}));
}

#[test]
fn whole_placeholder_keeps_structured_results() {
    let mut s = Scheduler::new(4);
    s.handle_planned(task(1, "list", "x")).unwrap();
    s.handle_planned(task_with_args(2, "count", json!({"items": "$1", "label": "n=$1"})))
        .unwrap();

    let step = s.handle_completion(1, Ok(json!([1, 2])));
    assert_eq!(
        step.newly_scheduled[0].args,
        json!({"items": [1, 2], "label": "n=[1,2]"})
    );
}

#[test]
fn join_without_deps_waits_for_every_earlier_task() {
    let mut s = Scheduler::new(4);
    s.handle_planned(task(1, "a", "x")).unwrap();
    s.handle_planned(task(2, "b", "y")).unwrap();
    s.handle_planned(join(3)).unwrap();

    assert!(!s.handle_completion(1, Ok(json!("one"))).round_finished);
    let step = s.handle_completion(2, Err(ToolError::Execution("late failure".into())));
    assert!(step.round_finished);
    assert_eq!(s.exit(), Some(RoundExit::JoinReached { sentinel: 3 }));

    // The sentinel is not a tool call and is not reported.
    let ids: Vec<_> = s.report().iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn tasks_planned_after_the_round_ended_are_ignored() {
    let mut s = Scheduler::new(4);
    s.handle_planned(join(1)).unwrap();
    assert_eq!(s.exit(), Some(RoundExit::JoinReached { sentinel: 1 }));

    let step = s.handle_planned(task(2, "a", "x")).unwrap();
    assert!(step.is_empty());
    assert!(!s.graph().contains(2));
}

#[test]
fn ready_set_lists_tasks_waiting_for_a_slot() {
    let mut s = Scheduler::new(1);
    s.handle_planned(task(1, "a", "x")).unwrap();
    s.handle_planned(task(2, "b", "$1")).unwrap();
    s.handle_planned(task(3, "c", "$1")).unwrap();
    s.handle_planned(task(4, "d", "y")).unwrap();
    assert_eq!(s.ready_set(), vec![4]);
    assert!(!s.deps_satisfied(2));

    // Task 4 takes the free slot; 2 and 3 queue behind it.
    let step = s.handle_completion(1, Ok(json!("one")));
    assert_eq!(scheduled(&step), vec![4]);
    assert_eq!(s.ready_set(), vec![2, 3]);
    assert!(s.deps_satisfied(3));

    let step = s.handle_completion(4, Ok(json!("four")));
    assert_eq!(scheduled(&step), vec![2]);
    assert_eq!(s.ready_set(), vec![3]);
    assert_eq!(s.state_of(3), Some(TaskState::Ready));
}

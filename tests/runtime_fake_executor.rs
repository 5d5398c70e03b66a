// tests/runtime_fake_executor.rs

use std::error::Error;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};

use fetchdag::dag::{
    GraphError, RoundExit, ScheduledTask, Scheduler, SkipReason, TaskOutcome, TaskSpec,
};
use fetchdag::engine::{CoreRuntime, RoundReport, Runtime, RuntimeEvent};
use fetchdag::errors::FetchdagError;
use fetchdag_test_utils::builders::{join, task, task_with_args};
use fetchdag_test_utils::fake_executor::FakeExecutor;
use fetchdag_test_utils::init_tracing;
use serde_json::json;

type TestResult = Result<(), Box<dyn Error>>;

struct Round {
    tx: mpsc::Sender<RuntimeEvent>,
    runtime: Runtime<FakeExecutor>,
    executed: Arc<Mutex<Vec<ScheduledTask>>>,
    cancelled: Arc<Mutex<Vec<u32>>>,
}

fn round(max_concurrency: usize, configure: impl FnOnce(FakeExecutor) -> FakeExecutor) -> Round {
    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = configure(FakeExecutor::new(tx.clone(), Arc::clone(&executed)));
    let cancelled = executor.cancelled();
    let core = CoreRuntime::new(Scheduler::new(max_concurrency));
    Round {
        tx,
        runtime: Runtime::new(core, rx, executor),
        executed,
        cancelled,
    }
}

async fn send_all(tx: &mpsc::Sender<RuntimeEvent>, specs: Vec<TaskSpec>) -> TestResult {
    for spec in specs {
        tx.send(RuntimeEvent::TaskPlanned(spec)).await?;
    }
    Ok(())
}

async fn run(runtime: Runtime<FakeExecutor>) -> fetchdag::errors::Result<RoundReport> {
    timeout(Duration::from_secs(2), runtime.run())
        .await
        .expect("runtime did not finish in time")
}

#[tokio::test]
async fn runtime_executes_streamed_plan_and_substitutes_results() -> TestResult {
    init_tracing();
    let r = round(4, |e| e);

    send_all(
        &r.tx,
        vec![
            task(1, "search", "a"),
            task(2, "search", "b"),
            task_with_args(3, "summarize", json!({"0": "$1", "1": "$2"})),
        ],
    )
    .await?;
    r.tx.send(RuntimeEvent::PlanClosed).await?;

    let report = run(r.runtime).await?;
    assert_eq!(report.exit, RoundExit::Completed);
    assert_eq!(report.records.len(), 3);
    assert!(report.records.iter().all(|rec| rec.outcome.is_done()));

    let executed = r.executed.lock().unwrap().clone();
    let summary = executed.iter().find(|t| t.id == 3).expect("task 3 ran");
    assert_eq!(summary.args, json!({"0": "search#1", "1": "search#2"}));
    Ok(())
}

#[tokio::test]
async fn failing_tool_skips_dependents_but_not_siblings() -> TestResult {
    init_tracing();
    let r = round(4, |e| e.failing("fetch", "404"));

    send_all(
        &r.tx,
        vec![
            task(1, "search", "a"),
            task(2, "fetch", "b"),
            task(3, "summarize", "$2"),
            task(4, "format", "$1"),
        ],
    )
    .await?;
    r.tx.send(RuntimeEvent::PlanClosed).await?;

    let report = run(r.runtime).await?;
    let outcomes: Vec<_> = report.records.iter().map(|rec| rec.outcome.clone()).collect();
    assert!(outcomes[0].is_done());
    assert!(matches!(&outcomes[1], TaskOutcome::Failed { error } if error.contains("404")));
    assert_eq!(
        outcomes[2],
        TaskOutcome::Skipped {
            reason: SkipReason::UpstreamFailed { dependency: 2 }
        }
    );
    assert!(outcomes[3].is_done());

    let ran: Vec<_> = r.executed.lock().unwrap().iter().map(|t| t.id).collect();
    assert!(!ran.contains(&3));
    Ok(())
}

#[tokio::test]
async fn cycle_aborts_round_with_graph_error() -> TestResult {
    init_tracing();
    let r = round(4, |e| e);

    send_all(
        &r.tx,
        vec![
            TaskSpec::new(1, "a").with_deps([2]),
            TaskSpec::new(2, "b").with_deps([1]),
        ],
    )
    .await?;

    match run(r.runtime).await {
        Err(FetchdagError::Graph(GraphError::CyclicDependency { members })) => {
            assert_eq!(members, vec![1, 2]);
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }
    assert!(r.executed.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn planner_failure_aborts_and_cancels_in_flight_work() -> TestResult {
    init_tracing();
    let r = round(4, |e| e.hanging("slow"));

    send_all(&r.tx, vec![task(1, "slow", "x")]).await?;
    r.tx.send(RuntimeEvent::PlanFailed("model offline".into()))
        .await?;

    match run(r.runtime).await {
        Err(FetchdagError::Planner(msg)) => assert_eq!(msg, "model offline"),
        other => panic!("expected a planner error, got {other:?}"),
    }
    assert_eq!(*r.cancelled.lock().unwrap(), vec![1]);
    Ok(())
}

#[tokio::test]
async fn cancel_request_ends_round_and_skips_live_tasks() -> TestResult {
    init_tracing();
    let r = round(4, |e| e.hanging("slow"));

    send_all(&r.tx, vec![task(1, "slow", "x"), task(2, "next", "$1")]).await?;
    r.tx.send(RuntimeEvent::CancelRequested).await?;

    let report = run(r.runtime).await?;
    assert_eq!(report.exit, RoundExit::Cancelled);
    assert_eq!(*r.cancelled.lock().unwrap(), vec![1]);
    assert!(report.records.iter().all(|rec| rec.outcome
        == TaskOutcome::Skipped {
            reason: SkipReason::Cancelled
        }));
    Ok(())
}

#[tokio::test]
async fn join_sentinel_exits_early_without_waiting_for_slow_tasks() -> TestResult {
    init_tracing();
    let r = round(4, |e| e.hanging("slow"));

    send_all(
        &r.tx,
        vec![
            task(1, "slow", "x"),
            task(2, "fast", "y"),
            join(3).with_deps([2]),
        ],
    )
    .await?;

    let report = run(r.runtime).await?;
    assert_eq!(report.exit, RoundExit::JoinReached { sentinel: 3 });
    assert_eq!(*r.cancelled.lock().unwrap(), vec![1]);
    assert_eq!(report.records.len(), 2);
    assert!(report.records[1].outcome.is_done());
    Ok(())
}

#[tokio::test]
async fn concurrency_bound_limits_dispatch() -> TestResult {
    init_tracing();
    let r = round(1, |e| e.hanging("slow"));

    send_all(&r.tx, vec![task(1, "slow", "a"), task(2, "slow", "b")]).await?;
    r.tx.send(RuntimeEvent::CancelRequested).await?;

    let report = run(r.runtime).await?;
    assert_eq!(report.exit, RoundExit::Cancelled);
    let ran: Vec<_> = r.executed.lock().unwrap().iter().map(|t| t.id).collect();
    assert_eq!(ran, vec![1]);
    Ok(())
}

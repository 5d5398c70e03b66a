// src/compiler.rs

//! Plan → execute → join loop.
//!
//! Each round gets its own event channel, scheduler and executor. The
//! planner runs concurrently with execution and feeds the same channel as
//! the tool calls, so tasks start as soon as they are planned.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::context::{PlanContext, RoundRecord};
use crate::dag::Scheduler;
use crate::engine::{CoreRuntime, RoundReport, Runtime, RuntimeEvent};
use crate::errors::{FetchdagError, Result};
use crate::exec::task_runner::describe_join_error;
use crate::exec::{RegistryExecutor, ToolRegistry};
use crate::joiner::{JoinInput, Joiner, JoinerMachine, NextStep};
use crate::planner::{PlanSink, Planner, drive};

/// Capacity of each round's runtime event channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Hard cap on planning rounds (including the first).
    pub max_rounds: u32,
    /// Maximum number of tool calls in flight at once.
    pub max_concurrency: usize,
    /// Per-task timeout for tools without their own.
    pub task_timeout: Duration,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            max_concurrency: 4,
            task_timeout: Duration::from_secs(60),
        }
    }
}

/// Final answer plus the rounds that led to it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub rounds: u32,
    /// Every round before the final one.
    pub history: Vec<RoundRecord>,
    /// The final round's outcomes.
    pub last_round: RoundReport,
}

/// Requests cancellation of a running [`Compiler`] (e.g. from Ctrl-C).
///
/// Cancelling ends the current round early; no further round is started.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

pub struct Compiler {
    planner: Arc<dyn Planner>,
    joiner: Arc<dyn Joiner>,
    registry: Arc<ToolRegistry>,
    options: CompilerOptions,
    cancel: CancelHandle,
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Compiler {
    pub fn new(
        planner: Arc<dyn Planner>,
        joiner: Arc<dyn Joiner>,
        registry: Arc<ToolRegistry>,
        options: CompilerOptions,
    ) -> Self {
        Self {
            planner,
            joiner,
            registry,
            options,
            cancel: CancelHandle::default(),
        }
    }

    pub fn options(&self) -> CompilerOptions {
        self.options
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Answer `query`, replanning as often as the joiner asks and the round
    /// cap allows.
    pub async fn run(&self, query: &str) -> Result<Answer> {
        let mut ctx = PlanContext::new(query);
        let mut machine = JoinerMachine::new(self.options.max_rounds);

        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchdagError::Cancelled);
            }

            match ctx.latest_feedback() {
                Some(feedback) if ctx.is_replan() => {
                    info!(round = ctx.round, %feedback, "starting replan round")
                }
                _ => info!(round = ctx.round, "starting round"),
            }
            let report = self.run_round(&ctx).await?;
            info!(
                round = ctx.round,
                exit = ?report.exit,
                done = report.records.iter().filter(|r| r.outcome.is_done()).count(),
                tasks = report.records.len(),
                "round finished"
            );

            let input = JoinInput::new(&ctx, &report);
            let decision = self.joiner.decide(&input).await?;

            match machine.on_decision(decision)? {
                NextStep::Finish(answer) => {
                    info!(rounds = ctx.round, "answer ready");
                    return Ok(Answer {
                        answer,
                        rounds: ctx.round,
                        history: ctx.history,
                        last_round: report,
                    });
                }
                NextStep::Replan { feedback, .. } => {
                    if self.cancel.is_cancelled() {
                        return Err(FetchdagError::Cancelled);
                    }
                    ctx = ctx.next_round(report, feedback);
                }
            }
        }
    }

    /// Plan and execute one round, returning its report.
    pub async fn run_round(&self, ctx: &PlanContext) -> Result<RoundReport> {
        let (tx, rx) = mpsc::channel::<RuntimeEvent>(EVENT_CHANNEL_CAPACITY);

        let executor =
            RegistryExecutor::new(Arc::clone(&self.registry), self.options.task_timeout, tx.clone());
        let scheduler =
            Scheduler::with_carried_results(self.options.max_concurrency, ctx.carried_results());
        let core = CoreRuntime::new(scheduler);
        let runtime = Runtime::new(core, rx, executor);

        let planner_task = {
            let planner = Arc::clone(&self.planner);
            let ctx = ctx.clone();
            let sink = PlanSink::new(tx.clone());
            let failed_tx = tx.clone();
            tokio::spawn(async move {
                // Aborting this watcher drops the set, which aborts the planner.
                let mut run = JoinSet::new();
                run.spawn(async move { drive(planner.as_ref(), &ctx, sink).await });
                if let Some(Err(e)) = run.join_next().await {
                    let reason = format!("planner {}", describe_join_error(e));
                    warn!(%reason, "planner task died");
                    let _ = failed_tx.send(RuntimeEvent::PlanFailed(reason)).await;
                }
            })
        };

        let cancel_task = {
            let tx = tx.clone();
            let notify = Arc::clone(&self.cancel.notify);
            tokio::spawn(async move {
                notify.notified().await;
                debug!("forwarding cancel request to the round");
                let _ = tx.send(RuntimeEvent::CancelRequested).await;
            })
        };

        drop(tx);
        let result = runtime.run().await;

        planner_task.abort();
        cancel_task.abort();
        result
    }
}

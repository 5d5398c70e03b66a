// src/planner/mod.rs

//! Planner adapter.
//!
//! A planner turns the [`PlanContext`] into a stream of [`TaskSpec`]s. It
//! pushes each spec into a [`PlanSink`] as soon as it is known so the
//! scheduler can start executing before the plan is complete. The
//! [`drive`] helper closes (or fails) the stream once the planner returns.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::context::PlanContext;
use crate::dag::TaskSpec;
use crate::engine::RuntimeEvent;
use crate::errors::{FetchdagError, Result};

pub mod command;
pub mod parser;
pub mod scripted;

pub use command::CommandPlanner;
pub use parser::{LineBuffer, PlanParser, parse_plan, parse_task_line};
pub use scripted::ScriptedPlanner;

pub type PlanFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Produces the task stream for one round.
pub trait Planner: Send + Sync {
    /// Emit this round's tasks into `sink`. Returning `Ok` closes the
    /// stream; returning `Err` aborts the round.
    fn plan<'a>(&'a self, ctx: &'a PlanContext, sink: PlanSink) -> PlanFuture<'a>;
}

/// Producer end of a round's task stream.
#[derive(Debug, Clone)]
pub struct PlanSink {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl PlanSink {
    pub fn new(tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self { tx }
    }

    /// Hand one task to the scheduler.
    ///
    /// Returns `false` once the round is over and nothing is listening any
    /// more; planners should stop producing at that point.
    pub async fn emit(&self, spec: TaskSpec) -> bool {
        debug!(task = spec.id, tool = %spec.tool, "planner emitted task");
        self.tx.send(RuntimeEvent::TaskPlanned(spec)).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn close(self) {
        if self.tx.send(RuntimeEvent::PlanClosed).await.is_err() {
            debug!("round already over when the plan stream closed");
        }
    }

    async fn fail(self, reason: String) {
        if self.tx.send(RuntimeEvent::PlanFailed(reason)).await.is_err() {
            debug!("round already over when the planner failed");
        }
    }
}

/// Run `planner` for one round and signal the end of its stream.
pub async fn drive(planner: &dyn Planner, ctx: &PlanContext, sink: PlanSink) {
    let closer = sink.clone();
    match planner.plan(ctx, sink).await {
        Ok(()) => closer.close().await,
        Err(e) => {
            warn!(round = ctx.round, error = %e, "planner failed");
            let reason = match e {
                FetchdagError::Planner(msg) => msg,
                other => other.to_string(),
            };
            closer.fail(reason).await;
        }
    }
}

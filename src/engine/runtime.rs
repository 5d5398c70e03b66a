// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dag::{ScheduledTask, TaskId};
use crate::errors::{FetchdagError, Result};
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, RoundAbort, RoundReport, RuntimeEvent};

/// Drives one round of the scheduler in response to `RuntimeEvent`s, and
/// delegates actual tool calls to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// scheduling semantics. The planner and the executor both feed the same
/// event channel, so every state change is applied by this single loop.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
        }
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core (dispatch, cancel, abort).
    ///
    /// Returns the round report once the core says the round is over, or
    /// the structural/planner error that aborted it.
    pub async fn run(mut self) -> Result<RoundReport> {
        debug!("round runtime started");
        let mut abort: Option<RoundAbort> = None;

        loop {
            let Some(event) = self.event_rx.recv().await else {
                info!("runtime event channel closed; exiting");
                return Err(FetchdagError::ChannelClosed);
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);

            for command in step.commands {
                if let Some(a) = self.execute_command(command).await? {
                    abort = Some(a);
                }
            }

            if !step.keep_running {
                break;
            }
        }

        if let Some(abort) = abort {
            return Err(abort.into());
        }

        let report = self.core.report();
        info!(exit = ?report.exit, tasks = report.records.len(), "round finished");
        Ok(report)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<Option<RoundAbort>> {
        match command {
            CoreCommand::DispatchTasks(tasks) => self.spawn_ready(tasks).await?,
            CoreCommand::CancelTasks(tasks) => self.cancel(&tasks),
            CoreCommand::AbortRound(abort) => return Ok(Some(abort)),
            CoreCommand::FinishRound(exit) => debug!(?exit, "core finished the round"),
        }
        Ok(None)
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let ids: Vec<_> = tasks.iter().map(|t| t.id).collect();
        debug!(?ids, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }

    fn cancel(&mut self, tasks: &[TaskId]) {
        if tasks.is_empty() {
            return;
        }
        info!(?tasks, "cancelling in-flight tasks");
        self.executor.cancel_tasks(tasks);
    }
}

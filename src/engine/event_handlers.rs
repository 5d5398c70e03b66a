// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, error, warn};

use crate::dag::{GraphError, RoundExit, ScheduledTask, Scheduler, SchedulerStep, TaskId, TaskSpec};
use crate::errors::FetchdagError;
use crate::exec::ToolError;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Cancel these in-flight tool calls.
    CancelTasks(Vec<TaskId>),
    /// The round cannot continue.
    AbortRound(RoundAbort),
    /// The round ended normally or early.
    FinishRound(RoundExit),
}

/// Why a round was aborted.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundAbort {
    Graph(GraphError),
    Planner(String),
}

impl From<RoundAbort> for FetchdagError {
    fn from(abort: RoundAbort) -> Self {
        match abort {
            RoundAbort::Graph(e) => FetchdagError::Graph(e),
            RoundAbort::Planner(msg) => FetchdagError::Planner(msg),
        }
    }
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    fn from_scheduler(scheduler: &Scheduler, step: SchedulerStep) -> Self {
        let mut commands = Vec::new();

        if !step.cancelled.is_empty() {
            commands.push(CoreCommand::CancelTasks(step.cancelled));
        }
        if !step.newly_scheduled.is_empty() {
            commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
        }
        if step.round_finished {
            commands.push(CoreCommand::FinishRound(
                scheduler.exit().unwrap_or(RoundExit::Completed),
            ));
        }

        Self {
            commands,
            keep_running: !step.round_finished,
        }
    }

    fn abort(scheduler: &mut Scheduler, abort: RoundAbort) -> Self {
        let cancelled = scheduler.abort();
        let mut commands = Vec::new();
        if !cancelled.is_empty() {
            commands.push(CoreCommand::CancelTasks(cancelled));
        }
        commands.push(CoreCommand::AbortRound(abort));
        Self {
            commands,
            keep_running: false,
        }
    }
}

/// Handle a task spec from the planner stream.
pub fn handle_task_planned(scheduler: &mut Scheduler, spec: TaskSpec) -> CoreStep {
    match scheduler.handle_planned(spec) {
        Ok(step) => CoreStep::from_scheduler(scheduler, step),
        Err(e) => {
            error!(error = %e, "structural plan error; aborting round");
            CoreStep::abort(scheduler, RoundAbort::Graph(e))
        }
    }
}

/// Handle the planner's stream-closed signal.
pub fn handle_plan_closed(scheduler: &mut Scheduler) -> CoreStep {
    match scheduler.handle_stream_closed() {
        Ok(step) => CoreStep::from_scheduler(scheduler, step),
        Err(e) => {
            error!(error = %e, "structural plan error at stream close; aborting round");
            CoreStep::abort(scheduler, RoundAbort::Graph(e))
        }
    }
}

/// Handle a planner failure.
pub fn handle_plan_failed(scheduler: &mut Scheduler, message: String) -> CoreStep {
    if scheduler.is_finished() {
        warn!(error = %message, "planner failed after the round ended; ignoring");
        return CoreStep {
            commands: Vec::new(),
            keep_running: false,
        };
    }
    error!(error = %message, "planner failed; aborting round");
    CoreStep::abort(scheduler, RoundAbort::Planner(message))
}

/// Handle a tool completion.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    task: TaskId,
    outcome: Result<serde_json::Value, ToolError>,
) -> CoreStep {
    let step = scheduler.handle_completion(task, outcome);
    debug!(
        task,
        running = scheduler.running_count(),
        limit = scheduler.max_concurrency(),
        "completion handled"
    );
    CoreStep::from_scheduler(scheduler, step)
}

/// Handle an external cancel request.
pub fn handle_cancel(scheduler: &mut Scheduler) -> CoreStep {
    let step = scheduler.cancel();
    CoreStep::from_scheduler(scheduler, step)
}

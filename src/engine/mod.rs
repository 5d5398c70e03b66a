// src/engine/mod.rs

//! Round execution engine.
//!
//! This module ties together:
//! - the task scheduler (Task Fetching Unit)
//! - the main runtime event loop that reacts to:
//!   - task specs streamed in by the planner
//!   - the planner's stream-closed / failure signals
//!   - tool completion events from the executor
//!   - cancellation requests
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use serde::Serialize;
use serde_json::Value;

use crate::dag::{RoundExit, TaskId, TaskRecord, TaskSpec};
use crate::exec::ToolError;

/// Events flowing into the runtime from the planner, executors, etc.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// The planner produced another task.
    TaskPlanned(TaskSpec),
    /// The planner stream ended normally.
    PlanClosed,
    /// The planner failed before closing its stream.
    PlanFailed(String),
    /// A tool call finished.
    TaskCompleted {
        task: TaskId,
        outcome: Result<Value, ToolError>,
    },
    /// Stop the round early (e.g. Ctrl-C).
    CancelRequested,
}

/// Final state of one round, handed to the joiner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundReport {
    pub exit: RoundExit,
    /// Terminal outcome of every tool task, ordered by id.
    pub records: Vec<TaskRecord>,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use self::core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep, RoundAbort};
pub use runtime::Runtime;

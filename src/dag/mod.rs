// src/dag/mod.rs

//! Task graph and scheduling.
//!
//! - [`task`] defines task specs, states, outcomes and scheduled tasks.
//! - [`placeholder`] finds and substitutes `$N` references in arguments.
//! - [`graph`] holds the incrementally built, index-addressed task graph.
//! - [`state_manager`] re-evaluates readiness and propagates failures.
//! - [`scheduler`] contains the per-round state machine (the Task Fetching
//!   Unit) that decides what runs next.
//! - [`scheduler_step`] defines the result type for scheduler steps.

pub mod graph;
pub mod placeholder;
pub mod scheduler;
pub mod scheduler_step;
pub mod state_manager;
pub mod task;

pub use graph::{GraphError, TaskGraph, Transition};
pub use scheduler::Scheduler;
pub use scheduler_step::{RoundExit, SchedulerStep};
pub use task::{
    JOIN_TOOL, ScheduledTask, SkipReason, TaskId, TaskNode, TaskOutcome, TaskRecord, TaskSpec,
    TaskState,
};

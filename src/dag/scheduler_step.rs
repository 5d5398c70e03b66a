// src/dag/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use serde::Serialize;

use crate::dag::task::{ScheduledTask, TaskId};

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoundExit {
    /// Stream closed and every task reached a terminal state.
    Completed,
    /// The join sentinel fired before every task finished.
    JoinReached { sentinel: TaskId },
    /// An external cancel request ended the round.
    Cancelled,
    /// A structural error ended the round.
    Aborted,
}

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the graph and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks moved to Running in this step, with resolved arguments.
    pub newly_scheduled: Vec<ScheduledTask>,
    /// Tasks newly marked Skipped (upstream failure or early exit).
    pub newly_skipped: Vec<TaskId>,
    /// Running tasks whose in-flight tool calls should be cancelled.
    pub cancelled: Vec<TaskId>,
    /// Whether this step ended the round.
    pub round_finished: bool,
}

impl SchedulerStep {
    pub fn is_empty(&self) -> bool {
        self.newly_scheduled.is_empty()
            && self.newly_skipped.is_empty()
            && self.cancelled.is_empty()
            && !self.round_finished
    }
}

// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from the channel
//! - handing `ScheduledTask`s to the executor and cancelling them
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels, or tools.

use crate::dag::Scheduler;
use crate::engine::event_handlers::{
    CoreStep, handle_cancel, handle_plan_closed, handle_plan_failed, handle_task_completion,
    handle_task_planned,
};
use crate::engine::{RoundReport, RuntimeEvent};
use crate::dag::RoundExit;

/// Pure core runtime state for one round.
///
/// It owns the scheduler and has **no** channels, no Tokio types, and does
/// not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::TaskPlanned(spec) => handle_task_planned(&mut self.scheduler, spec),
            RuntimeEvent::PlanClosed => handle_plan_closed(&mut self.scheduler),
            RuntimeEvent::PlanFailed(message) => handle_plan_failed(&mut self.scheduler, message),
            RuntimeEvent::TaskCompleted { task, outcome } => {
                handle_task_completion(&mut self.scheduler, task, outcome)
            }
            RuntimeEvent::CancelRequested => handle_cancel(&mut self.scheduler),
        }
    }

    /// Snapshot of the round for the joiner.
    pub fn report(&self) -> RoundReport {
        RoundReport {
            exit: self.scheduler.exit().unwrap_or(RoundExit::Completed),
            records: self.scheduler.report(),
        }
    }
}

// src/dag/state_manager.rs

//! Readiness re-evaluation and failure propagation.
//!
//! Both operations only touch the local neighbourhood of the task that
//! changed (its direct dependents, and transitively their dependents when
//! skipping), never the whole graph.

use tracing::{debug, warn};

use crate::dag::graph::{TaskGraph, Transition};
use crate::dag::task::{SkipReason, TaskId, TaskState};

/// Result of re-evaluating a single Pending task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Still waiting, or not Pending at all.
    Unchanged,
    /// Every dependency is Done; the task is now Ready.
    Ready,
    /// A dependency failed; these tasks (the evaluated one first) were
    /// marked Skipped.
    Skipped(Vec<TaskId>),
    /// A join sentinel whose dependencies are all terminal.
    JoinReached,
}

/// Applies per-round state transitions on behalf of the scheduler.
pub struct StateManager<'a> {
    graph: &'a mut TaskGraph,
}

impl<'a> StateManager<'a> {
    pub fn new(graph: &'a mut TaskGraph) -> Self {
        Self { graph }
    }

    /// Re-evaluate a Pending task after one of its dependencies changed (or
    /// right after it was declared).
    pub fn evaluate(&mut self, id: TaskId) -> Evaluation {
        let Some(node) = self.graph.task(id) else {
            warn!(task = id, "evaluated task is not in the graph");
            return Evaluation::Unchanged;
        };
        if node.state() != TaskState::Pending {
            return Evaluation::Unchanged;
        }

        if node.is_join() {
            return if self.graph.deps_terminal(id) {
                Evaluation::JoinReached
            } else {
                Evaluation::Unchanged
            };
        }

        let failed_dep = node.deps.iter().copied().find(|d| {
            matches!(
                self.graph.state_of(*d),
                Some(TaskState::Failed) | Some(TaskState::Skipped)
            )
        });

        if let Some(dependency) = failed_dep {
            let mut skipped = Vec::new();
            if self.skip(id, SkipReason::UpstreamFailed { dependency }) {
                skipped.push(id);
                skipped.extend(self.mark_dependents_skipped(id));
            }
            return Evaluation::Skipped(skipped);
        }

        if self.graph.deps_satisfied(id) {
            if let Err(e) = self.graph.mark(id, Transition::Ready) {
                warn!(task = id, error = %e, "could not mark task Ready");
                return Evaluation::Unchanged;
            }
            debug!(task = id, "dependencies done; task is Ready");
            return Evaluation::Ready;
        }

        Evaluation::Unchanged
    }

    /// Mark every Pending/Ready task that transitively depends on
    /// `failed_task` as Skipped.
    ///
    /// Join sentinels are never skipped. Returns the newly skipped tasks
    /// (excluding `failed_task` itself).
    pub fn mark_dependents_skipped(&mut self, failed_task: TaskId) -> Vec<TaskId> {
        let mut stack: Vec<(TaskId, TaskId)> = self
            .graph
            .dependents_of(failed_task)
            .iter()
            .map(|&d| (d, failed_task))
            .collect();

        let mut newly_skipped = Vec::new();

        while let Some((id, upstream)) = stack.pop() {
            let Some(node) = self.graph.task(id) else {
                continue;
            };
            if node.is_join() {
                continue;
            }
            if !matches!(node.state(), TaskState::Pending | TaskState::Ready) {
                continue;
            }

            if self.skip(id, SkipReason::UpstreamFailed { dependency: upstream }) {
                newly_skipped.push(id);
                stack.extend(self.graph.dependents_of(id).iter().map(|&d| (d, id)));
            }
        }

        newly_skipped
    }

    fn skip(&mut self, id: TaskId, reason: SkipReason) -> bool {
        match self.graph.mark(id, Transition::Skipped(reason)) {
            Ok(_) => {
                debug!(task = id, ?reason, "task skipped");
                true
            }
            Err(e) => {
                warn!(task = id, error = %e, "could not mark task Skipped");
                false
            }
        }
    }
}

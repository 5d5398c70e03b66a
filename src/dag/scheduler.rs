// src/dag/scheduler.rs

use std::collections::{BTreeMap, VecDeque};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::dag::graph::{GraphError, TaskGraph, Transition};
use crate::dag::placeholder;
use crate::dag::scheduler_step::{RoundExit, SchedulerStep};
use crate::dag::state_manager::{Evaluation, StateManager};
use crate::dag::task::{
    ScheduledTask, SkipReason, TaskId, TaskRecord, TaskSpec, TaskState,
};
use crate::exec::ToolError;

/// Task Fetching Unit state machine for one planning round.
///
/// It owns the round's [`TaskGraph`] and is responsible for:
/// - growing the graph as task specs stream in from the planner
/// - moving tasks to Ready as soon as their dependencies are Done
/// - dispatching Ready tasks while fewer than `max_concurrency` are Running,
///   substituting placeholders at dispatch time
/// - recording results and errors, and skipping dependents of failures
/// - ending the round when the stream is closed and every task is terminal,
///   when the join sentinel fires, or on cancel
///
/// The scheduler is synchronous and performs no IO; the engine feeds it
/// events and executes the tasks it hands back.
#[derive(Debug)]
pub struct Scheduler {
    graph: TaskGraph,
    /// Ready tasks in the order they became ready.
    ready: VecDeque<TaskId>,
    running: usize,
    max_concurrency: usize,
    /// Join sentinels declared so far.
    joins: Vec<TaskId>,
    exit: Option<RoundExit>,
}

impl Scheduler {
    pub fn new(max_concurrency: usize) -> Self {
        Self::with_graph(TaskGraph::new(), max_concurrency)
    }

    /// A scheduler whose tasks may reference these earlier-round results.
    pub fn with_carried_results(
        max_concurrency: usize,
        carried: BTreeMap<TaskId, Value>,
    ) -> Self {
        Self::with_graph(TaskGraph::with_carried_results(carried), max_concurrency)
    }

    fn with_graph(graph: TaskGraph, max_concurrency: usize) -> Self {
        Self {
            graph,
            ready: VecDeque::new(),
            running: 0,
            max_concurrency: max_concurrency.max(1),
            joins: Vec::new(),
            exit: None,
        }
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn state_of(&self, task: TaskId) -> Option<TaskState> {
        self.graph.state_of(task)
    }

    /// Whether every dependency of `task` is Done.
    pub fn deps_satisfied(&self, task: TaskId) -> bool {
        self.graph.deps_satisfied(task)
    }

    pub fn running_count(&self) -> usize {
        self.running
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Whether the round has ended (for any reason).
    pub fn is_finished(&self) -> bool {
        self.exit.is_some()
    }

    pub fn exit(&self) -> Option<RoundExit> {
        self.exit
    }

    /// A task spec arrived from the planner stream.
    pub fn handle_planned(&mut self, spec: TaskSpec) -> Result<SchedulerStep, GraphError> {
        let mut step = SchedulerStep::default();
        if self.exit.is_some() {
            debug!(task = spec.id, "round already finished; ignoring planned task");
            return Ok(step);
        }

        let id = spec.id;
        let is_join = spec.is_join();
        debug!(task = id, tool = %spec.tool, "task planned");
        self.graph.add_task(spec)?;

        if is_join {
            self.joins.push(id);
        } else {
            self.apply_evaluation(id, &mut step);
        }

        self.settle(&mut step);
        Ok(step)
    }

    /// The planner stream signalled completion.
    pub fn handle_stream_closed(&mut self) -> Result<SchedulerStep, GraphError> {
        let mut step = SchedulerStep::default();
        if self.exit.is_some() {
            return Ok(step);
        }

        debug!(tasks = self.graph.len(), "planner stream closed");
        self.graph.close()?;
        self.settle(&mut step);
        Ok(step)
    }

    /// A tool call finished.
    ///
    /// Results for tasks that are not Running (cancelled, or the round has
    /// already ended) are discarded.
    pub fn handle_completion(
        &mut self,
        task: TaskId,
        outcome: Result<Value, ToolError>,
    ) -> SchedulerStep {
        let mut step = SchedulerStep::default();

        if self.exit.is_some() || self.graph.state_of(task) != Some(TaskState::Running) {
            debug!(task, "discarding result for task that is no longer running");
            return step;
        }
        self.running = self.running.saturating_sub(1);

        match outcome {
            Ok(result) => {
                if let Err(e) = self.graph.mark(task, Transition::Done(result)) {
                    warn!(task, error = %e, "could not record task result");
                }
                debug!(task, "task done");

                let dependents = self.graph.dependents_of(task).to_vec();
                for dependent in dependents {
                    self.apply_evaluation(dependent, &mut step);
                }
            }
            Err(error) => {
                warn!(task, error = %error, "task failed; skipping dependents");
                if let Err(e) = self.graph.mark(task, Transition::Failed(error)) {
                    warn!(task, error = %e, "could not record task failure");
                }
                let mut manager = StateManager::new(&mut self.graph);
                step.newly_skipped.extend(manager.mark_dependents_skipped(task));
            }
        }

        self.settle(&mut step);
        step
    }

    /// External early exit: stop dispatching and cancel everything live.
    pub fn cancel(&mut self) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.exit.is_some() {
            return step;
        }
        info!("round cancelled; skipping remaining tasks");
        self.exit_early(RoundExit::Cancelled, &mut step);
        step
    }

    /// End the round after a structural error. Returns the Running tasks
    /// whose tool calls should be cancelled.
    pub fn abort(&mut self) -> Vec<TaskId> {
        let mut step = SchedulerStep::default();
        if self.exit.is_none() {
            self.exit_early(RoundExit::Aborted, &mut step);
        }
        step.cancelled
    }

    /// Tool tasks whose dependencies are all Done but that are not running
    /// yet, in the order they will be dispatched.
    pub fn ready_set(&self) -> Vec<TaskId> {
        let mut ready: Vec<TaskId> = self
            .ready
            .iter()
            .copied()
            .filter(|&id| self.graph.state_of(id) == Some(TaskState::Ready))
            .collect();
        for id in self.graph.ready_set() {
            if !ready.contains(&id) {
                ready.push(id);
            }
        }
        ready
    }

    /// Terminal outcomes of every tool task, ordered by id.
    pub fn report(&self) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self
            .graph
            .tasks()
            .filter(|n| !n.is_join())
            .filter_map(|n| {
                let outcome = n.outcome()?;
                Some(TaskRecord {
                    id: n.id,
                    tool: n.tool.clone(),
                    args: n.resolved_args().cloned().unwrap_or_else(|| n.args.clone()),
                    outcome,
                })
            })
            .collect();
        records.sort_by_key(|r| r.id);
        records
    }

    fn apply_evaluation(&mut self, task: TaskId, step: &mut SchedulerStep) {
        let mut manager = StateManager::new(&mut self.graph);
        match manager.evaluate(task) {
            Evaluation::Ready => self.ready.push_back(task),
            Evaluation::Skipped(ids) => step.newly_skipped.extend(ids),
            // Join sentinels are picked up in `settle`.
            Evaluation::JoinReached | Evaluation::Unchanged => {}
        }
    }

    /// Fire join sentinels, fill free slots, and detect the end of the round.
    fn settle(&mut self, step: &mut SchedulerStep) {
        if self.fire_join(step) {
            return;
        }
        self.dispatch(step);
        if self.fire_join(step) {
            return;
        }

        if self.graph.is_closed() && self.graph.all_terminal() {
            info!(tasks = self.graph.len(), "all tasks terminal; round complete");
            self.exit = Some(RoundExit::Completed);
            step.round_finished = true;
        }
    }

    fn fire_join(&mut self, step: &mut SchedulerStep) -> bool {
        let sentinel = self.joins.iter().copied().find(|&j| {
            self.graph.state_of(j) == Some(TaskState::Pending) && self.graph.deps_terminal(j)
        });
        let Some(sentinel) = sentinel else {
            return false;
        };

        if let Err(e) = self.graph.mark(sentinel, Transition::Done(Value::Null)) {
            warn!(task = sentinel, error = %e, "could not complete join sentinel");
            return false;
        }
        info!(task = sentinel, "join sentinel reached; ending round early");
        self.exit_early(RoundExit::JoinReached { sentinel }, step);
        true
    }

    fn dispatch(&mut self, step: &mut SchedulerStep) {
        while self.running < self.max_concurrency {
            let Some(id) = self.ready.pop_front() else {
                break;
            };
            let Some(node) = self.graph.task(id) else {
                continue;
            };
            if node.state() != TaskState::Ready {
                continue;
            }

            let tool = node.tool.clone();
            let graph = &self.graph;
            let resolved = placeholder::substitute(&node.args, move |d| {
                node.carried.get(&d).or_else(|| graph.result_of(d))
            });

            match resolved {
                Ok(args) => {
                    let running = Transition::Running {
                        resolved_args: args.clone(),
                    };
                    if let Err(e) = self.graph.mark(id, running) {
                        warn!(task = id, error = %e, "could not mark task Running");
                        continue;
                    }
                    self.running += 1;
                    info!(task = id, tool = %tool, "dispatching task");
                    step.newly_scheduled.push(ScheduledTask { id, tool, args });
                }
                Err(reference) => {
                    warn!(task = id, reference, "placeholder could not be resolved");
                    let error = ToolError::Unresolved { reference };
                    if let Err(e) = self.graph.mark(id, Transition::Failed(error)) {
                        warn!(task = id, error = %e, "could not record task failure");
                    }
                    let mut manager = StateManager::new(&mut self.graph);
                    step.newly_skipped.extend(manager.mark_dependents_skipped(id));
                }
            }
        }
    }

    fn exit_early(&mut self, exit: RoundExit, step: &mut SchedulerStep) {
        let live: Vec<(TaskId, TaskState)> = self
            .graph
            .tasks()
            .filter(|n| !n.state().is_terminal())
            .map(|n| (n.id, n.state()))
            .collect();

        for (id, state) in live {
            if state == TaskState::Running {
                step.cancelled.push(id);
            }
            match self.graph.mark(id, Transition::Skipped(SkipReason::Cancelled)) {
                Ok(_) => step.newly_skipped.push(id),
                Err(e) => warn!(task = id, error = %e, "could not cancel task"),
            }
        }

        self.ready.clear();
        self.running = 0;
        self.exit = Some(exit);
        step.round_finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn task(id: TaskId, args: Value) -> TaskSpec {
        TaskSpec::new(id, "echo").with_args(args)
    }

    fn ids(step: &SchedulerStep) -> Vec<TaskId> {
        step.newly_scheduled.iter().map(|t| t.id).collect()
    }

    #[test]
    fn independent_task_is_dispatched_before_stream_closes() {
        let mut s = Scheduler::new(4);
        let step = s.handle_planned(task(1, json!({"q": "a"}))).unwrap();
        assert_eq!(ids(&step), vec![1]);
        assert_eq!(s.state_of(1), Some(TaskState::Running));
        assert!(!s.is_finished());
    }

    #[test]
    fn concurrency_bound_holds_tasks_in_ready() {
        let mut s = Scheduler::new(1);
        assert_eq!(ids(&s.handle_planned(task(1, json!({}))).unwrap()), vec![1]);
        assert!(ids(&s.handle_planned(task(2, json!({}))).unwrap()).is_empty());
        assert_eq!(s.state_of(2), Some(TaskState::Ready));

        let step = s.handle_completion(1, Ok(json!("one")));
        assert_eq!(ids(&step), vec![2]);
        assert_eq!(s.running_count(), 1);
    }

    #[test]
    fn stale_completion_is_discarded() {
        let mut s = Scheduler::new(2);
        s.handle_planned(task(1, json!({}))).unwrap();
        s.handle_completion(1, Ok(json!("a")));
        let step = s.handle_completion(1, Ok(json!("b")));
        assert!(step.is_empty());
        assert_eq!(s.graph().result_of(1), Some(&json!("a")));
    }

    #[test]
    fn empty_plan_finishes_on_close() {
        let mut s = Scheduler::new(2);
        let step = s.handle_stream_closed().unwrap();
        assert!(step.round_finished);
        assert_eq!(s.exit(), Some(RoundExit::Completed));
    }

    #[test]
    fn join_sentinel_cancels_unfinished_work() {
        let mut s = Scheduler::new(4);
        s.handle_planned(task(1, json!({}))).unwrap();
        s.handle_planned(task(2, json!({}))).unwrap();
        s.handle_planned(TaskSpec::new(3, "join").with_deps([1])).unwrap();

        let step = s.handle_completion(1, Ok(json!("enough")));
        assert!(step.round_finished);
        assert_eq!(step.cancelled, vec![2]);
        assert_eq!(s.exit(), Some(RoundExit::JoinReached { sentinel: 3 }));
        assert_eq!(s.state_of(2), Some(TaskState::Skipped));

        // The late result of the cancelled call is dropped.
        s.handle_completion(2, Ok(json!("late")));
        assert!(s.graph().result_of(2).is_none());
    }

    #[test]
    fn cancel_marks_everything_live_as_skipped() {
        let mut s = Scheduler::new(4);
        s.handle_planned(task(1, json!({}))).unwrap();
        s.handle_planned(task(2, json!({"x": "$1"}))).unwrap();
        let step = s.cancel();
        assert_eq!(step.cancelled, vec![1]);
        assert_eq!(step.newly_skipped, vec![1, 2]);
        assert_eq!(s.exit(), Some(RoundExit::Cancelled));
    }
}

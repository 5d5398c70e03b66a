// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use serde_json::Value;
use thiserror::Error;

use crate::dag::placeholder;
use crate::dag::task::{SkipReason, TaskId, TaskNode, TaskSpec, TaskState};
use crate::exec::ToolError;

/// Structural errors in a plan. Any of these aborts the round.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("cyclic dependency between tasks {members:?}")]
    CyclicDependency { members: Vec<TaskId> },

    #[error("task {task} references task {missing}, which was never declared")]
    DanglingReference { task: TaskId, missing: TaskId },

    #[error("task {task} references itself")]
    SelfReference { task: TaskId },

    #[error("task {task} declared more than once in this round")]
    DuplicateTask { task: TaskId },

    #[error("unknown task {task}")]
    UnknownTask { task: TaskId },

    #[error("illegal state transition for task {task}: {from:?} -> {to:?}")]
    InvalidTransition {
        task: TaskId,
        from: TaskState,
        to: TaskState,
    },
}

/// A state change applied through [`TaskGraph::mark`].
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Ready,
    Running { resolved_args: Value },
    Done(Value),
    Failed(ToolError),
    Skipped(SkipReason),
}

impl Transition {
    fn target(&self) -> TaskState {
        match self {
            Transition::Ready => TaskState::Ready,
            Transition::Running { .. } => TaskState::Running,
            Transition::Done(_) => TaskState::Done,
            Transition::Failed(_) => TaskState::Failed,
            Transition::Skipped(_) => TaskState::Skipped,
        }
    }
}

/// Task graph for a single planning round.
///
/// Tasks live in an arena (`nodes`) addressed through an id index; edges are
/// id sets on each node, so there is no shared ownership between tasks.
/// The graph grows one task at a time while the planner stream is open:
/// a dependency on a not-yet-declared id is parked in `forward` until that
/// id arrives, and becomes a [`GraphError::DanglingReference`] if the stream
/// closes first.
///
/// Ids that are not declared in this round may also name a Done result from
/// an earlier round (`carried`). Such a reference is resolved immediately
/// and adds no edge, unless the id was already declared in this round.
#[derive(Debug, Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<TaskId, usize>,
    /// Results of earlier rounds, by id.
    carried: BTreeMap<TaskId, Value>,
    /// Undeclared id -> tasks already waiting on it.
    forward: BTreeMap<TaskId, Vec<TaskId>>,
    /// Edge direction: dep -> task.
    edges: DiGraphMap<TaskId, ()>,
    closed: bool,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// A graph whose undeclared references may resolve to these results.
    pub fn with_carried_results(carried: BTreeMap<TaskId, Value>) -> Self {
        Self {
            carried,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the planner stream has signalled completion.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.index.contains_key(&id)
    }

    pub fn task(&self, id: TaskId) -> Option<&TaskNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    fn task_mut(&mut self, id: TaskId) -> Option<&mut TaskNode> {
        self.index.get(&id).map(|&i| &mut self.nodes[i])
    }

    /// All tasks in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.iter()
    }

    pub fn state_of(&self, id: TaskId) -> Option<TaskState> {
        self.task(id).map(TaskNode::state)
    }

    pub fn result_of(&self, id: TaskId) -> Option<&Value> {
        self.task(id).and_then(TaskNode::result)
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.task(id).into_iter().flat_map(|n| n.deps.iter().copied())
    }

    /// Immediate dependents of a task known so far.
    pub fn dependents_of(&self, id: TaskId) -> &[TaskId] {
        self.task(id).map(|n| n.dependents.as_slice()).unwrap_or(&[])
    }

    /// Register a task from the planner stream.
    ///
    /// Dependencies are the placeholder references in `args` plus the
    /// explicit `deps`. A join sentinel without dependencies waits on every
    /// task declared before it. Forward references are accepted until
    /// [`close`](Self::close) is called.
    pub fn add_task(&mut self, spec: TaskSpec) -> Result<(), GraphError> {
        let id = spec.id;
        if self.index.contains_key(&id) {
            return Err(GraphError::DuplicateTask { task: id });
        }

        let mut deps: BTreeSet<TaskId> = placeholder::references(&spec.args);
        deps.extend(spec.deps.iter().copied());
        if spec.is_join() && deps.is_empty() {
            deps.extend(self.nodes.iter().map(|n| n.id));
        }

        if deps.contains(&id) {
            return Err(GraphError::SelfReference { task: id });
        }

        let carried: BTreeMap<TaskId, Value> = deps
            .iter()
            .filter(|d| !self.index.contains_key(d))
            .filter_map(|&d| self.carried.get(&d).map(|v| (d, v.clone())))
            .collect();
        deps.retain(|d| !carried.contains_key(d));

        if self.closed {
            if let Some(&missing) = deps.iter().find(|d| !self.index.contains_key(d)) {
                return Err(GraphError::DanglingReference { task: id, missing });
            }
        }

        self.edges.add_node(id);
        for &dep in &deps {
            match self.index.get(&dep) {
                Some(&i) => self.nodes[i].dependents.push(id),
                None => self.forward.entry(dep).or_default().push(id),
            }
            self.edges.add_edge(dep, id, ());
        }

        let mut node = TaskNode::new(spec, deps);
        node.carried = carried;
        if let Some(waiting) = self.forward.remove(&id) {
            node.dependents = waiting;
        }

        self.index.insert(id, self.nodes.len());
        self.nodes.push(node);

        self.detect_cycle()
    }

    /// Mark the planner stream as closed and validate the finished graph.
    pub fn close(&mut self) -> Result<(), GraphError> {
        self.closed = true;

        if let Some((&missing, waiting)) = self.forward.iter().next() {
            let task = waiting.first().copied().unwrap_or(missing);
            return Err(GraphError::DanglingReference { task, missing });
        }

        self.detect_cycle()
    }

    /// Fail with the members of the first dependency cycle found, if any.
    pub fn detect_cycle(&self) -> Result<(), GraphError> {
        for mut scc in tarjan_scc(&self.edges) {
            if scc.len() > 1 {
                scc.sort_unstable();
                return Err(GraphError::CyclicDependency { members: scc });
            }
        }
        Ok(())
    }

    /// Whether every dependency of `id` is declared and Done.
    pub fn deps_satisfied(&self, id: TaskId) -> bool {
        let Some(node) = self.task(id) else {
            return false;
        };
        node.deps
            .iter()
            .all(|d| self.state_of(*d) == Some(TaskState::Done))
    }

    /// Whether every dependency of `id` is declared and terminal.
    pub fn deps_terminal(&self, id: TaskId) -> bool {
        let Some(node) = self.task(id) else {
            return false;
        };
        node.deps
            .iter()
            .all(|d| self.state_of(*d).is_some_and(TaskState::is_terminal))
    }

    /// Pending tool tasks whose dependencies are all Done.
    pub fn ready_set(&self) -> Vec<TaskId> {
        self.nodes
            .iter()
            .filter(|n| n.state == TaskState::Pending && !n.is_join() && self.deps_satisfied(n.id))
            .map(|n| n.id)
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.nodes.iter().all(|n| n.state.is_terminal())
    }

    /// Apply a state transition atomically, together with its payload.
    ///
    /// Returns the previous state. Has no side effects on other tasks.
    pub fn mark(&mut self, id: TaskId, transition: Transition) -> Result<TaskState, GraphError> {
        let node = self
            .task_mut(id)
            .ok_or(GraphError::UnknownTask { task: id })?;
        let from = node.state;
        let to = transition.target();

        let legal = matches!(
            (from, to),
            (TaskState::Pending, TaskState::Ready)
                | (TaskState::Pending, TaskState::Skipped)
                | (TaskState::Ready, TaskState::Running)
                | (TaskState::Ready, TaskState::Failed)
                | (TaskState::Ready, TaskState::Skipped)
                | (TaskState::Running, TaskState::Done)
                | (TaskState::Running, TaskState::Failed)
                | (TaskState::Running, TaskState::Skipped)
        ) || (from == TaskState::Pending && to == TaskState::Done && node.is_join());

        if !legal {
            return Err(GraphError::InvalidTransition { task: id, from, to });
        }

        match transition {
            Transition::Ready => {}
            Transition::Running { resolved_args } => node.resolved_args = Some(resolved_args),
            Transition::Done(result) => node.result = Some(result),
            Transition::Failed(error) => node.error = Some(error),
            Transition::Skipped(reason) => node.skip_reason = Some(reason),
        }
        node.state = to;

        Ok(from)
    }
}

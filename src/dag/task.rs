// src/dag/task.rs

//! Task data model: the planner-facing specification, the per-round node
//! stored in the graph, and the records handed to the joiner.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::exec::ToolError;

/// Task identifier, unique within a single planning round.
pub type TaskId = u32;

/// Tool reference that marks the join sentinel.
pub const JOIN_TOOL: &str = "join";

/// A task as produced by the planner.
///
/// `args` may contain `$N` / `${N}` placeholders anywhere inside its strings.
/// `deps` lists explicit ordering dependencies on top of what the
/// placeholders imply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub tool: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub deps: Vec<TaskId>,
}

impl TaskSpec {
    pub fn new(id: TaskId, tool: impl Into<String>) -> Self {
        Self {
            id,
            tool: tool.into(),
            args: Value::Object(Default::default()),
            deps: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_deps(mut self, deps: impl IntoIterator<Item = TaskId>) -> Self {
        self.deps.extend(deps);
        self
    }

    /// Whether this spec is the join sentinel rather than a tool call.
    pub fn is_join(&self) -> bool {
        self.tool == JOIN_TOOL
    }
}

/// Lifecycle state of a task within one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Declared, waiting on at least one dependency.
    Pending,
    /// All dependencies are Done; waiting for a free executor slot.
    Ready,
    /// Dispatched to a tool; the only "in flight" state.
    Running,
    Done,
    Failed,
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed | TaskState::Skipped)
    }
}

/// Why a task was skipped instead of run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A direct dependency failed or was itself skipped.
    UpstreamFailed { dependency: TaskId },
    /// The round exited early (join sentinel or external cancel).
    Cancelled,
}

/// Terminal outcome of a task, as reported to the joiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Done { result: Value },
    Failed { error: String },
    Skipped { reason: SkipReason },
}

impl TaskOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, TaskOutcome::Done { .. })
    }
}

/// A task node stored in the graph arena.
///
/// State and outcome fields are only mutated through
/// [`TaskGraph::mark`](crate::dag::TaskGraph::mark), which keeps `result`
/// present iff Done and `error` present iff Failed.
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub id: TaskId,
    pub tool: String,
    pub args: Value,
    /// Placeholder references plus explicit deps declared in this round.
    pub deps: BTreeSet<TaskId>,
    /// References satisfied by earlier rounds' results.
    pub carried: BTreeMap<TaskId, Value>,
    /// Direct dependents known so far.
    pub dependents: Vec<TaskId>,
    pub(crate) state: TaskState,
    pub(crate) resolved_args: Option<Value>,
    pub(crate) result: Option<Value>,
    pub(crate) error: Option<ToolError>,
    pub(crate) skip_reason: Option<SkipReason>,
}

impl TaskNode {
    pub(crate) fn new(spec: TaskSpec, deps: BTreeSet<TaskId>) -> Self {
        Self {
            id: spec.id,
            tool: spec.tool,
            args: spec.args,
            deps,
            carried: BTreeMap::new(),
            dependents: Vec::new(),
            state: TaskState::Pending,
            resolved_args: None,
            result: None,
            error: None,
            skip_reason: None,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn is_join(&self) -> bool {
        self.tool == JOIN_TOOL
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&ToolError> {
        self.error.as_ref()
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        self.skip_reason
    }

    /// Arguments after placeholder substitution (set at dispatch).
    pub fn resolved_args(&self) -> Option<&Value> {
        self.resolved_args.as_ref()
    }

    /// Terminal outcome, or `None` while the task is still live.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        match self.state {
            TaskState::Done => Some(TaskOutcome::Done {
                result: self.result.clone().unwrap_or(Value::Null),
            }),
            TaskState::Failed => Some(TaskOutcome::Failed {
                error: self
                    .error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
            }),
            TaskState::Skipped => Some(TaskOutcome::Skipped {
                reason: self.skip_reason.unwrap_or(SkipReason::Cancelled),
            }),
            TaskState::Pending | TaskState::Ready | TaskState::Running => None,
        }
    }
}

/// A task the scheduler wants the executor to run now.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub tool: String,
    /// Arguments with every placeholder already substituted.
    pub args: Value,
}

/// One entry of the ordered outcome collection given to the joiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub tool: String,
    /// Resolved arguments if the task was dispatched, raw arguments otherwise.
    pub args: Value,
    pub outcome: TaskOutcome,
}

// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning tool calls
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production implementation in [`RegistryExecutor`].

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::dag::{ScheduledTask, TaskId};
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::exec::task_runner::run_task;
use crate::exec::tool::ToolRegistry;

/// Trait abstracting how scheduled tasks are executed.
pub trait ExecutorBackend: Send {
    /// Start the given tasks. Each must eventually produce exactly one
    /// `TaskCompleted` event unless it is cancelled.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Best-effort cancellation of in-flight tasks. Cancelled tasks must not
    /// report a result.
    fn cancel_tasks(&mut self, tasks: &[TaskId]);
}

/// Handle for a tool call that is currently in flight.
struct ActiveTask {
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Production executor: resolves each task's tool in a [`ToolRegistry`] and
/// runs it in its own Tokio task, reporting back over the runtime channel.
///
/// Dropping the executor abandons every call still in flight.
pub struct RegistryExecutor {
    registry: Arc<ToolRegistry>,
    default_timeout: Duration,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    active: HashMap<TaskId, ActiveTask>,
}

impl fmt::Debug for RegistryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryExecutor")
            .field("registry", &self.registry)
            .field("default_timeout", &self.default_timeout)
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RegistryExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        default_timeout: Duration,
        runtime_tx: mpsc::Sender<RuntimeEvent>,
    ) -> Self {
        Self {
            registry,
            default_timeout,
            runtime_tx,
            active: HashMap::new(),
        }
    }

    fn spawn_one(&mut self, task: ScheduledTask) {
        let tool = self.registry.get(&task.tool);
        let timeout = self
            .registry
            .timeout_for(&task.tool)
            .unwrap_or(self.default_timeout);

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let rt_tx = self.runtime_tx.clone();
        let id = task.id;

        let handle = tokio::spawn(async move {
            run_task(task, tool, timeout, rt_tx, cancel_rx).await;
            debug!(task = id, "task runner future finished");
        });

        self.active.insert(
            id,
            ActiveTask {
                cancel: Some(cancel_tx),
                handle,
            },
        );
    }
}

impl ExecutorBackend for RegistryExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.active.retain(|_, t| !t.handle.is_finished());
        for task in tasks {
            self.spawn_one(task);
        }
        Box::pin(async { Ok(()) })
    }

    fn cancel_tasks(&mut self, tasks: &[TaskId]) {
        for id in tasks {
            let Some(active) = self.active.get_mut(id) else {
                continue;
            };
            match active.cancel.take() {
                Some(cancel) => {
                    if cancel.send(()).is_err() {
                        debug!(task = *id, "tool call already finished while cancelling");
                    }
                }
                None => debug!(task = *id, "tool call already cancelled"),
            }
        }
    }
}

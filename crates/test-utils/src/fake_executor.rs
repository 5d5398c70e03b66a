use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use fetchdag::dag::{ScheduledTask, TaskId};
use fetchdag::engine::RuntimeEvent;
use fetchdag::errors::Result;
use fetchdag::exec::{ExecutorBackend, ToolError};
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// A fake executor that:
/// - records which tasks were "run" (with their resolved arguments)
/// - reports `TaskCompleted` right away: failure for tools registered with
///   [`FakeExecutor::failing`], `"<tool>#<id>"` otherwise
/// - never completes tools registered with [`FakeExecutor::hanging`]
/// - records cancellation requests.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<ScheduledTask>>>,
    cancelled: Arc<Mutex<Vec<TaskId>>>,
    failing: HashMap<String, String>,
    hanging: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<ScheduledTask>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            cancelled: Arc::new(Mutex::new(Vec::new())),
            failing: HashMap::new(),
            hanging: HashSet::new(),
        }
    }

    pub fn failing(mut self, tool: &str, message: &str) -> Self {
        self.failing.insert(tool.to_string(), message.to_string());
        self
    }

    pub fn hanging(mut self, tool: &str) -> Self {
        self.hanging.insert(tool.to_string());
        self
    }

    pub fn cancelled(&self) -> Arc<Mutex<Vec<TaskId>>> {
        Arc::clone(&self.cancelled)
    }

    /// Result the fake reports for a successful task.
    pub fn result_for(task: &ScheduledTask) -> Value {
        json!(format!("{}#{}", task.tool, task.id))
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        for t in tasks {
            self.executed.lock().unwrap().push(t.clone());

            if self.hanging.contains(&t.tool) {
                continue;
            }
            let outcome = match self.failing.get(&t.tool) {
                Some(msg) => Err(ToolError::Execution(msg.clone())),
                None => Ok(Self::result_for(&t)),
            };

            // Report from a separate task so a full channel cannot block the
            // runtime that is awaiting us.
            let tx = self.runtime_tx.clone();
            tokio::spawn(async move {
                let _ = tx
                    .send(RuntimeEvent::TaskCompleted {
                        task: t.id,
                        outcome,
                    })
                    .await;
            });
        }
        Box::pin(async { Ok(()) })
    }

    fn cancel_tasks(&mut self, tasks: &[TaskId]) {
        self.cancelled.lock().unwrap().extend_from_slice(tasks);
    }
}

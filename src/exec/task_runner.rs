// src/exec/task_runner.rs

//! Individual tool-call runner.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::exec::tool::{Tool, ToolError};

/// Run a single scheduled task and report its outcome as a
/// `TaskCompleted` event.
///
/// - The call is raced against `timeout`; expiry is reported as
///   [`ToolError::Timeout`].
/// - If the cancel channel fires, the in-flight call is aborted and **no**
///   `TaskCompleted` event is sent for that task.
/// - A tool that panics is reported as [`ToolError::Execution`].
pub async fn run_task(
    task: ScheduledTask,
    tool: Option<Arc<dyn Tool>>,
    timeout: Duration,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let id = task.id;

    let outcome = tokio::select! {
        outcome = invoke_with_timeout(&task, tool, timeout) => outcome,
        cancel = &mut cancel_rx => {
            match cancel {
                Ok(()) => info!(task = id, tool = %task.tool, "cancelling in-flight tool call"),
                Err(_) => debug!(task = id, "executor dropped; abandoning tool call"),
            }
            return;
        }
    };

    match &outcome {
        Ok(_) => info!(task = id, tool = %task.tool, "tool call succeeded"),
        Err(e) => warn!(task = id, tool = %task.tool, error = %e, "tool call failed"),
    }

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted { task: id, outcome })
        .await
        .is_err()
    {
        debug!(task = id, "runtime gone; dropping tool result");
    }
}

async fn invoke_with_timeout(
    task: &ScheduledTask,
    tool: Option<Arc<dyn Tool>>,
    timeout: Duration,
) -> Result<Value, ToolError> {
    let Some(tool) = tool else {
        return Err(ToolError::UnknownTool(task.tool.clone()));
    };

    debug!(task = task.id, tool = %task.tool, args = %task.args, "invoking tool");

    // The call runs in its own task so a panic surfaces as a JoinError.
    // Dropping the set (timeout or cancel) aborts it.
    let args = task.args.clone();
    let mut call = JoinSet::new();
    call.spawn(async move { tool.invoke(args).await });

    match tokio::time::timeout(timeout, call.join_next()).await {
        Ok(Some(Ok(outcome))) => outcome,
        Ok(Some(Err(e))) => Err(ToolError::Execution(describe_join_error(e))),
        Ok(None) => Err(ToolError::Execution("tool call vanished".to_string())),
        Err(_) => Err(ToolError::Timeout(timeout)),
    }
}

/// Human-readable reason for a spawned call that did not return.
pub(crate) fn describe_join_error(e: JoinError) -> String {
    if !e.is_panic() {
        return format!("call aborted: {e}");
    }
    let payload = e.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned());
    match message {
        Some(m) => format!("panicked: {m}"),
        None => "panicked".to_string(),
    }
}

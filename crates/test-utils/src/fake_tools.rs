//! In-process tools for exercising the registry executor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fetchdag::exec::{Tool, ToolError, ToolFuture};
use serde_json::Value;

/// Returns its `input` argument (or the whole payload if there is none).
pub struct EchoTool {
    name: String,
}

impl EchoTool {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

impl Tool for EchoTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "echo(input): returns its input"
    }

    fn invoke(&self, args: Value) -> ToolFuture<'_> {
        let out = args.get("input").cloned().unwrap_or(args);
        Box::pin(async move { Ok(out) })
    }
}

/// Always fails with the given message.
pub struct FailingTool {
    name: String,
    message: String,
}

impl FailingTool {
    pub fn new(name: &str, message: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            message: message.to_string(),
        })
    }
}

impl Tool for FailingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, _args: Value) -> ToolFuture<'_> {
        let message = self.message.clone();
        Box::pin(async move { Err(ToolError::Execution(message)) })
    }
}

/// Sleeps before echoing, and tracks how many calls overlap.
pub struct SlowTool {
    name: String,
    delay: Duration,
    current: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<Value>>,
}

impl SlowTool {
    pub fn new(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            delay,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Highest number of simultaneous calls observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Arguments of every call that started.
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }

    async fn run(&self, args: Value) -> Result<Value, ToolError> {
        self.calls.lock().unwrap().push(args.clone());
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(args.get("input").cloned().unwrap_or(args))
    }
}

impl Tool for SlowTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, args: Value) -> ToolFuture<'_> {
        Box::pin(self.run(args))
    }
}

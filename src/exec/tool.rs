// src/exec/tool.rs

//! Name-keyed tool registry.
//!
//! A tool is any capability `invoke(resolved_args) -> result | error`. The
//! scheduler only ever sees tool *names*; the executor resolves a name to a
//! [`Tool`] once per task through the [`ToolRegistry`].

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::dag::TaskId;

/// Per-task execution error. Recorded on the task as Failed and propagated
/// only to its dependents.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("tool execution failed: {0}")]
    Execution(String),

    #[error("tool call timed out after {0:?}")]
    Timeout(Duration),

    #[error("placeholder ${reference} has no result to substitute")]
    Unresolved { reference: TaskId },
}

pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;

/// An invokable capability, looked up by name.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Run the tool with fully resolved arguments.
    fn invoke(&self, args: Value) -> ToolFuture<'_>;
}

#[derive(Clone)]
struct Entry {
    tool: Arc<dyn Tool>,
    timeout: Option<Duration>,
}

/// Registry of tools keyed by name, with optional per-tool timeouts.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Entry>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name, replacing any previous entry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.insert(tool, None);
    }

    /// Register a tool whose calls time out after `timeout` instead of the
    /// executor default.
    pub fn register_with_timeout(&mut self, tool: Arc<dyn Tool>, timeout: Duration) {
        self.insert(tool, Some(timeout));
    }

    fn insert(&mut self, tool: Arc<dyn Tool>, timeout: Option<Duration>) {
        self.tools
            .insert(tool.name().to_string(), Entry { tool, timeout });
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|e| Arc::clone(&e.tool))
    }

    pub fn timeout_for(&self, name: &str) -> Option<Duration> {
        self.tools.get(name).and_then(|e| e.timeout)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `(name, description)` pairs, sorted by name.
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .map(|(name, e)| (name.clone(), e.tool.description().to_string()))
            .collect()
    }
}

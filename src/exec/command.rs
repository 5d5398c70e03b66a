// src/exec/command.rs

//! Shell-command backed tools.

use std::process::Stdio;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::dag::placeholder::as_text;
use crate::exec::tool::{Tool, ToolError, ToolFuture};

/// Longest stderr excerpt carried in an execution error.
const STDERR_TAIL: usize = 512;

/// Build a shell command appropriate for the platform.
pub(crate) fn shell_command(cmd: &str) -> Command {
    let mut c = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };
    c.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    c
}

/// Feed `input` to the child's stdin from a separate task and close it, so
/// a child that writes before reading cannot deadlock us.
pub(crate) fn feed_stdin(child: &mut Child, input: Vec<u8>) {
    if let Some(mut stdin) = child.stdin.take() {
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&input).await {
                debug!(error = %e, "child closed stdin early");
            }
        });
    }
}

/// Last `STDERR_TAIL` bytes of stderr, lossily decoded.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

/// Environment variable name for a top-level argument key.
fn arg_env_key(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("FETCHDAG_ARG_{cleaned}")
}

/// A tool that runs a shell command.
///
/// - The resolved argument payload is written to stdin as JSON.
/// - Every top-level scalar argument is also exported as
///   `FETCHDAG_ARG_<KEY>` (key upper-cased, non-alphanumerics as `_`).
/// - Trimmed stdout becomes the result (a JSON string).
/// - A non-zero exit is a [`ToolError::Execution`] carrying the exit code
///   and the tail of stderr.
#[derive(Debug, Clone)]
pub struct CommandTool {
    name: String,
    description: String,
    cmd: String,
}

impl CommandTool {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            cmd: cmd.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    async fn run(&self, args: Value) -> Result<Value, ToolError> {
        let mut command = shell_command(&self.cmd);
        if let Value::Object(map) = &args {
            for (key, value) in map {
                if !matches!(value, Value::Array(_) | Value::Object(_)) {
                    command.env(arg_env_key(key), as_text(value));
                }
            }
        }

        let mut child = command.spawn().map_err(|e| {
            ToolError::Execution(format!("spawning command for tool '{}': {e}", self.name))
        })?;

        let payload = serde_json::to_vec(&args)
            .map_err(|e| ToolError::Execution(format!("encoding arguments: {e}")))?;
        feed_stdin(&mut child, payload);

        let output = child.wait_with_output().await.map_err(|e| {
            ToolError::Execution(format!("waiting for command of tool '{}': {e}", self.name))
        })?;

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok(Value::String(stdout))
        } else {
            let code = output.status.code().unwrap_or(-1);
            Err(ToolError::Execution(format!(
                "exit code {code}: {}",
                stderr_tail(&output.stderr)
            )))
        }
    }
}

impl Tool for CommandTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn invoke(&self, args: Value) -> ToolFuture<'_> {
        Box::pin(self.run(args))
    }
}

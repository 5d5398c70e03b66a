// src/planner/command.rs

use serde::Serialize;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::context::PlanContext;
use crate::errors::{FetchdagError, Result};
use crate::exec::command::{feed_stdin, shell_command, stderr_tail};
use crate::planner::parser::PlanParser;
use crate::planner::{PlanFuture, PlanSink, Planner};

/// Tool catalogue entry handed to a command planner.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
}

#[derive(Serialize)]
struct PlannerInput<'a> {
    context: &'a PlanContext,
    tools: &'a [ToolDescription],
}

/// Planner backed by a shell command.
///
/// The command receives `{"context": PlanContext, "tools": [...]}` as JSON
/// on stdin and prints plan lines on stdout. Output is read in whatever
/// chunks the pipe delivers; each task is emitted as soon as its line is
/// complete.
#[derive(Debug, Clone)]
pub struct CommandPlanner {
    cmd: String,
    tools: Vec<ToolDescription>,
}

impl CommandPlanner {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            tools: Vec::new(),
        }
    }

    /// Describe the available tools to the planner command.
    pub fn with_tools(mut self, tools: impl IntoIterator<Item = (String, String)>) -> Self {
        self.tools = tools
            .into_iter()
            .map(|(name, description)| ToolDescription { name, description })
            .collect();
        self
    }

    async fn stream(&self, ctx: &PlanContext, sink: PlanSink) -> Result<()> {
        info!(round = ctx.round, cmd = %self.cmd, "running planner command");

        let mut child = shell_command(&self.cmd).spawn()?;
        let input = serde_json::to_vec(&PlannerInput {
            context: ctx,
            tools: &self.tools,
        })?;
        feed_stdin(&mut child, input);

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                buf
            })
        });

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| FetchdagError::Planner("planner stdout is not captured".into()))?;
        let mut parser = PlanParser::new();
        let mut chunk = [0u8; 4096];

        loop {
            let n = stdout.read(&mut chunk).await?;
            let specs = if n == 0 {
                parser.finish().into_iter().collect()
            } else {
                parser.feed(&chunk[..n])
            };
            for spec in specs {
                if !sink.emit(spec).await {
                    debug!(round = ctx.round, "round ended; stopping planner command");
                    return Ok(());
                }
            }
            if n == 0 {
                break;
            }
        }

        let status = child.wait().await?;
        if status.success() {
            return Ok(());
        }

        let stderr = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        };
        Err(FetchdagError::Planner(format!(
            "planner command exited with code {}: {}",
            status.code().unwrap_or(-1),
            stderr_tail(&stderr)
        )))
    }
}

impl Planner for CommandPlanner {
    fn plan<'a>(&'a self, ctx: &'a PlanContext, sink: PlanSink) -> PlanFuture<'a> {
        Box::pin(self.stream(ctx, sink))
    }
}

// src/joiner/command.rs

use tracing::{debug, info};

use crate::errors::{FetchdagError, Result};
use crate::exec::command::{feed_stdin, shell_command, stderr_tail};
use crate::joiner::{JoinFuture, JoinInput, Joiner, JoinerDecision, parse_decision};

/// Joiner backed by a shell command.
///
/// The [`JoinInput`] is written to stdin as JSON; stdout is parsed with
/// [`parse_decision`].
#[derive(Debug, Clone)]
pub struct CommandJoiner {
    cmd: String,
}

impl CommandJoiner {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    async fn run(&self, input: &JoinInput) -> Result<JoinerDecision> {
        info!(round = input.round, cmd = %self.cmd, "running joiner command");

        let mut child = shell_command(&self.cmd).spawn()?;
        feed_stdin(&mut child, serde_json::to_vec(input)?);
        let output = child.wait_with_output().await?;

        if !output.status.success() {
            return Err(FetchdagError::Other(anyhow::anyhow!(
                "joiner command exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr_tail(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(round = input.round, reply = %stdout.trim(), "joiner replied");
        parse_decision(&stdout)
    }
}

impl Joiner for CommandJoiner {
    fn decide<'a>(&'a self, input: &'a JoinInput) -> JoinFuture<'a> {
        Box::pin(self.run(input))
    }
}

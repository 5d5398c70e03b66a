#![allow(dead_code)]

use fetchdag::config::model::{RawPlannerSection, RawToolConfig};
use fetchdag::config::{ConfigFile, RawConfigFile};
use fetchdag::dag::{TaskId, TaskSpec};
use serde_json::{Value, json};

/// `TaskSpec` for `tool` with a single `input` argument.
pub fn task(id: TaskId, tool: &str, input: &str) -> TaskSpec {
    TaskSpec::new(id, tool).with_args(json!({ "input": input }))
}

/// `TaskSpec` with an arbitrary argument payload.
pub fn task_with_args(id: TaskId, tool: &str, args: Value) -> TaskSpec {
    TaskSpec::new(id, tool).with_args(args)
}

/// Join sentinel depending on every earlier task.
pub fn join(id: TaskId) -> TaskSpec {
    TaskSpec::new(id, "join")
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                planner: RawPlannerSection {
                    script: vec!["1. echo(input='hi')".to_string()],
                    ..RawPlannerSection::default()
                },
                ..RawConfigFile::default()
            },
        }
    }

    pub fn with_tool(mut self, name: &str, tool: RawToolConfig) -> Self {
        self.config.tool.insert(name.to_string(), tool);
        self
    }

    pub fn with_script(mut self, rounds: &[&str]) -> Self {
        self.config.planner.cmd = None;
        self.config.planner.script = rounds.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_planner_cmd(mut self, cmd: &str) -> Self {
        self.config.planner.script.clear();
        self.config.planner.cmd = Some(cmd.to_string());
        self
    }

    pub fn with_joiner_cmd(mut self, cmd: &str) -> Self {
        self.config.joiner.cmd = Some(cmd.to_string());
        self
    }

    pub fn max_rounds(mut self, n: u32) -> Self {
        self.config.config.max_rounds = n;
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.config.max_concurrency = n;
        self
    }

    pub fn task_timeout(mut self, timeout: &str) -> Self {
        self.config.config.task_timeout = timeout.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `[tool.<name>]` sections.
pub struct ToolConfigBuilder {
    tool: RawToolConfig,
}

impl ToolConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            tool: RawToolConfig {
                cmd: cmd.to_string(),
                description: String::new(),
                timeout: None,
            },
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.tool.description = text.to_string();
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.tool.timeout = Some(timeout.to_string());
        self
    }

    pub fn build(self) -> RawToolConfig {
        self.tool
    }
}

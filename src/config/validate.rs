// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::model::{
    ConfigFile, ConfigSection, JoinerSource, PlannerSource, RawConfigFile, RawToolConfig,
    ToolConfig, parse_duration,
};
use crate::dag::JOIN_TOOL;
use crate::errors::{FetchdagError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FetchdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tools(&raw)?;
        Ok(ConfigFile {
            config: validate_global_config(&raw)?,
            planner: validate_planner(&raw)?,
            joiner: validate_joiner(&raw),
            tool: validate_tools(raw.tool)?,
        })
    }
}

fn config_error(msg: impl Into<String>) -> FetchdagError {
    FetchdagError::ConfigError(msg.into())
}

fn duration(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| config_error(format!("{field}: {e}")))
}

fn timeout(field: &str, value: &str) -> Result<Duration> {
    let parsed = duration(field, value)?;
    if parsed.is_zero() {
        return Err(config_error(format!("{field} must be greater than zero")));
    }
    Ok(parsed)
}

fn ensure_has_tools(cfg: &RawConfigFile) -> Result<()> {
    if cfg.tool.is_empty() {
        return Err(config_error(
            "config must contain at least one [tool.<name>] section",
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<ConfigSection> {
    if cfg.config.max_rounds == 0 {
        return Err(config_error("[config].max_rounds must be >= 1 (got 0)"));
    }
    if cfg.config.max_concurrency == 0 {
        return Err(config_error("[config].max_concurrency must be >= 1 (got 0)"));
    }

    Ok(ConfigSection {
        max_rounds: cfg.config.max_rounds,
        max_concurrency: cfg.config.max_concurrency,
        task_timeout: timeout("[config].task_timeout", &cfg.config.task_timeout)?,
    })
}

fn validate_planner(cfg: &RawConfigFile) -> Result<PlannerSource> {
    let planner = &cfg.planner;
    match (&planner.cmd, planner.script.is_empty()) {
        (Some(_), false) => Err(config_error(
            "[planner] must set either `cmd` or `script`, not both",
        )),
        (Some(cmd), true) => {
            if planner.line_delay.is_some() {
                return Err(config_error(
                    "[planner].line_delay only applies to `script` planners",
                ));
            }
            Ok(PlannerSource::Command { cmd: cmd.clone() })
        }
        (None, false) => Ok(PlannerSource::Script {
            rounds: planner.script.clone(),
            line_delay: planner
                .line_delay
                .as_deref()
                .map(|d| duration("[planner].line_delay", d))
                .transpose()?,
        }),
        (None, true) => Err(config_error(
            "[planner] must set either `cmd` or `script`",
        )),
    }
}

fn validate_joiner(cfg: &RawConfigFile) -> JoinerSource {
    match &cfg.joiner.cmd {
        Some(cmd) => JoinerSource::Command { cmd: cmd.clone() },
        None => JoinerSource::Summary,
    }
}

fn is_valid_tool_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn validate_tools(raw: BTreeMap<String, RawToolConfig>) -> Result<BTreeMap<String, ToolConfig>> {
    let mut out = BTreeMap::new();
    for (name, tool) in raw {
        if name == JOIN_TOOL {
            return Err(config_error(format!(
                "tool name '{JOIN_TOOL}' is reserved for the join sentinel"
            )));
        }
        if !is_valid_tool_name(&name) {
            return Err(config_error(format!(
                "tool name '{name}' cannot be used in a plan line"
            )));
        }
        if tool.cmd.trim().is_empty() {
            return Err(config_error(format!("[tool.{name}].cmd must not be empty")));
        }
        let tool_timeout = tool
            .timeout
            .as_deref()
            .map(|t| timeout(&format!("[tool.{name}].timeout"), t))
            .transpose()?;

        out.insert(
            name,
            ToolConfig {
                cmd: tool.cmd,
                description: tool.description,
                timeout: tool_timeout,
            },
        );
    }
    Ok(out)
}

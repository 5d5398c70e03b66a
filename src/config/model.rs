// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Configuration exactly as read from a TOML file.
///
/// ```toml
/// [config]
/// max_rounds = 3
/// max_concurrency = 4
/// task_timeout = "60s"
///
/// [planner]
/// cmd = "python plan.py"
///
/// [joiner]
/// cmd = "python join.py"
///
/// [tool.search]
/// cmd = "curl -s \"https://example.org/?q=$FETCHDAG_ARG_QUERY\""
/// description = "search(query): web search"
/// timeout = "10s"
/// ```
///
/// Everything except the tools has a default. Turn it into a
/// [`ConfigFile`] with `ConfigFile::try_from`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: RawConfigSection,

    #[serde(default)]
    pub planner: RawPlannerSection,

    #[serde(default)]
    pub joiner: RawJoinerSection,

    /// Keys are tool names as used in plan lines.
    #[serde(default)]
    pub tool: BTreeMap<String, RawToolConfig>,
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigSection {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Default per-task timeout, e.g. `"500ms"`, `"60s"`, `"2m"`.
    #[serde(default = "default_task_timeout")]
    pub task_timeout: String,
}

fn default_max_rounds() -> u32 {
    3
}

fn default_max_concurrency() -> usize {
    4
}

fn default_task_timeout() -> String {
    "60s".to_string()
}

impl Default for RawConfigSection {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_concurrency: default_max_concurrency(),
            task_timeout: default_task_timeout(),
        }
    }
}

/// `[planner]` section: exactly one of `cmd` or `script`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPlannerSection {
    pub cmd: Option<String>,

    /// Plan text per round; the last entry is reused for later rounds.
    #[serde(default)]
    pub script: Vec<String>,

    /// Delay between scripted plan lines.
    pub line_delay: Option<String>,
}

/// `[joiner]` section. Without `cmd` the summary joiner is used.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawJoinerSection {
    pub cmd: Option<String>,
}

/// `[tool.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawToolConfig {
    pub cmd: String,

    #[serde(default)]
    pub description: String,

    /// Overrides `[config].task_timeout` for this tool.
    pub timeout: Option<String>,
}

/// Validated `[config]` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigSection {
    pub max_rounds: u32,
    pub max_concurrency: usize,
    pub task_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannerSource {
    Command {
        cmd: String,
    },
    Script {
        rounds: Vec<String>,
        line_delay: Option<Duration>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinerSource {
    Summary,
    Command { cmd: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub cmd: String,
    pub description: String,
    pub timeout: Option<Duration>,
}

/// Validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub planner: PlannerSource,
    pub joiner: JoinerSource,
    pub tool: BTreeMap<String, ToolConfig>,
}

/// Parse durations like `"250ms"`, `"10s"`, `"5m"`, `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;
    let unit = unit_part.trim().to_lowercase();

    let secs_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{unit}'; expected ms, s, m, or h"
            ));
        }
    };
    value
        .checked_mul(secs_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{s}' is too large"))
}

// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::DEFAULT_CONFIG_FILE;

/// Command-line arguments for `fetchdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "fetchdag",
    version,
    about = "Answer a query by planning tool calls as a DAG and running them in parallel.",
    long_about = None
)]
pub struct CliArgs {
    /// The query to answer.
    #[arg(value_name = "QUERY", required_unless_present = "dry_run")]
    pub query: Option<String>,

    /// Path to the config file (TOML).
    ///
    /// Default: `Fetchdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Override `[config].max_rounds`.
    #[arg(long, value_name = "N")]
    pub max_rounds: Option<u32>,

    /// Override `[config].max_concurrency`.
    #[arg(long, value_name = "N")]
    pub max_concurrency: Option<usize>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FETCHDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the answer and every round's task outcomes as JSON.
    #[arg(long)]
    pub json: bool,

    /// Parse + validate the config and print it, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

// src/lib.rs

pub mod cli;
pub mod compiler;
pub mod config;
pub mod context;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod joiner;
pub mod logging;
pub mod planner;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::compiler::{Compiler, CompilerOptions};
use crate::config::loader::load_and_validate;
use crate::config::model::{ConfigFile, JoinerSource, PlannerSource};
use crate::exec::{CommandTool, ToolRegistry};
use crate::joiner::{CommandJoiner, Joiner, SummaryJoiner};
use crate::planner::{CommandPlanner, Planner, ScriptedPlanner};

pub use crate::compiler::Answer;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - tool registry, planner and joiner
/// - the plan → execute → join loop
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    apply_overrides(&mut cfg, &args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let query = args
        .query
        .clone()
        .context("a query is required unless --dry-run is given")?;

    let compiler = build_compiler(&cfg);

    // Ctrl-C → cancel the running round.
    {
        let cancel = compiler.cancel_handle();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("Ctrl+C received; cancelling");
            cancel.cancel();
        });
    }

    let answer = compiler.run(&query).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        println!("{}", answer.answer);
    }
    Ok(())
}

/// Apply `--max-rounds` / `--max-concurrency` on top of the file.
pub fn apply_overrides(cfg: &mut ConfigFile, args: &CliArgs) -> Result<()> {
    if let Some(n) = args.max_rounds {
        anyhow::ensure!(n >= 1, "--max-rounds must be >= 1");
        cfg.config.max_rounds = n;
    }
    if let Some(n) = args.max_concurrency {
        anyhow::ensure!(n >= 1, "--max-concurrency must be >= 1");
        cfg.config.max_concurrency = n;
    }
    Ok(())
}

/// One [`CommandTool`] per `[tool.<name>]` section.
pub fn build_registry(cfg: &ConfigFile) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for (name, tool) in &cfg.tool {
        let command =
            Arc::new(CommandTool::new(name, &tool.cmd).with_description(&tool.description));
        match tool.timeout {
            Some(timeout) => registry.register_with_timeout(command, timeout),
            None => registry.register(command),
        }
    }
    debug!(tools = registry.len(), "tool registry built");
    registry
}

pub fn build_planner(cfg: &ConfigFile, registry: &ToolRegistry) -> Arc<dyn Planner> {
    match &cfg.planner {
        PlannerSource::Command { cmd } => {
            Arc::new(CommandPlanner::new(cmd).with_tools(registry.descriptions()))
        }
        PlannerSource::Script { rounds, line_delay } => {
            let planner = ScriptedPlanner::new(rounds.iter().cloned());
            Arc::new(match line_delay {
                Some(delay) => planner.with_line_delay(*delay),
                None => planner,
            })
        }
    }
}

pub fn build_joiner(cfg: &ConfigFile) -> Arc<dyn Joiner> {
    match &cfg.joiner {
        JoinerSource::Summary => Arc::new(SummaryJoiner),
        JoinerSource::Command { cmd } => Arc::new(CommandJoiner::new(cmd)),
    }
}

pub fn build_compiler(cfg: &ConfigFile) -> Compiler {
    let registry = build_registry(cfg);
    let planner = build_planner(cfg, &registry);
    let joiner = build_joiner(cfg);
    let options = CompilerOptions {
        max_rounds: cfg.config.max_rounds,
        max_concurrency: cfg.config.max_concurrency,
        task_timeout: cfg.config.task_timeout,
    };
    Compiler::new(planner, joiner, Arc::new(registry), options)
}

/// Simple dry-run output: print limits, planner, joiner and tools.
fn print_dry_run(cfg: &ConfigFile) {
    println!("fetchdag dry-run");
    println!("  config.max_rounds = {}", cfg.config.max_rounds);
    println!("  config.max_concurrency = {}", cfg.config.max_concurrency);
    println!("  config.task_timeout = {:?}", cfg.config.task_timeout);
    println!();

    match &cfg.planner {
        PlannerSource::Command { cmd } => println!("planner: command `{cmd}`"),
        PlannerSource::Script { rounds, line_delay } => {
            println!("planner: script ({} round(s))", rounds.len());
            if let Some(delay) = line_delay {
                println!("  line_delay: {delay:?}");
            }
        }
    }
    match &cfg.joiner {
        JoinerSource::Summary => println!("joiner: summary"),
        JoinerSource::Command { cmd } => println!("joiner: command `{cmd}`"),
    }
    println!();

    println!("tools ({}):", cfg.tool.len());
    for (name, tool) in &cfg.tool {
        println!("  - {name}");
        println!("      cmd: {}", tool.cmd);
        if !tool.description.is_empty() {
            println!("      description: {}", tool.description);
        }
        if let Some(timeout) = tool.timeout {
            println!("      timeout: {timeout:?}");
        }
    }

    debug!("dry-run complete (no execution)");
}

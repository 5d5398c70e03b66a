// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::dag::GraphError;

#[derive(Error, Debug)]
pub enum FetchdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Structural plan error (cycle, dangling or self reference, duplicate id).
    /// Aborts the round before the offending tasks can run.
    #[error("Invalid plan: {0}")]
    Graph(#[from] GraphError),

    #[error("Planner failed: {0}")]
    Planner(String),

    #[error("Replan limit exceeded: joiner asked for another round after {max_rounds} round(s)")]
    ReplanLimitExceeded { max_rounds: u32 },

    #[error("Joiner protocol error: {0}")]
    JoinerProtocol(String),

    #[error("Run cancelled before the joiner produced an answer")]
    Cancelled,

    #[error("Runtime event channel closed before the round finished")]
    ChannelClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FetchdagError>;

// src/config/mod.rs

//! Configuration loading and validation for fetchdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it into a typed `ConfigFile` (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{DEFAULT_CONFIG_FILE, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ConfigSection, JoinerSource, PlannerSource, RawConfigFile, ToolConfig,
    parse_duration,
};

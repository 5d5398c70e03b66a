// src/exec/mod.rs

//! Tool execution layer.
//!
//! - [`tool`] defines the `Tool` capability, `ToolError`, and the name-keyed
//!   `ToolRegistry`.
//! - [`backend`] provides the `ExecutorBackend` trait and the production
//!   `RegistryExecutor`, which tests can replace with a fake implementation.
//! - [`task_runner`] runs a single tool call with timeout and cancellation.
//! - [`command`] implements tools backed by shell commands.

pub mod backend;
pub mod command;
pub mod task_runner;
pub mod tool;

pub use backend::{ExecutorBackend, RegistryExecutor};
pub use command::CommandTool;
pub use tool::{Tool, ToolError, ToolFuture, ToolRegistry};

//! wsrun Core - Configuration and workspace graph for wsrun
//!
//! This crate provides error handling, configuration loading, and the
//! workspace dependency graph (with tolerant cycle stripping) that the CLI
//! turns into scheduled script batches.

pub mod config;
pub mod error;
pub mod workspace;

pub use config::{Config, LoadedConfig, RunConfig, WorkspaceConfig};
pub use error::{ConfigError, Result, WorkspaceError, WsrunError};
pub use workspace::{select_workspaces, CycleEdge, WorkspaceGraph, WorkspaceNode};

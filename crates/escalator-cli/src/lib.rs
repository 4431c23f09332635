//! Escalator CLI library
//!
//! Argument parsing, config-file handling and command handlers behind the
//! `escalator` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::{Cli, Commands, ConfigCommand, ScopeArgs, SimulateArgs};
pub use commands::{CommandDispatcher, SimulationSummary};
pub use error::{CliError, Result};

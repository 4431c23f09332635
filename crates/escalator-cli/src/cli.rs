//! Command-line interface definitions and parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON file with global / operation type / component config layers
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one simulated operation and print its transitions
    Simulate(SimulateArgs),
    /// Print the config an operation in the given scope would get
    Resolve(ScopeArgs),
    /// Inspect or combine config layers
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ScopeArgs {
    /// Operation type layer to apply
    #[arg(short = 't', long = "type")]
    pub operation_type: Option<String>,

    /// Component layer to apply
    #[arg(long)]
    pub component: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// How long the simulated work takes
    #[arg(short, long, default_value_t = 1500)]
    pub duration_ms: u64,

    /// Fail at the end instead of completing
    #[arg(long)]
    pub fail: bool,

    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Override the resolved timeout
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Number of progress reports
    #[arg(short, long, default_value_t = 10)]
    pub steps: u32,

    /// Operation id; generated when omitted
    #[arg(long)]
    pub id: Option<String>,

    /// Report progress through an event channel instead of the handle
    #[arg(long)]
    pub bridge: bool,

    /// Minimum spacing between applied progress updates
    #[arg(long)]
    pub throttle_ms: Option<u64>,

    /// Print the final summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the loaded layers as JSON
    Export,
    /// Merge the layers of FILE over the loaded ones and print the result
    Import {
        file: PathBuf,
        /// Write the merged layers here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Resolve every configured scope and report invalid orderings
    Validate,
}

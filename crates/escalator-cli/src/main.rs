//! Escalator CLI - main entry point

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use escalator_cli::{cli::Cli, commands::CommandDispatcher, config::load_config_manager, error::Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load config layers
    let configs = load_config_manager(cli.config.as_deref())?;

    // Execute the command
    if let Err(e) = CommandDispatcher::execute(cli, configs).await {
        error!("Command execution failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging based on verbosity level; `RUST_LOG` takes precedence
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}

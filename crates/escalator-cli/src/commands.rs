//! Command handlers for the escalator CLI

use std::sync::{Arc, Mutex};
use std::time::Duration;

use escalator_core::{
    generate_operation_id, BridgeEvent, ConfigScope, EscalationConfigManager, EscalationLevel,
    OperationStatus,
};
use escalator_harness::LocalEventBus;
use escalator_runtime::{
    Operation, OperationManager, ProgressBridge, ProgressState, StartOptions,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{Cli, Commands, ConfigCommand, ScopeArgs, SimulateArgs};
use crate::config::{describe_scope, load_snapshot, merge_snapshot, validate_layers};
use crate::error::{CliError, Result};

/// Final state of a simulated operation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub id: String,
    pub status: OperationStatus,
    pub escalation_level: EscalationLevel,
    pub elapsed_ms: u64,
    pub progress: ProgressState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timed_out: bool,
}

impl From<&Operation> for SimulationSummary {
    fn from(operation: &Operation) -> Self {
        Self {
            id: operation.id.clone(),
            status: operation.status,
            escalation_level: operation.escalation_level,
            elapsed_ms: u64::try_from(operation.elapsed().as_millis()).unwrap_or(u64::MAX),
            progress: operation.progress.clone(),
            error: operation.error.as_ref().map(ToString::to_string),
            timed_out: operation.error.as_ref().is_some_and(|e| e.is_timeout()),
        }
    }
}

fn scope_of(args: &ScopeArgs) -> ConfigScope {
    let mut scope = ConfigScope::global();
    if let Some(operation_type) = &args.operation_type {
        scope = scope.operation_type(operation_type.clone());
    }
    if let Some(component_id) = &args.component {
        scope = scope.component(component_id.clone());
    }
    scope
}

fn describe_progress(progress: &ProgressState) -> String {
    match progress.value() {
        Some(value) => format!("{:>5.1}%", value),
        None => "  ...".to_string(),
    }
}

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, configs: Arc<EscalationConfigManager>) -> Result<()> {
        match cli.command {
            Commands::Simulate(args) => Self::handle_simulate_command(configs, args).await,
            Commands::Resolve(scope) => Self::handle_resolve_command(&configs, &scope),
            Commands::Config { action } => Self::handle_config_command(&configs, action),
        }
    }

    /// Run one operation against the real timers
    pub async fn handle_simulate_command(
        configs: Arc<EscalationConfigManager>,
        args: SimulateArgs,
    ) -> Result<()> {
        let summary = Self::simulate(configs, &args).await?;

        if args.json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else {
            println!(
                "{} finished: {} at level {} after {}ms",
                summary.id, summary.status, summary.escalation_level, summary.elapsed_ms
            );
            if let Some(error) = &summary.error {
                println!("  error: {}", error);
            }
        }
        Ok(())
    }

    /// Drive a simulated operation to its end and summarize it
    pub async fn simulate(
        configs: Arc<EscalationConfigManager>,
        args: &SimulateArgs,
    ) -> Result<SimulationSummary> {
        if args.steps == 0 {
            return Err(CliError::Simulation("steps must be at least 1".to_string()));
        }

        let mut builder = OperationManager::builder().with_config_manager(configs.clone());
        if let Some(throttle_ms) = args.throttle_ms {
            builder = builder.throttle_interval(Duration::from_millis(throttle_ms));
        }
        let manager = builder.build();

        let id = args
            .id
            .clone()
            .unwrap_or_else(|| generate_operation_id("simulated"));
        let scope = scope_of(&args.scope);

        let mut options = StartOptions::new(id.clone());
        options.scope = scope.clone();
        if let Some(timeout_ms) = args.timeout_ms {
            options = options.config(configs.resolve_config(&scope).timeout(timeout_ms));
        }

        // Print only what changes the display: status, level, progress
        let last_seen: Mutex<Option<(OperationStatus, EscalationLevel, Option<f64>)>> =
            Mutex::new(None);
        let subscription = manager.subscribe(&id, move |operation: &Operation| {
            let current = (
                operation.status,
                operation.escalation_level,
                operation.progress.value(),
            );
            let mut last = last_seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if last.as_ref() == Some(&current) {
                return;
            }
            *last = Some(current);
            println!(
                "[{:>6}ms] {:<9} {:<7} {}",
                operation.elapsed().as_millis(),
                operation.status.as_str(),
                operation.escalation_level.as_str(),
                describe_progress(&operation.progress)
            );
        });

        // In bridge mode the work reports through an event channel, the way
        // a backend task would, while tracking still starts here
        let bus = LocalEventBus::new();
        let bridge = ProgressBridge::new(manager.clone(), Arc::new(bus));
        let handle = manager.start_operation(options)?;
        if args.bridge {
            bridge.start();
        }

        info!(
            "Simulating {} in scope {} for {}ms",
            id,
            describe_scope(&scope),
            args.duration_ms
        );

        let step_delay = Duration::from_millis(args.duration_ms) / args.steps;
        for step in 1..=args.steps {
            tokio::time::sleep(step_delay).await;

            let (current, total) = (f64::from(step), f64::from(args.steps));
            let reported = if args.bridge {
                bridge.report(&BridgeEvent::progress(id.clone(), current, total))
            } else {
                handle.report(current, total)
            };
            if let Err(e) = reported {
                warn!("Stopped reporting progress: {}", e);
                break;
            }

            let finished = manager
                .get_operation(&id)
                .map_or(true, |operation| operation.is_terminal());
            if finished {
                break;
            }
        }

        let still_running = manager
            .get_operation(&id)
            .is_some_and(|operation| !operation.is_terminal());
        if still_running {
            let result = serde_json::json!({ "steps": args.steps });
            match (args.bridge, args.fail) {
                (true, true) => {
                    bridge.report(&BridgeEvent::error(id.clone(), "simulated failure"))?
                }
                (true, false) => bridge.report(&BridgeEvent::complete(id.clone(), Some(result)))?,
                (false, true) => handle.fail("simulated failure")?,
                (false, false) => handle.complete(Some(result))?,
            }
        }

        subscription.unsubscribe();
        bridge.dispose();

        let operation = handle
            .snapshot()
            .ok_or_else(|| CliError::Simulation(format!("operation {} was replaced", id)))?;
        Ok(SimulationSummary::from(&operation))
    }

    /// Print the resolved config for a scope
    pub fn handle_resolve_command(
        configs: &EscalationConfigManager,
        scope: &ScopeArgs,
    ) -> Result<()> {
        let scope = scope_of(scope);
        let resolved = configs.resolve_config(&scope);
        println!("{}", serde_json::to_string_pretty(&resolved)?);

        if let Err(e) = resolved.validate() {
            warn!("Resolved config for {} is invalid: {}", describe_scope(&scope), e);
        }
        Ok(())
    }

    /// Export, merge or validate config layers
    pub fn handle_config_command(
        configs: &EscalationConfigManager,
        action: ConfigCommand,
    ) -> Result<()> {
        match action {
            ConfigCommand::Export => {
                println!("{}", configs.export_json()?);
                Ok(())
            }
            ConfigCommand::Import { file, output } => {
                let update = load_snapshot(&file)?;
                merge_snapshot(configs, &update);
                let merged = configs.export_json()?;
                match output {
                    Some(path) => {
                        std::fs::write(&path, merged)?;
                        info!("Merged config written to {}", path.display());
                    }
                    None => println!("{}", merged),
                }
                Ok(())
            }
            ConfigCommand::Validate => {
                let mut invalid = 0;
                for (scope, outcome) in validate_layers(configs) {
                    match outcome {
                        Ok(()) => println!("ok       {}", describe_scope(&scope)),
                        Err(e) => {
                            invalid += 1;
                            println!("invalid  {}: {}", describe_scope(&scope), e);
                        }
                    }
                }
                if invalid > 0 {
                    return Err(CliError::InvalidScopes { count: invalid });
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escalator_core::PartialEscalationConfig;

    fn args(duration_ms: u64) -> SimulateArgs {
        SimulateArgs {
            duration_ms,
            fail: false,
            scope: ScopeArgs::default(),
            timeout_ms: None,
            steps: 4,
            id: Some("sim".to_string()),
            bridge: false,
            throttle_ms: None,
            json: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_completes_with_reached_level() {
        let configs = Arc::new(EscalationConfigManager::new());
        let summary = CommandDispatcher::simulate(configs, &args(1_200)).await.unwrap();

        assert_eq!(summary.status, OperationStatus::Completed);
        assert_eq!(summary.escalation_level, EscalationLevel::Overlay);
        assert_eq!(summary.progress.value(), Some(100.0));
        assert!(!summary.timed_out);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_times_out() {
        let configs = Arc::new(EscalationConfigManager::new());
        let mut args = args(2_000);
        args.timeout_ms = Some(700);

        let summary = CommandDispatcher::simulate(configs, &args).await.unwrap();
        assert_eq!(summary.status, OperationStatus::Failed);
        assert!(summary.timed_out);
        assert_eq!(summary.escalation_level, EscalationLevel::Inline);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_through_bridge() {
        let configs = Arc::new(EscalationConfigManager::new());
        configs.set_global_config(PartialEscalationConfig::new().inline_threshold_ms(50));
        let mut args = args(100);
        args.bridge = true;
        args.fail = true;

        let summary = CommandDispatcher::simulate(configs, &args).await.unwrap();
        assert_eq!(summary.status, OperationStatus::Failed);
        assert_eq!(summary.error.as_deref(), Some("simulated failure"));
        assert_eq!(summary.escalation_level, EscalationLevel::Inline);
    }

    #[test]
    fn test_validate_fails_on_invalid_scope() {
        let configs = EscalationConfigManager::new();
        configs.set_operation_type_config(
            "network",
            PartialEscalationConfig::new().modal_threshold_ms(500),
        );

        let err = CommandDispatcher::handle_config_command(&configs, ConfigCommand::Validate)
            .unwrap_err();
        assert!(matches!(err, CliError::InvalidScopes { count: 1 }));
    }
}

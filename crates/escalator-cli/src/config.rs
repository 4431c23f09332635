//! Escalator CLI Configuration Management
//!
//! Config layers are kept in a JSON file with the same shape as
//! [`ConfigSnapshot`]:
//!
//! ```json
//! {
//!   "global": { "inlineThresholdMs": 100 },
//!   "operationTypes": { "network": { "timeoutMs": 30000 } },
//!   "components": { "editor": { "modalEnabled": false } }
//! }
//! ```
//!
//! Every field of every layer is optional.

use anyhow::Context;
use escalator_core::{ConfigError, ConfigScope, ConfigSnapshot, EscalationConfigManager};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;

/// Read a layer file
pub fn load_snapshot(path: &Path) -> Result<ConfigSnapshot> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let snapshot = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(snapshot)
}

/// Config manager seeded from `path`, or empty when no file is given
pub fn load_config_manager(path: Option<&Path>) -> Result<Arc<EscalationConfigManager>> {
    match path {
        Some(path) => {
            info!("Loading config layers from: {}", path.display());
            Ok(Arc::new(EscalationConfigManager::from_snapshot(load_snapshot(path)?)))
        }
        None => {
            info!("Using built-in escalation defaults");
            Ok(Arc::new(EscalationConfigManager::new()))
        }
    }
}

/// Merge every layer of `update` over the layers held by `manager`
pub fn merge_snapshot(manager: &EscalationConfigManager, update: &ConfigSnapshot) {
    manager.set_global_config(update.global.clone());
    for (operation_type, layer) in &update.operation_types {
        manager.set_operation_type_config(operation_type.clone(), layer.clone());
    }
    for (component_id, layer) in &update.components {
        manager.set_component_config(component_id.clone(), layer.clone());
    }
}

/// Human-readable name of a scope
pub fn describe_scope(scope: &ConfigScope) -> String {
    match (&scope.operation_type, &scope.component_id) {
        (None, None) => "global".to_string(),
        (Some(operation_type), None) => format!("type={}", operation_type),
        (None, Some(component_id)) => format!("component={}", component_id),
        (Some(operation_type), Some(component_id)) => {
            format!("type={} component={}", operation_type, component_id)
        }
    }
}

/// Every scope the layers can produce: global, each type, each component
/// and each type/component pair
pub fn configured_scopes(snapshot: &ConfigSnapshot) -> Vec<ConfigScope> {
    let mut scopes = vec![ConfigScope::global()];
    scopes.extend(
        snapshot
            .operation_types
            .keys()
            .map(|operation_type| ConfigScope::global().operation_type(operation_type.clone())),
    );
    scopes.extend(
        snapshot
            .components
            .keys()
            .map(|component_id| ConfigScope::global().component(component_id.clone())),
    );
    for operation_type in snapshot.operation_types.keys() {
        for component_id in snapshot.components.keys() {
            scopes.push(
                ConfigScope::global()
                    .operation_type(operation_type.clone())
                    .component(component_id.clone()),
            );
        }
    }
    scopes
}

/// Resolve and validate every configured scope
pub fn validate_layers(
    manager: &EscalationConfigManager,
) -> Vec<(ConfigScope, std::result::Result<(), ConfigError>)> {
    configured_scopes(&manager.export_config())
        .into_iter()
        .map(|scope| {
            let outcome = manager.resolve_config(&scope).validate();
            (scope, outcome)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use escalator_core::PartialEscalationConfig;

    fn layered_manager() -> EscalationConfigManager {
        let manager = EscalationConfigManager::new();
        manager.set_global_config(PartialEscalationConfig::new().inline_threshold_ms(100));
        manager.set_operation_type_config(
            "network",
            PartialEscalationConfig::new().inline_threshold_ms(150),
        );
        manager.set_component_config(
            "editor",
            PartialEscalationConfig::new().inline_threshold_ms(200),
        );
        manager
    }

    #[test]
    fn test_configured_scopes_cover_pairs() {
        let scopes = configured_scopes(&layered_manager().export_config());
        let names: Vec<String> = scopes.iter().map(describe_scope).collect();

        assert_eq!(
            names,
            vec![
                "global",
                "type=network",
                "component=editor",
                "type=network component=editor"
            ]
        );
    }

    #[test]
    fn test_validate_layers_reports_bad_scope() {
        let manager = layered_manager();
        manager.set_component_config(
            "editor",
            PartialEscalationConfig::new().overlay_threshold_ms(150),
        );

        let invalid: Vec<String> = validate_layers(&manager)
            .into_iter()
            .filter(|(_, outcome)| outcome.is_err())
            .map(|(scope, _)| describe_scope(&scope))
            .collect();

        // inline 200 from the component is not below its overlay of 150
        assert_eq!(invalid, vec!["component=editor", "type=network component=editor"]);
    }

    #[test]
    fn test_merge_snapshot_keeps_unrelated_layers() {
        let manager = layered_manager();
        let mut update = ConfigSnapshot::default();
        update.operation_types.insert(
            "network".to_string(),
            PartialEscalationConfig::new().timeout_ms(30_000),
        );

        merge_snapshot(&manager, &update);

        let network = manager.resolve_config(&ConfigScope::global().operation_type("network"));
        assert_eq!(network.inline_threshold_ms, 150);
        assert_eq!(network.timeout_ms, Some(30_000));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = load_snapshot(Path::new("/nonexistent/escalator-layers.json")).unwrap_err();
        assert!(err.to_string().contains("escalator-layers.json"));
    }
}

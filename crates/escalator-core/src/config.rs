//! Layered Escalation Configuration
//!
//! Escalation thresholds are configured on three layers: a global layer, one
//! layer per operation type and one per component. Each layer holds a
//! [`PartialEscalationConfig`]; [`EscalationConfigManager::resolve_config`]
//! merges them field by field, so a component can override only its inline
//! threshold while every other field falls through to the operation type,
//! the global layer and finally the built-in defaults.

use crate::errors::{ConfigError, EscalatorResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tracing::debug;

// ----------------------------------------------------------------------------
// Escalation Config
// ----------------------------------------------------------------------------

/// Fully resolved escalation configuration for one operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationConfig {
    /// Elapsed time after which an inline indicator is shown
    pub inline_threshold_ms: u64,
    /// Elapsed time after which an overlay indicator is shown
    pub overlay_threshold_ms: u64,
    /// Elapsed time after which a modal dialog is shown
    pub modal_threshold_ms: u64,
    /// Fail the operation once this much time has elapsed
    pub timeout_ms: Option<u64>,
    pub inline_enabled: bool,
    pub overlay_enabled: bool,
    pub modal_enabled: bool,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            inline_threshold_ms: 200,
            overlay_threshold_ms: 1_000,
            modal_threshold_ms: 5_000,
            timeout_ms: None,
            inline_enabled: true,
            overlay_enabled: true,
            modal_enabled: true,
        }
    }
}

impl EscalationConfig {
    /// Config with custom thresholds and every level enabled
    pub fn with_thresholds(inline_ms: u64, overlay_ms: u64, modal_ms: u64) -> Self {
        Self {
            inline_threshold_ms: inline_ms,
            overlay_threshold_ms: overlay_ms,
            modal_threshold_ms: modal_ms,
            ..Default::default()
        }
    }

    /// Set the timeout, builder style
    pub fn timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn inline_threshold(&self) -> Duration {
        Duration::from_millis(self.inline_threshold_ms)
    }

    pub fn overlay_threshold(&self) -> Duration {
        Duration::from_millis(self.overlay_threshold_ms)
    }

    pub fn modal_threshold(&self) -> Duration {
        Duration::from_millis(self.modal_threshold_ms)
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Check the strict threshold ordering and the timeout
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inline_threshold_ms >= self.overlay_threshold_ms {
            return Err(ConfigError::InlineNotBelowOverlay {
                inline_ms: self.inline_threshold_ms,
                overlay_ms: self.overlay_threshold_ms,
            });
        }
        if self.overlay_threshold_ms >= self.modal_threshold_ms {
            return Err(ConfigError::OverlayNotBelowModal {
                overlay_ms: self.overlay_threshold_ms,
                modal_ms: self.modal_threshold_ms,
            });
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Partial Config
// ----------------------------------------------------------------------------

/// One configuration layer; unset fields fall through to the next layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialEscalationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_threshold_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_threshold_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modal_threshold_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modal_enabled: Option<bool>,
}

impl PartialEscalationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inline_threshold_ms(mut self, value: u64) -> Self {
        self.inline_threshold_ms = Some(value);
        self
    }

    pub fn overlay_threshold_ms(mut self, value: u64) -> Self {
        self.overlay_threshold_ms = Some(value);
        self
    }

    pub fn modal_threshold_ms(mut self, value: u64) -> Self {
        self.modal_threshold_ms = Some(value);
        self
    }

    pub fn timeout_ms(mut self, value: u64) -> Self {
        self.timeout_ms = Some(value);
        self
    }

    pub fn inline_enabled(mut self, value: bool) -> Self {
        self.inline_enabled = Some(value);
        self
    }

    pub fn overlay_enabled(mut self, value: bool) -> Self {
        self.overlay_enabled = Some(value);
        self
    }

    pub fn modal_enabled(mut self, value: bool) -> Self {
        self.modal_enabled = Some(value);
        self
    }

    /// Shallow merge: fields set in `update` overwrite, the rest are kept
    pub fn merge(&mut self, update: &PartialEscalationConfig) {
        fn take<T: Copy>(slot: &mut Option<T>, update: Option<T>) {
            if update.is_some() {
                *slot = update;
            }
        }

        take(&mut self.inline_threshold_ms, update.inline_threshold_ms);
        take(&mut self.overlay_threshold_ms, update.overlay_threshold_ms);
        take(&mut self.modal_threshold_ms, update.modal_threshold_ms);
        take(&mut self.timeout_ms, update.timeout_ms);
        take(&mut self.inline_enabled, update.inline_enabled);
        take(&mut self.overlay_enabled, update.overlay_enabled);
        take(&mut self.modal_enabled, update.modal_enabled);
    }

    pub fn is_empty(&self) -> bool {
        *self == PartialEscalationConfig::default()
    }
}

impl From<EscalationConfig> for PartialEscalationConfig {
    fn from(config: EscalationConfig) -> Self {
        Self {
            inline_threshold_ms: Some(config.inline_threshold_ms),
            overlay_threshold_ms: Some(config.overlay_threshold_ms),
            modal_threshold_ms: Some(config.modal_threshold_ms),
            timeout_ms: config.timeout_ms,
            inline_enabled: Some(config.inline_enabled),
            overlay_enabled: Some(config.overlay_enabled),
            modal_enabled: Some(config.modal_enabled),
        }
    }
}

// ----------------------------------------------------------------------------
// Scope and Snapshot
// ----------------------------------------------------------------------------

/// Which layers take part in a resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigScope {
    pub operation_type: Option<String>,
    pub component_id: Option<String>,
}

impl ConfigScope {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn operation_type(mut self, operation_type: impl Into<String>) -> Self {
        self.operation_type = Some(operation_type.into());
        self
    }

    pub fn component(mut self, component_id: impl Into<String>) -> Self {
        self.component_id = Some(component_id.into());
        self
    }
}

/// Serializable image of all three layers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigSnapshot {
    pub global: PartialEscalationConfig,
    pub operation_types: BTreeMap<String, PartialEscalationConfig>,
    pub components: BTreeMap<String, PartialEscalationConfig>,
}

// ----------------------------------------------------------------------------
// Config Manager
// ----------------------------------------------------------------------------

/// Holds the three configuration layers and resolves them per field.
///
/// Share it through an `Arc`; every method takes `&self`.
#[derive(Debug, Default)]
pub struct EscalationConfigManager {
    layers: RwLock<ConfigSnapshot>,
}

impl EscalationConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager pre-populated from a snapshot
    pub fn from_snapshot(snapshot: ConfigSnapshot) -> Self {
        Self {
            layers: RwLock::new(snapshot),
        }
    }

    pub fn set_global_config(&self, update: PartialEscalationConfig) {
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        layers.global.merge(&update);
        debug!("Updated global escalation config: {:?}", layers.global);
    }

    pub fn set_operation_type_config(
        &self,
        operation_type: impl Into<String>,
        update: PartialEscalationConfig,
    ) {
        let operation_type = operation_type.into();
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        let layer = layers
            .operation_types
            .entry(operation_type.clone())
            .or_default();
        layer.merge(&update);
        debug!(
            "Updated escalation config for operation type {}: {:?}",
            operation_type, layer
        );
    }

    pub fn set_component_config(
        &self,
        component_id: impl Into<String>,
        update: PartialEscalationConfig,
    ) {
        let component_id = component_id.into();
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        let layer = layers.components.entry(component_id.clone()).or_default();
        layer.merge(&update);
        debug!(
            "Updated escalation config for component {}: {:?}",
            component_id, layer
        );
    }

    /// Drop an operation-type layer entirely
    pub fn remove_operation_type_config(&self, operation_type: &str) -> bool {
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        layers.operation_types.remove(operation_type).is_some()
    }

    /// Drop a component layer entirely
    pub fn remove_component_config(&self, component_id: &str) -> bool {
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        layers.components.remove(component_id).is_some()
    }

    /// Resolve every field independently: component, then operation type,
    /// then global, then the built-in default.
    pub fn resolve_config(&self, scope: &ConfigScope) -> EscalationConfig {
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);

        let component = scope
            .component_id
            .as_ref()
            .and_then(|id| layers.components.get(id));
        let operation_type = scope
            .operation_type
            .as_ref()
            .and_then(|name| layers.operation_types.get(name));

        // Most specific first
        let chain: Vec<&PartialEscalationConfig> = [component, operation_type, Some(&layers.global)]
            .into_iter()
            .flatten()
            .collect();

        let pick = |field: fn(&PartialEscalationConfig) -> Option<u64>| {
            chain.iter().find_map(|layer| field(layer))
        };
        let pick_flag = |field: fn(&PartialEscalationConfig) -> Option<bool>| {
            chain.iter().find_map(|layer| field(layer))
        };

        let defaults = EscalationConfig::default();
        EscalationConfig {
            inline_threshold_ms: pick(|l| l.inline_threshold_ms)
                .unwrap_or(defaults.inline_threshold_ms),
            overlay_threshold_ms: pick(|l| l.overlay_threshold_ms)
                .unwrap_or(defaults.overlay_threshold_ms),
            modal_threshold_ms: pick(|l| l.modal_threshold_ms)
                .unwrap_or(defaults.modal_threshold_ms),
            timeout_ms: pick(|l| l.timeout_ms).or(defaults.timeout_ms),
            inline_enabled: pick_flag(|l| l.inline_enabled).unwrap_or(defaults.inline_enabled),
            overlay_enabled: pick_flag(|l| l.overlay_enabled).unwrap_or(defaults.overlay_enabled),
            modal_enabled: pick_flag(|l| l.modal_enabled).unwrap_or(defaults.modal_enabled),
        }
    }

    /// Copy of all three layers
    pub fn export_config(&self) -> ConfigSnapshot {
        self.layers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace all three layers with the snapshot
    pub fn import_config(&self, snapshot: ConfigSnapshot) {
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        debug!(
            "Importing escalation config: {} operation types, {} components",
            snapshot.operation_types.len(),
            snapshot.components.len()
        );
        *layers = snapshot;
    }

    pub fn export_json(&self) -> EscalatorResult<String> {
        Ok(serde_json::to_string_pretty(&self.export_config())?)
    }

    pub fn import_json(&self, json: &str) -> EscalatorResult<()> {
        let snapshot: ConfigSnapshot = serde_json::from_str(json)?;
        self.import_config(snapshot);
        Ok(())
    }

    /// Forget every layer; resolution yields the built-in defaults again
    pub fn reset(&self) {
        *self.layers.write().unwrap_or_else(PoisonError::into_inner) = ConfigSnapshot::default();
    }
}

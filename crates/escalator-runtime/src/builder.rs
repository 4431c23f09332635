//! Manager Builder API
//!
//! Provides a builder-style API for hosts (CLI, UI shells, tests) to tune the
//! runtime and inject a layered config manager before creating an
//! [`OperationManager`].

use crate::managers::OperationManager;
use crate::throttle::DEFAULT_THROTTLE_INTERVAL;
use escalator_core::EscalationConfigManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

// ----------------------------------------------------------------------------
// Manager Configuration
// ----------------------------------------------------------------------------

/// Runtime tuning for an [`OperationManager`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Minimum spacing between applied progress updates of one operation
    pub throttle_interval: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
        }
    }
}

// ----------------------------------------------------------------------------
// Manager Builder
// ----------------------------------------------------------------------------

/// Builder for creating an [`OperationManager`]
#[derive(Debug, Default)]
pub struct ManagerBuilder {
    config: ManagerConfig,
    config_manager: Option<Arc<EscalationConfigManager>>,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole runtime configuration
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn throttle_interval(mut self, interval: Duration) -> Self {
        self.config.throttle_interval = interval;
        self
    }

    /// Resolve operation configs through `manager` when no explicit config
    /// is given at start
    pub fn with_config_manager(mut self, manager: Arc<EscalationConfigManager>) -> Self {
        self.config_manager = Some(manager);
        self
    }

    pub fn build(self) -> OperationManager {
        OperationManager::from_parts(self.config, self.config_manager)
    }
}

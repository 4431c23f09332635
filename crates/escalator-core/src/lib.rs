//! Escalator Core
//!
//! Foundational pieces of the escalator operation tracker that do not need a
//! running async runtime:
//! - `cancellation`: hierarchical, advisory cancellation tokens
//! - `escalation`: elapsed-time to escalation-level classification
//! - `config`: layered (global / operation type / component) escalation config
//! - `events`: the abstract event channel and the bridged progress payload
//!
//! The timer-driven operation state machine lives in `escalator-runtime`.

pub mod cancellation;
pub mod config;
pub mod errors;
pub mod escalation;
pub mod events;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use cancellation::{CancelRegistration, CancellationToken, CancellationTokenSource};
pub use config::{
    ConfigScope, ConfigSnapshot, EscalationConfig, EscalationConfigManager,
    PartialEscalationConfig,
};
pub use errors::{ConfigError, EscalatorError, EscalatorResult, OperationError};
pub use escalation::{
    calculate_escalation_level, escalation_schedule, is_timeout_error, next_escalation,
};
pub use events::{
    BridgeEvent, BridgeEventType, BridgeProgress, EventChannel, EventHandler, Unlisten,
    DEFAULT_PROGRESS_CHANNEL,
};
pub use types::{EscalationLevel, OperationStatus, ProgressState};

/// Generate a random operation id for callers without a natural key
pub fn generate_operation_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

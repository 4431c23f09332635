//! Escalator Runtime Engine
//!
//! This crate contains the timer-driven side of the escalator, including:
//! - `OperationManager`: the arena of tracked operations and their state machine
//! - `ProgressThrottle`: per-operation coalescing of progress updates
//! - `ProgressBridge`: drives operations from events on an external channel
//! - `RetryableOperation`: cancellable, retryable async work bound to an operation
//!
//! `escalator-core` provides the runtime-independent types these build on.

pub mod bridge;
pub mod builder;
pub mod managers;
pub mod retry;
pub mod throttle;

pub use bridge::ProgressBridge;
pub use builder::{ManagerBuilder, ManagerConfig};
pub use managers::*;
pub use retry::{OperationFn, RetryError, RetryableOperation};
pub use throttle::{ProgressThrottle, ThrottleDecision, ThrottleStats, DEFAULT_THROTTLE_INTERVAL};

// Re-export core types for convenience
pub use escalator_core::{
    calculate_escalation_level, generate_operation_id, BridgeEvent, BridgeEventType,
    CancellationToken, CancellationTokenSource, ConfigScope, EscalationConfig,
    EscalationConfigManager, EscalationLevel, EscalatorError, EscalatorResult, EventChannel,
    OperationError, OperationStatus, PartialEscalationConfig, ProgressState,
};

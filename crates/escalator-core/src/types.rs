//! Core types shared by every escalator crate
//!
//! Escalation levels, operation statuses and progress states are small value
//! types; they are `Copy` or cheap to clone so that snapshots can be handed to
//! listeners freely.

use core::fmt;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Escalation Level
// ----------------------------------------------------------------------------

/// How prominently feedback for an in-flight operation should be shown.
///
/// Levels are ordered: `None < Inline < Overlay < Modal`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EscalationLevel {
    /// No indicator yet
    #[default]
    None,
    /// Inline spinner next to the triggering element
    Inline,
    /// Overlay spinner covering the component
    Overlay,
    /// Modal dialog blocking the window
    Modal,
}

impl EscalationLevel {
    /// All levels in ascending order
    pub const ALL: [EscalationLevel; 4] = [
        EscalationLevel::None,
        EscalationLevel::Inline,
        EscalationLevel::Overlay,
        EscalationLevel::Modal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationLevel::None => "none",
            EscalationLevel::Inline => "inline",
            EscalationLevel::Overlay => "overlay",
            EscalationLevel::Modal => "modal",
        }
    }
}

impl fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Operation Status
// ----------------------------------------------------------------------------

/// Lifecycle status of a tracked operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// Terminal statuses are final; no transition leaves them
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Running => "running",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Progress State
// ----------------------------------------------------------------------------

/// Progress reported for an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressState {
    /// Work is happening but its extent is unknown
    Indeterminate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Known completion percentage in `0.0..=100.0`
    Determinate {
        value: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ProgressState {
    pub fn indeterminate() -> Self {
        ProgressState::Indeterminate { message: None }
    }

    /// Determinate progress; the value is clamped into `0..=100`
    pub fn determinate(value: f64) -> Self {
        ProgressState::Determinate {
            value: clamp_percent(value),
            message: None,
        }
    }

    /// Map a `current / total` pair onto a rounded percentage.
    ///
    /// A non-positive total carries no extent information and yields
    /// indeterminate progress.
    pub fn from_counts(current: f64, total: f64) -> Self {
        if total > 0.0 && current.is_finite() && total.is_finite() {
            ProgressState::determinate((current / total * 100.0).round())
        } else {
            ProgressState::indeterminate()
        }
    }

    /// Attach a message, replacing any previous one
    pub fn with_message(self, message: impl Into<String>) -> Self {
        let message = Some(message.into());
        match self {
            ProgressState::Indeterminate { .. } => ProgressState::Indeterminate { message },
            ProgressState::Determinate { value, .. } => ProgressState::Determinate { value, message },
        }
    }

    /// Percentage if determinate
    pub fn value(&self) -> Option<f64> {
        match self {
            ProgressState::Indeterminate { .. } => None,
            ProgressState::Determinate { value, .. } => Some(*value),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ProgressState::Indeterminate { message } | ProgressState::Determinate { message, .. } => {
                message.as_deref()
            }
        }
    }

    pub fn is_determinate(&self) -> bool {
        matches!(self, ProgressState::Determinate { .. })
    }
}

impl Default for ProgressState {
    fn default() -> Self {
        ProgressState::indeterminate()
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

//! External progress events
//!
//! The escalator does not own a transport. Producers in other processes or
//! layers publish [`BridgeEvent`]s as JSON through whatever event system the
//! host offers; the host exposes it to the escalator as an [`EventChannel`].

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Channel name the progress bridge listens on by default
pub const DEFAULT_PROGRESS_CHANNEL: &str = "operation-progress";

// ----------------------------------------------------------------------------
// Event Channel Capability
// ----------------------------------------------------------------------------

/// Handler invoked for every payload emitted on a channel
pub type EventHandler = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// Detaches a handler registered with [`EventChannel::listen`]
pub type Unlisten = Box<dyn FnOnce() + Send>;

/// Abstract subscribe/emit capability supplied by the host
pub trait EventChannel: Send + Sync {
    /// Register `handler` for payloads emitted on `event`
    fn listen(&self, event: &str, handler: EventHandler) -> Unlisten;

    /// Publish `payload` to every handler listening on `event`
    fn emit(&self, event: &str, payload: serde_json::Value);
}

// ----------------------------------------------------------------------------
// Bridge Payload
// ----------------------------------------------------------------------------

/// Kind of a bridged event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeEventType {
    Progress,
    Complete,
    Error,
    Cancelled,
}

/// Raw `current / total` progress as reported by a producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeProgress {
    pub current: f64,
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Wire payload carried on the progress channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeEvent {
    pub operation_id: String,
    #[serde(rename = "type")]
    pub kind: BridgeEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<BridgeProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BridgeEvent {
    pub fn progress(operation_id: impl Into<String>, current: f64, total: f64) -> Self {
        Self {
            operation_id: operation_id.into(),
            kind: BridgeEventType::Progress,
            progress: Some(BridgeProgress {
                current,
                total,
                message: None,
            }),
            result: None,
            error: None,
        }
    }

    pub fn complete(operation_id: impl Into<String>, result: Option<serde_json::Value>) -> Self {
        Self {
            operation_id: operation_id.into(),
            kind: BridgeEventType::Complete,
            progress: None,
            result,
            error: None,
        }
    }

    pub fn error(operation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            kind: BridgeEventType::Error,
            progress: None,
            result: None,
            error: Some(message.into()),
        }
    }

    pub fn cancelled(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            kind: BridgeEventType::Cancelled,
            progress: None,
            result: None,
            error: None,
        }
    }

    /// Attach a message to the progress payload
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        if let Some(progress) = self.progress.as_mut() {
            progress.message = Some(message.into());
        }
        self
    }
}

//! External progress bridge
//!
//! Feeds [`BridgeEvent`]s published on an [`EventChannel`] into an
//! [`OperationManager`], so work running elsewhere (another process, a
//! backend task) can drive operations without holding a handle.

use crate::managers::{OperationManager, StartOptions};
use escalator_core::{
    BridgeEvent, BridgeEventType, EscalatorResult, EventChannel, EventHandler, OperationError,
    ProgressState, Unlisten, DEFAULT_PROGRESS_CHANNEL,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Attaches an operation manager to a progress channel
pub struct ProgressBridge {
    manager: OperationManager,
    channel: Arc<dyn EventChannel>,
    event: String,
    unlisten: Mutex<Option<Unlisten>>,
}

impl ProgressBridge {
    /// Bridge listening on [`DEFAULT_PROGRESS_CHANNEL`]
    pub fn new(manager: OperationManager, channel: Arc<dyn EventChannel>) -> Self {
        Self {
            manager,
            channel,
            event: DEFAULT_PROGRESS_CHANNEL.to_string(),
            unlisten: Mutex::new(None),
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    fn registration(&self) -> MutexGuard<'_, Option<Unlisten>> {
        self.unlisten.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start listening; returns `false` if already attached
    pub fn start(&self) -> bool {
        let mut registration = self.registration();
        if registration.is_some() {
            return false;
        }

        let manager = self.manager.clone();
        let handler: EventHandler = Arc::new(move |payload: serde_json::Value| {
            handle_payload(&manager, payload);
        });
        *registration = Some(self.channel.listen(&self.event, handler));

        info!("Progress bridge attached to {}", self.event);
        true
    }

    /// Stop listening; returns `false` if not attached
    pub fn dispose(&self) -> bool {
        let unlisten = self.registration().take();
        match unlisten {
            Some(unlisten) => {
                unlisten();
                info!("Progress bridge detached from {}", self.event);
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.registration().is_some()
    }

    /// Publish `event` on the bridged channel
    pub fn report(&self, event: &BridgeEvent) -> EscalatorResult<()> {
        let payload = serde_json::to_value(event)?;
        self.channel.emit(&self.event, payload);
        Ok(())
    }
}

impl Drop for ProgressBridge {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn bridged_progress(event: &BridgeEvent) -> ProgressState {
    match &event.progress {
        Some(progress) => {
            let state = ProgressState::from_counts(progress.current, progress.total);
            match &progress.message {
                Some(message) => state.with_message(message.clone()),
                None => state,
            }
        }
        None => ProgressState::indeterminate(),
    }
}

fn handle_payload(manager: &OperationManager, payload: serde_json::Value) {
    let event: BridgeEvent = match serde_json::from_value(payload) {
        Ok(event) => event,
        Err(e) => {
            warn!("Ignoring malformed progress event: {}", e);
            return;
        }
    };

    let id = event.operation_id.as_str();
    let kind = event.kind;
    debug!("Bridged {:?} event for {}", kind, id);

    let outcome = match kind {
        BridgeEventType::Progress => {
            if manager.get_operation(id).is_none() {
                match manager.start_operation(StartOptions::new(id)) {
                    Ok(_) => debug!("Auto-started operation {} from bridged progress", id),
                    Err(e) => debug!("Could not auto-start {}: {}", id, e),
                }
            }
            manager.update_progress(id, bridged_progress(&event))
        }
        BridgeEventType::Complete => manager.complete(id, event.result.clone()),
        BridgeEventType::Error => {
            let message = event
                .error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string());
            manager.fail(id, OperationError::message(message))
        }
        BridgeEventType::Cancelled => manager.cancel_operation(id),
    };

    if let Err(e) = outcome {
        debug!("Ignoring bridged {:?} event for {}: {}", kind, id, e);
    }
}

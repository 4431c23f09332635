//! In-process event bus
//!
//! Delivers payloads synchronously to every handler registered on a named
//! channel, in registration order. Handlers run without the bus lock held so
//! they may emit or listen re-entrantly.

use escalator_core::{EventChannel, EventHandler, Unlisten};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{trace, warn};

#[derive(Default)]
struct BusState {
    handlers: HashMap<String, Vec<(u64, EventHandler)>>,
    next_handler_id: u64,
    stats: BusStats,
}

/// Counters describing bus traffic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    pub emitted: u64,
    pub delivered: u64,
    pub handler_panics: u64,
}

/// Synchronous, in-process [`EventChannel`]
#[derive(Clone, Default)]
pub struct LocalEventBus {
    state: Arc<Mutex<BusState>>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of handlers currently listening on `event`
    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().handlers.get(event).map_or(0, Vec::len)
    }

    pub fn stats(&self) -> BusStats {
        self.lock().stats.clone()
    }

    /// Serialize `payload` and emit it
    pub fn emit_json<T: Serialize>(&self, event: &str, payload: &T) -> serde_json::Result<()> {
        self.emit(event, serde_json::to_value(payload)?);
        Ok(())
    }
}

impl EventChannel for LocalEventBus {
    fn listen(&self, event: &str, handler: EventHandler) -> Unlisten {
        let id = {
            let mut state = self.lock();
            let id = state.next_handler_id;
            state.next_handler_id += 1;
            state
                .handlers
                .entry(event.to_string())
                .or_default()
                .push((id, handler));
            id
        };
        trace!("Handler {} listening on {}", id, event);

        let state = Arc::downgrade(&self.state);
        let event = event.to_string();
        Box::new(move || {
            let Some(state) = state.upgrade() else {
                return;
            };
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(handlers) = state.handlers.get_mut(&event) {
                handlers.retain(|(handler_id, _)| *handler_id != id);
                if handlers.is_empty() {
                    state.handlers.remove(&event);
                }
            }
        })
    }

    fn emit(&self, event: &str, payload: serde_json::Value) {
        let handlers: Vec<EventHandler> = {
            let mut state = self.lock();
            state.stats.emitted += 1;
            state
                .handlers
                .get(event)
                .map(|handlers| handlers.iter().map(|(_, h)| h.clone()).collect())
                .unwrap_or_default()
        };

        let mut delivered = 0;
        let mut panics = 0;
        for handler in handlers {
            let payload = payload.clone();
            match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    panics += 1;
                    warn!("Handler on {} panicked while handling an event", event);
                }
            }
        }

        let mut state = self.lock();
        state.stats.delivered += delivered;
        state.stats.handler_panics += panics;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn collecting_handler() -> (EventHandler, Arc<Mutex<Vec<serde_json::Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler: EventHandler = {
            let seen = seen.clone();
            Arc::new(move |payload: serde_json::Value| seen.lock().unwrap().push(payload))
        };
        (handler, seen)
    }

    #[test]
    fn test_emit_reaches_listeners_on_same_channel_only() {
        let bus = LocalEventBus::new();
        let (handler, seen) = collecting_handler();
        let (other_handler, other_seen) = collecting_handler();

        let _unlisten = bus.listen("progress", handler);
        let _other = bus.listen("status", other_handler);

        bus.emit("progress", json!({ "n": 1 }));

        assert_eq!(*seen.lock().unwrap(), vec![json!({ "n": 1 })]);
        assert!(other_seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unlisten_detaches_handler() {
        let bus = LocalEventBus::new();
        let (handler, seen) = collecting_handler();

        let unlisten = bus.listen("progress", handler);
        assert_eq!(bus.listener_count("progress"), 1);
        unlisten();
        assert_eq!(bus.listener_count("progress"), 0);

        bus.emit("progress", json!(null));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_panicking_handler_does_not_block_others() {
        let bus = LocalEventBus::new();
        let (handler, seen) = collecting_handler();

        let failing: EventHandler = Arc::new(|_: serde_json::Value| panic!("handler failure"));
        let _first = bus.listen("progress", failing);
        let _second = bus.listen("progress", handler);

        bus.emit("progress", json!(1));

        assert_eq!(seen.lock().unwrap().len(), 1);
        let stats = bus.stats();
        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.handler_panics, 1);
    }
}

//! Recording sink for listener callbacks
//!
//! Tests and the CLI subscribe a [`Recorder`] to an operation and inspect the
//! sequence of states it observed afterwards.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Thread-safe, cloneable log of observed values
#[derive(Debug)]
pub struct Recorder<T> {
    entries: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, value: T) {
        self.lock().push(value);
    }

    /// Callback that clones every observed value into the log
    pub fn sink(&self) -> impl Fn(&T) + Send + Sync + 'static {
        let entries = self.entries.clone();
        move |value: &T| {
            entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(value.clone());
        }
    }

    /// Copy of everything recorded so far
    pub fn entries(&self) -> Vec<T> {
        self.lock().clone()
    }

    pub fn last(&self) -> Option<T> {
        self.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_shares_log_with_recorder() {
        let recorder = Recorder::new();
        let sink = recorder.sink();

        sink(&1);
        sink(&2);
        recorder.record(3);

        assert_eq!(recorder.entries(), vec![1, 2, 3]);
        assert_eq!(recorder.last(), Some(3));

        recorder.clear();
        assert!(recorder.is_empty());
    }
}

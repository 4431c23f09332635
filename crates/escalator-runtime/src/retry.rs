//! Retry-capable operation wrapper
//!
//! [`RetryableOperation`] couples an async unit of work with a tracked
//! operation and a fresh [`CancellationToken`] per attempt. It remembers the
//! latest result and error so a UI can offer "retry" after a failure.
//!
//! Attempts are numbered; a settlement only counts while its attempt is still
//! the active one. Cancelling or starting a new attempt makes the previous
//! one's eventual outcome irrelevant.

use crate::managers::{Operation, OperationHandle, OperationManager, StartOptions, Subscription};
use escalator_core::{
    CancellationToken, EscalatorError, EscalatorResult, OperationError, OperationStatus,
    ProgressState,
};
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Async work invoked once per attempt
pub type OperationFn<T> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<T, OperationError>> + Send + Sync>;

type SuccessCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&OperationError) + Send + Sync>;
type CancelCallback = Arc<dyn Fn() + Send + Sync>;

/// Why an attempt produced no value
#[derive(Debug, Clone, thiserror::Error)]
pub enum RetryError {
    #[error("{0}")]
    Failed(#[from] OperationError),

    #[error("Attempt was cancelled")]
    Cancelled,

    #[error("Attempt was superseded by a newer one")]
    Superseded,

    #[error("Failed to track attempt: {0}")]
    Tracking(String),
}

impl From<EscalatorError> for RetryError {
    fn from(error: EscalatorError) -> Self {
        RetryError::Tracking(error.to_string())
    }
}

struct ActiveAttempt {
    attempt: u64,
    token: CancellationToken,
    handle: OperationHandle,
    timeout_watch: Subscription,
}

struct RetryState<T> {
    attempts: u64,
    active: Option<ActiveAttempt>,
    cancelled_attempt: Option<u64>,
    is_cancelled: bool,
    result: Option<T>,
    error: Option<OperationError>,
}

impl<T> Default for RetryState<T> {
    fn default() -> Self {
        Self {
            attempts: 0,
            active: None,
            cancelled_attempt: None,
            is_cancelled: false,
            result: None,
            error: None,
        }
    }
}

fn lock_state<T>(state: &Mutex<RetryState<T>>) -> MutexGuard<'_, RetryState<T>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn invoke_isolated(operation_id: &str, name: &str, callback: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        warn!("{} callback for operation {} panicked", name, operation_id);
    }
}

/// Async work that can be executed, cancelled and retried
pub struct RetryableOperation<T> {
    manager: OperationManager,
    options: StartOptions,
    operation: OperationFn<T>,
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
    on_cancel: Option<CancelCallback>,
    state: Arc<Mutex<RetryState<T>>>,
}

impl<T> RetryableOperation<T>
where
    T: Clone + Send + 'static,
{
    /// Wrap `operation`; each attempt is tracked under `options.id`
    pub fn new<F, Fut>(manager: OperationManager, options: StartOptions, operation: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, OperationError>> + Send + 'static,
    {
        Self {
            manager,
            options,
            operation: Arc::new(move |token| operation(token).boxed()),
            on_success: None,
            on_error: None,
            on_cancel: None,
            state: Arc::new(Mutex::new(RetryState::default())),
        }
    }

    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&OperationError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn on_cancel<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_cancel = Some(Arc::new(callback));
        self
    }

    pub fn operation_id(&self) -> &str {
        &self.options.id
    }

    fn lock(&self) -> MutexGuard<'_, RetryState<T>> {
        lock_state(&self.state)
    }

    /// Begin a new attempt
    ///
    /// The work is invoked before this returns; the future resolves with the
    /// attempt's outcome. A still-running earlier attempt is cancelled and
    /// resolves with [`RetryError::Superseded`].
    pub fn execute(&self) -> impl Future<Output = Result<T, RetryError>> + Send + 'static {
        let begun = self.begin_attempt();
        let settlement = Settlement {
            operation_id: self.options.id.clone(),
            state: self.state.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
        };

        async move {
            let (attempt, work) = begun?;
            let outcome = work.await;
            settlement.settle(attempt, outcome)
        }
    }

    /// Clear the previous error, then execute again
    pub fn retry(&self) -> impl Future<Output = Result<T, RetryError>> + Send + 'static {
        self.lock().error = None;
        debug!("Retrying operation {}", self.options.id);
        self.execute()
    }

    /// Cancel the running attempt
    ///
    /// Returns `false` when nothing is running. The cancel callback fires at
    /// most once per attempt.
    pub fn cancel(&self) -> bool {
        let active = {
            let mut state = self.lock();
            let active = state.active.take();
            if let Some(active) = &active {
                state.is_cancelled = true;
                state.cancelled_attempt = Some(active.attempt);
            }
            active
        };
        let Some(active) = active else {
            return false;
        };

        active.timeout_watch.unsubscribe();
        active.token.cancel();
        if let Err(e) = active.handle.cancel() {
            debug!("Tracked operation {} not cancelled: {}", self.options.id, e);
        }

        if let Some(callback) = &self.on_cancel {
            invoke_isolated(&self.options.id, "Cancel", || callback());
        }
        true
    }

    /// Forward progress to the running attempt
    pub fn update_progress(&self, progress: ProgressState) -> EscalatorResult<()> {
        let handle = self
            .lock()
            .active
            .as_ref()
            .map(|active| active.handle.clone());
        match handle {
            Some(handle) => handle.update_progress(progress),
            None => Err(EscalatorError::OperationNotFound {
                id: self.options.id.clone(),
            }),
        }
    }

    /// Number of attempts started so far
    pub fn attempts(&self) -> u64 {
        self.lock().attempts
    }

    pub fn is_running(&self) -> bool {
        self.lock().active.is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().is_cancelled
    }

    pub fn result(&self) -> Option<T> {
        self.lock().result.clone()
    }

    pub fn error(&self) -> Option<OperationError> {
        self.lock().error.clone()
    }

    /// Token of the running attempt
    pub fn token(&self) -> Option<CancellationToken> {
        self.lock().active.as_ref().map(|active| active.token.clone())
    }

    fn begin_attempt(
        &self,
    ) -> Result<(u64, BoxFuture<'static, Result<T, OperationError>>), RetryError> {
        let (attempt, previous) = {
            let mut state = self.lock();
            state.attempts += 1;
            state.is_cancelled = false;
            state.error = None;
            (state.attempts, state.active.take())
        };

        if let Some(previous) = previous {
            debug!(
                "Attempt {} of {} superseded",
                previous.attempt, self.options.id
            );
            previous.timeout_watch.unsubscribe();
            previous.token.cancel();
            if let Err(e) = previous.handle.cancel() {
                debug!("Superseded operation {} not cancelled: {}", self.options.id, e);
            }
        }

        let handle = self.manager.start_operation(self.options.clone())?;
        let token = CancellationToken::new();

        // A timed-out or externally cancelled operation asks the work to stop
        let timeout_watch = {
            let token = token.clone();
            let state = Arc::downgrade(&self.state);
            let on_cancel = self.on_cancel.clone();
            let operation_id = self.options.id.clone();
            handle.subscribe(move |operation: &Operation| match operation.status {
                OperationStatus::Failed => {
                    if operation.error.as_ref().is_some_and(OperationError::is_timeout) {
                        token.cancel();
                    }
                }
                OperationStatus::Cancelled => {
                    let Some(state) = state.upgrade() else {
                        return;
                    };
                    let active = {
                        let mut state = lock_state(&state);
                        match state.active.take() {
                            Some(active) if active.attempt == attempt => {
                                state.is_cancelled = true;
                                state.cancelled_attempt = Some(attempt);
                                Some(active)
                            }
                            other => {
                                state.active = other;
                                None
                            }
                        }
                    };
                    let Some(active) = active else {
                        return;
                    };

                    debug!("Attempt {} of {} cancelled by its tracker", attempt, operation_id);
                    active.timeout_watch.unsubscribe();
                    active.token.cancel();
                    if let Some(callback) = &on_cancel {
                        invoke_isolated(&operation_id, "Cancel", || callback());
                    }
                }
                _ => {}
            })
        };

        self.lock().active = Some(ActiveAttempt {
            attempt,
            token: token.clone(),
            handle,
            timeout_watch,
        });

        debug!("Attempt {} of {} started", attempt, self.options.id);
        Ok((attempt, (self.operation)(token)))
    }
}

/// Everything an in-flight attempt needs to record its outcome
struct Settlement<T> {
    operation_id: String,
    state: Arc<Mutex<RetryState<T>>>,
    on_success: Option<SuccessCallback<T>>,
    on_error: Option<ErrorCallback>,
}

impl<T: Clone> Settlement<T> {
    fn settle(self, attempt: u64, outcome: Result<T, OperationError>) -> Result<T, RetryError> {
        let active = {
            let mut state = lock_state(&self.state);
            match state.active.take() {
                Some(active) if active.attempt == attempt => active,
                other => {
                    state.active = other;
                    return Err(if state.cancelled_attempt == Some(attempt) {
                        RetryError::Cancelled
                    } else {
                        RetryError::Superseded
                    });
                }
            }
        };
        active.timeout_watch.unsubscribe();

        // A timeout recorded by the manager outranks whatever the work returned
        let timed_out = active
            .handle
            .snapshot()
            .filter(|operation| operation.status == OperationStatus::Failed)
            .and_then(|operation| operation.error);
        let outcome = match timed_out {
            Some(error) => Err(error),
            None => outcome,
        };

        let tracked = match &outcome {
            Ok(_) => active.handle.complete(None),
            Err(error) => active.handle.fail(error.clone()),
        };
        if let Err(e) = tracked {
            debug!("Tracked operation {} already settled: {}", self.operation_id, e);
        }

        {
            let mut state = lock_state(&self.state);
            match &outcome {
                Ok(value) => {
                    state.result = Some(value.clone());
                    state.error = None;
                }
                Err(error) => state.error = Some(error.clone()),
            }
        }

        match outcome {
            Ok(value) => {
                if let Some(callback) = &self.on_success {
                    invoke_isolated(&self.operation_id, "Success", || callback(&value));
                }
                Ok(value)
            }
            Err(error) => {
                if let Some(callback) = &self.on_error {
                    invoke_isolated(&self.operation_id, "Error", || callback(&error));
                }
                Err(RetryError::Failed(error))
            }
        }
    }
}

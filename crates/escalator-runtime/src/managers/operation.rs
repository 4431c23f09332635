//! Operation manager for the escalator runtime
//!
//! Tracks every started operation in an arena keyed by id. Each record owns
//! the timer tasks that escalate it and time it out; any terminal transition
//! aborts them, so a finished operation is inert.

use crate::builder::{ManagerBuilder, ManagerConfig};
use crate::throttle::{ProgressThrottle, ThrottleDecision};
use escalator_core::{
    escalation_schedule, ConfigScope, EscalationConfig, EscalationConfigManager,
    EscalationLevel, EscalatorError, EscalatorResult, OperationError, OperationStatus,
    ProgressState,
};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

// ----------------------------------------------------------------------------
// Operation Snapshot
// ----------------------------------------------------------------------------

/// Immutable view of an operation at one point in time
#[derive(Debug, Clone)]
pub struct Operation {
    pub id: String,
    pub status: OperationStatus,
    pub progress: ProgressState,
    pub escalation_level: EscalationLevel,
    pub error: Option<OperationError>,
    pub result: Option<serde_json::Value>,
    pub started_at: Instant,
    pub finished_at: Option<Instant>,
    pub parent_id: Option<String>,
    /// Resolved config the operation was started with
    pub config: EscalationConfig,
}

impl Operation {
    /// Time spent running; stops advancing once finished
    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.started_at)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Parameters for [`OperationManager::start_operation`]
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub id: String,
    /// Explicit config; bypasses layered resolution when set
    pub config: Option<EscalationConfig>,
    /// Scope used to resolve config through the injected config manager
    pub scope: ConfigScope,
    pub parent_id: Option<String>,
}

impl StartOptions {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn config(mut self, config: EscalationConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn operation_type(mut self, operation_type: impl Into<String>) -> Self {
        self.scope = self.scope.operation_type(operation_type);
        self
    }

    pub fn component(mut self, component_id: impl Into<String>) -> Self {
        self.scope = self.scope.component(component_id);
        self
    }

    pub fn parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Callback receiving every state change of one operation
pub type OperationListener = Arc<dyn Fn(&Operation) + Send + Sync>;

// ----------------------------------------------------------------------------
// Internal State
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum TimerKind {
    Escalate(EscalationLevel),
    Timeout { duration_ms: u64 },
    FlushProgress,
}

enum Outcome {
    Completed(Option<serde_json::Value>),
    Failed(OperationError),
    Cancelled,
}

struct OperationRecord {
    snapshot: Operation,
    /// Distinguishes a restarted id from the finished operation it replaced
    instance: u64,
    timers: Vec<AbortHandle>,
    throttle: ProgressThrottle,
    children: Vec<String>,
}

impl OperationRecord {
    fn abort_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

impl Drop for OperationRecord {
    fn drop(&mut self) {
        self.abort_timers();
    }
}

#[derive(Default)]
struct ManagerState {
    operations: HashMap<String, OperationRecord>,
    listeners: HashMap<String, Vec<(u64, OperationListener)>>,
    next_instance: u64,
    next_listener_id: u64,
}

struct ManagerInner {
    state: Mutex<ManagerState>,
    config: ManagerConfig,
    config_manager: Option<Arc<EscalationConfigManager>>,
}

// ----------------------------------------------------------------------------
// Operation Manager
// ----------------------------------------------------------------------------

/// Owns the lifecycle of tracked operations
///
/// Cloning is cheap and yields another handle to the same arena. Starting an
/// operation spawns tokio timers, so it must happen inside a tokio runtime.
#[derive(Clone)]
pub struct OperationManager {
    inner: Arc<ManagerInner>,
}

impl OperationManager {
    /// Manager with default tuning and no layered config
    pub fn new() -> Self {
        ManagerBuilder::new().build()
    }

    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    pub(crate) fn from_parts(
        config: ManagerConfig,
        config_manager: Option<Arc<EscalationConfigManager>>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                state: Mutex::new(ManagerState::default()),
                config,
                config_manager,
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn config_manager(&self) -> Option<&Arc<EscalationConfigManager>> {
        self.inner.config_manager.as_ref()
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve_config(&self, options: &StartOptions) -> EscalationConfig {
        if let Some(config) = &options.config {
            return config.clone();
        }
        match &self.inner.config_manager {
            Some(manager) => manager.resolve_config(&options.scope),
            None => EscalationConfig::default(),
        }
    }

    /// Start tracking a new operation
    ///
    /// An id may be reused once its previous operation has finished; the old
    /// record is replaced and its handles go stale.
    pub fn start_operation(&self, options: StartOptions) -> EscalatorResult<OperationHandle> {
        let config = self.resolve_config(&options);
        config.validate()?;

        let StartOptions { id, parent_id, .. } = options;
        let started_at = Instant::now();

        let (handle, snapshot) = {
            let mut state = self.lock();

            if let Some(existing) = state.operations.get(&id) {
                if !existing.snapshot.status.is_terminal() {
                    return Err(EscalatorError::DuplicateOperation { id });
                }
                debug!("Replacing finished operation {}", id);
                state.operations.remove(&id);
            }

            state.next_instance += 1;
            let instance = state.next_instance;

            let mut timers = Vec::new();
            for (level, threshold) in escalation_schedule(&config) {
                timers.push(self.spawn_timer(
                    &id,
                    instance,
                    started_at + threshold,
                    TimerKind::Escalate(level),
                ));
            }
            if let Some(duration_ms) = config.timeout_ms {
                timers.push(self.spawn_timer(
                    &id,
                    instance,
                    started_at + Duration::from_millis(duration_ms),
                    TimerKind::Timeout { duration_ms },
                ));
            }

            if let Some(parent) = parent_id
                .as_ref()
                .and_then(|parent_id| state.operations.get_mut(parent_id))
            {
                if !parent.children.contains(&id) {
                    parent.children.push(id.clone());
                }
            }

            let snapshot = Operation {
                id: id.clone(),
                status: OperationStatus::Running,
                progress: ProgressState::indeterminate(),
                escalation_level: EscalationLevel::None,
                error: None,
                result: None,
                started_at,
                finished_at: None,
                parent_id,
                config,
            };

            state.operations.insert(
                id.clone(),
                OperationRecord {
                    snapshot: snapshot.clone(),
                    instance,
                    timers,
                    throttle: ProgressThrottle::new(self.inner.config.throttle_interval),
                    children: Vec::new(),
                },
            );

            let handle = OperationHandle {
                manager: self.clone(),
                id,
                instance,
            };
            (handle, snapshot)
        };

        debug!("Started operation {}", snapshot.id);
        self.notify(&snapshot);
        Ok(handle)
    }

    /// Submit a progress update for `id`; throttled per operation
    pub fn update_progress(&self, id: &str, progress: ProgressState) -> EscalatorResult<()> {
        self.submit_progress(id, None, progress)
    }

    /// Finish `id` successfully; `result` is stored as given
    pub fn complete(&self, id: &str, result: Option<serde_json::Value>) -> EscalatorResult<()> {
        self.finish(id, None, Outcome::Completed(result))
    }

    /// Finish `id` with an error
    pub fn fail(&self, id: &str, error: impl Into<OperationError>) -> EscalatorResult<()> {
        self.finish(id, None, Outcome::Failed(error.into()))
    }

    /// Cancel `id` alone; parents and children are left untouched
    pub fn cancel_operation(&self, id: &str) -> EscalatorResult<()> {
        self.finish(id, None, Outcome::Cancelled)
    }

    /// Listen to every state change of `id`
    ///
    /// The id does not need to exist yet. Dropping the [`Subscription`] does
    /// not detach the listener; call [`Subscription::unsubscribe`].
    pub fn subscribe<F>(&self, id: &str, listener: F) -> Subscription
    where
        F: Fn(&Operation) + Send + Sync + 'static,
    {
        let listener_id = {
            let mut state = self.lock();
            let listener_id = state.next_listener_id;
            state.next_listener_id += 1;
            state
                .listeners
                .entry(id.to_string())
                .or_default()
                .push((listener_id, Arc::new(listener)));
            listener_id
        };

        Subscription {
            manager: Arc::downgrade(&self.inner),
            operation_id: id.to_string(),
            listener_id,
        }
    }

    pub fn get_operation(&self, id: &str) -> Option<Operation> {
        self.lock()
            .operations
            .get(id)
            .map(|record| record.snapshot.clone())
    }

    /// Ids of operations started with `id` as their parent
    pub fn children_of(&self, id: &str) -> Vec<String> {
        self.lock()
            .operations
            .get(id)
            .map(|record| record.children.clone())
            .unwrap_or_default()
    }

    /// Snapshots of every running operation, oldest first
    pub fn active_operations(&self) -> Vec<Operation> {
        let mut active: Vec<Operation> = self
            .lock()
            .operations
            .values()
            .filter(|record| !record.snapshot.status.is_terminal())
            .map(|record| record.snapshot.clone())
            .collect();
        active.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        active
    }

    pub fn operation_count(&self) -> usize {
        self.lock().operations.len()
    }

    /// Drop the record of a finished operation, its listeners and its entry
    /// in the parent's children
    pub fn remove_operation(&self, id: &str) -> EscalatorResult<Operation> {
        let mut state = self.lock();
        let running = match state.operations.get(id) {
            Some(record) => !record.snapshot.status.is_terminal(),
            None => {
                return Err(EscalatorError::OperationNotFound { id: id.to_string() });
            }
        };
        if running {
            return Err(EscalatorError::OperationRunning { id: id.to_string() });
        }

        let record = state
            .operations
            .remove(id)
            .ok_or_else(|| EscalatorError::OperationNotFound { id: id.to_string() })?;
        if let Some(parent) = record
            .snapshot
            .parent_id
            .as_ref()
            .and_then(|parent_id| state.operations.get_mut(parent_id))
        {
            parent.children.retain(|child| child != id);
        }
        state.listeners.remove(id);
        Ok(record.snapshot.clone())
    }

    /// Abort every timer and forget all operations and listeners
    pub fn dispose(&self) {
        let (operations, listeners) = {
            let mut state = self.lock();
            (
                std::mem::take(&mut state.operations),
                std::mem::take(&mut state.listeners),
            )
        };
        let count = operations.len();
        drop(operations);
        drop(listeners);
        info!("Operation manager disposed, dropped {} operations", count);
    }

    // ------------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------------

    fn running_record<'a>(
        state: &'a mut ManagerState,
        id: &str,
        instance: Option<u64>,
    ) -> EscalatorResult<&'a mut OperationRecord> {
        let record = state
            .operations
            .get_mut(id)
            .filter(|record| instance.map_or(true, |instance| record.instance == instance))
            .ok_or_else(|| EscalatorError::OperationNotFound { id: id.to_string() })?;

        if record.snapshot.status.is_terminal() {
            return Err(EscalatorError::OperationFinished {
                id: id.to_string(),
                status: record.snapshot.status.to_string(),
            });
        }
        Ok(record)
    }

    fn submit_progress(
        &self,
        id: &str,
        instance: Option<u64>,
        progress: ProgressState,
    ) -> EscalatorResult<()> {
        let snapshot = {
            let mut state = self.lock();
            let record = Self::running_record(&mut state, id, instance)?;

            match record.throttle.submit(progress, Instant::now()) {
                ThrottleDecision::Apply(progress) => {
                    record.snapshot.progress = progress;
                    Some(record.snapshot.clone())
                }
                ThrottleDecision::Deferred {
                    flush_at,
                    schedule_flush,
                } => {
                    if schedule_flush {
                        let timer =
                            self.spawn_timer(id, record.instance, flush_at, TimerKind::FlushProgress);
                        record.timers.retain(|timer| !timer.is_finished());
                        record.timers.push(timer);
                    }
                    None
                }
            }
        };

        if let Some(snapshot) = snapshot {
            self.notify(&snapshot);
        }
        Ok(())
    }

    fn finish(&self, id: &str, instance: Option<u64>, outcome: Outcome) -> EscalatorResult<()> {
        let snapshot = {
            let mut state = self.lock();
            let record = Self::running_record(&mut state, id, instance)?;
            record.abort_timers();

            // Last submitted progress wins even if its window never closed
            if let Some(progress) = record.throttle.take_pending() {
                record.snapshot.progress = progress;
            }

            let operation = &mut record.snapshot;
            match outcome {
                Outcome::Completed(result) => {
                    operation.status = OperationStatus::Completed;
                    operation.result = result;
                }
                Outcome::Failed(error) => {
                    operation.status = OperationStatus::Failed;
                    operation.error = Some(error);
                }
                Outcome::Cancelled => operation.status = OperationStatus::Cancelled,
            }
            operation.finished_at = Some(Instant::now());
            operation.clone()
        };

        debug!(
            "Operation {} {} at escalation level {}",
            snapshot.id, snapshot.status, snapshot.escalation_level
        );
        self.notify(&snapshot);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Timers
    // ------------------------------------------------------------------------

    fn spawn_timer(&self, id: &str, instance: u64, deadline: Instant, kind: TimerKind) -> AbortHandle {
        let manager = Arc::downgrade(&self.inner);
        let id = id.to_string();

        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = manager.upgrade() {
                OperationManager { inner }.fire_timer(&id, instance, kind);
            }
        })
        .abort_handle()
    }

    fn fire_timer(&self, id: &str, instance: u64, kind: TimerKind) {
        match kind {
            TimerKind::Escalate(level) => self.escalate(id, instance, level),
            TimerKind::Timeout { duration_ms } => {
                let error = OperationError::Timeout { duration_ms };
                match self.finish(id, Some(instance), Outcome::Failed(error)) {
                    Ok(()) => warn!("Operation {} timed out after {}ms", id, duration_ms),
                    Err(e) => debug!("Timeout for {} skipped: {}", id, e),
                }
            }
            TimerKind::FlushProgress => self.flush_progress(id, instance),
        }
    }

    fn escalate(&self, id: &str, instance: u64, level: EscalationLevel) {
        let snapshot = {
            let mut state = self.lock();
            let Ok(record) = Self::running_record(&mut state, id, Some(instance)) else {
                return;
            };
            if record.snapshot.escalation_level >= level {
                return;
            }
            record.snapshot.escalation_level = level;
            record.snapshot.clone()
        };

        debug!("Operation {} escalated to {}", id, level);
        self.notify(&snapshot);
    }

    fn flush_progress(&self, id: &str, instance: u64) {
        let snapshot = {
            let mut state = self.lock();
            let Ok(record) = Self::running_record(&mut state, id, Some(instance)) else {
                return;
            };
            let Some(progress) = record.throttle.flush(Instant::now()) else {
                return;
            };
            record.snapshot.progress = progress;
            record.snapshot.clone()
        };

        self.notify(&snapshot);
    }

    // ------------------------------------------------------------------------
    // Notification
    // ------------------------------------------------------------------------

    fn notify(&self, snapshot: &Operation) {
        let listeners: Vec<OperationListener> = self
            .lock()
            .listeners
            .get(&snapshot.id)
            .map(|listeners| listeners.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();

        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(snapshot))).is_err() {
                warn!("Listener for operation {} panicked", snapshot.id);
            }
        }
    }

    fn snapshot_of(&self, id: &str, instance: u64) -> Option<Operation> {
        self.lock()
            .operations
            .get(id)
            .filter(|record| record.instance == instance)
            .map(|record| record.snapshot.clone())
    }
}

impl Default for OperationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OperationManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationManager")
            .field("config", &self.inner.config)
            .field("operations", &self.operation_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Subscription
// ----------------------------------------------------------------------------

/// Registration returned by [`OperationManager::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    manager: Weak<ManagerInner>,
    operation_id: String,
    listener_id: u64,
}

impl Subscription {
    /// Detach this listener; safe to call more than once
    pub fn unsubscribe(&self) {
        let Some(inner) = self.manager.upgrade() else {
            return;
        };
        let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(listeners) = state.listeners.get_mut(&self.operation_id) {
            listeners.retain(|(id, _)| *id != self.listener_id);
            if listeners.is_empty() {
                state.listeners.remove(&self.operation_id);
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Operation Handle
// ----------------------------------------------------------------------------

/// Control surface for one started operation
///
/// Bound to the operation instance it was created for: once the id is
/// restarted, calls through an old handle fail with `OperationNotFound`.
#[derive(Clone)]
pub struct OperationHandle {
    manager: OperationManager,
    id: String,
    instance: u64,
}

impl OperationHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn update_progress(&self, progress: ProgressState) -> EscalatorResult<()> {
        self.manager.submit_progress(&self.id, Some(self.instance), progress)
    }

    /// Report `current` out of `total` units of work
    pub fn report(&self, current: f64, total: f64) -> EscalatorResult<()> {
        self.update_progress(ProgressState::from_counts(current, total))
    }

    pub fn complete(&self, result: Option<serde_json::Value>) -> EscalatorResult<()> {
        self.manager
            .finish(&self.id, Some(self.instance), Outcome::Completed(result))
    }

    pub fn fail(&self, error: impl Into<OperationError>) -> EscalatorResult<()> {
        self.manager
            .finish(&self.id, Some(self.instance), Outcome::Failed(error.into()))
    }

    pub fn cancel(&self) -> EscalatorResult<()> {
        self.manager
            .finish(&self.id, Some(self.instance), Outcome::Cancelled)
    }

    pub fn snapshot(&self) -> Option<Operation> {
        self.manager.snapshot_of(&self.id, self.instance)
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Operation) + Send + Sync + 'static,
    {
        self.manager.subscribe(&self.id, listener)
    }

    pub fn manager(&self) -> &OperationManager {
        &self.manager
    }
}

impl fmt::Debug for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use escalator_core::PartialEscalationConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_start_initial_state() {
        let manager = OperationManager::new();
        let handle = manager.start_operation(StartOptions::new("save")).unwrap();

        let op = handle.snapshot().unwrap();
        assert_eq!(op.status, OperationStatus::Running);
        assert_eq!(op.escalation_level, EscalationLevel::None);
        assert_eq!(op.progress, ProgressState::indeterminate());
        assert_eq!(op.config, EscalationConfig::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_running_id_rejected() {
        let manager = OperationManager::new();
        manager.start_operation(StartOptions::new("save")).unwrap();

        let err = manager.start_operation(StartOptions::new("save")).unwrap_err();
        assert!(matches!(err, EscalatorError::DuplicateOperation { id } if id == "save"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_id_can_be_restarted_and_old_handle_goes_stale() {
        let manager = OperationManager::new();
        let first = manager.start_operation(StartOptions::new("save")).unwrap();
        first.complete(None).unwrap();

        let second = manager.start_operation(StartOptions::new("save")).unwrap();
        assert!(first.snapshot().is_none());
        assert!(matches!(
            first.cancel(),
            Err(EscalatorError::OperationNotFound { .. })
        ));
        assert_eq!(second.snapshot().unwrap().status, OperationStatus::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_explicit_config_rejected() {
        let manager = OperationManager::new();
        let options = StartOptions::new("bad").config(EscalationConfig::with_thresholds(500, 400, 900));

        assert!(matches!(
            manager.start_operation(options),
            Err(EscalatorError::InvalidConfig(_))
        ));
        assert!(manager.get_operation("bad").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_resolves_through_injected_config_manager() {
        let configs = Arc::new(EscalationConfigManager::new());
        configs.set_operation_type_config(
            "network",
            PartialEscalationConfig::new().inline_threshold_ms(50),
        );
        let manager = OperationManager::builder()
            .with_config_manager(configs)
            .build();

        let handle = manager
            .start_operation(StartOptions::new("fetch").operation_type("network"))
            .unwrap();
        assert_eq!(handle.snapshot().unwrap().config.inline_threshold_ms, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_calls_are_refused() {
        let manager = OperationManager::new();
        let handle = manager.start_operation(StartOptions::new("save")).unwrap();
        handle.complete(Some(json!({"bytes": 12}))).unwrap();

        assert!(matches!(
            handle.fail("late"),
            Err(EscalatorError::OperationFinished { status, .. }) if status == "completed"
        ));
        assert!(handle.update_progress(ProgressState::determinate(10.0)).is_err());

        let op = handle.snapshot().unwrap();
        assert_eq!(op.result, Some(json!({"bytes": 12})));
        assert!(op.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_operation() {
        let manager = OperationManager::new();
        assert!(matches!(
            manager.cancel_operation("ghost"),
            Err(EscalatorError::OperationNotFound { .. })
        ));
        assert!(manager.get_operation("ghost").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_children_and_remove() {
        let manager = OperationManager::new();
        let parent = manager.start_operation(StartOptions::new("batch")).unwrap();
        manager
            .start_operation(StartOptions::new("item-1").parent("batch"))
            .unwrap();
        manager
            .start_operation(StartOptions::new("item-2").parent("batch"))
            .unwrap();

        assert_eq!(manager.children_of("batch"), vec!["item-1", "item-2"]);
        assert_eq!(manager.active_operations().len(), 3);

        assert!(matches!(
            manager.remove_operation("batch"),
            Err(EscalatorError::OperationRunning { .. })
        ));
        parent.cancel().unwrap();

        // Cancelling a parent leaves its children running
        assert_eq!(
            manager.get_operation("item-1").unwrap().status,
            OperationStatus::Running
        );

        let removed = manager.remove_operation("batch").unwrap();
        assert_eq!(removed.status, OperationStatus::Cancelled);
        assert_eq!(manager.operation_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_prunes_parent_link_and_listeners() {
        let manager = OperationManager::new();
        manager.start_operation(StartOptions::new("batch")).unwrap();
        let item = manager
            .start_operation(StartOptions::new("item-1").parent("batch"))
            .unwrap();
        manager
            .start_operation(StartOptions::new("item-2").parent("batch"))
            .unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        manager.subscribe("item-1", move |_: &Operation| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        item.complete(None).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        manager.remove_operation("item-1").unwrap();

        assert_eq!(manager.children_of("batch"), vec!["item-2"]);
        assert_eq!(manager.lock().listeners.len(), 0);

        // A new operation under the same id starts without the old listener
        manager.start_operation(StartOptions::new("item-1")).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_clears_everything() {
        let manager = OperationManager::new();
        manager.start_operation(StartOptions::new("a")).unwrap();
        manager.start_operation(StartOptions::new("b")).unwrap();

        manager.dispose();
        assert_eq!(manager.operation_count(), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(manager.get_operation("a").is_none());
    }
}

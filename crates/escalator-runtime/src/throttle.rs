//! Progress Throttling
//!
//! Bounds how often progress updates are applied to an operation so that a
//! renderer is never asked to repaint faster than a display frame. Updates
//! arriving inside the current window are coalesced: only the newest one is
//! kept and applied when the window closes (trailing edge), so the last value
//! of a burst is always observed even when intermediate values are dropped.
//!
//! The throttle is pure bookkeeping; the caller supplies the clock and runs
//! the flush when told to.

use escalator_core::ProgressState;
use std::time::Duration;
use tokio::time::Instant;

/// One display frame at 60 Hz
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_micros(16_667);

/// Outcome of submitting an update
#[derive(Debug, Clone, PartialEq)]
pub enum ThrottleDecision {
    /// Apply this update now
    Apply(ProgressState),
    /// Held back until `flush_at`; `schedule_flush` is set for the first
    /// deferral of a window only
    Deferred {
        flush_at: Instant,
        schedule_flush: bool,
    },
}

/// Per-operation throttle state
#[derive(Debug)]
pub struct ProgressThrottle {
    interval: Duration,
    last_applied: Option<Instant>,
    pending: Option<ProgressState>,
    flush_scheduled: bool,
    stats: ThrottleStats,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_applied: None,
            pending: None,
            flush_scheduled: false,
            stats: ThrottleStats::default(),
        }
    }

    /// Submit an update observed at `now`
    pub fn submit(&mut self, progress: ProgressState, now: Instant) -> ThrottleDecision {
        self.stats.submitted += 1;

        match self.last_applied {
            Some(last) if now.duration_since(last) < self.interval => {
                if self.pending.replace(progress).is_some() {
                    self.stats.coalesced += 1;
                }
                let schedule_flush = !self.flush_scheduled;
                self.flush_scheduled = true;
                ThrottleDecision::Deferred {
                    flush_at: last + self.interval,
                    schedule_flush,
                }
            }
            _ => {
                // A newer value supersedes anything still waiting
                if self.pending.take().is_some() {
                    self.stats.coalesced += 1;
                }
                // A flush timer from the previous window may still be queued;
                // the next deferral schedules its own and `flush` skips the stale one
                self.flush_scheduled = false;
                self.last_applied = Some(now);
                self.stats.applied += 1;
                ThrottleDecision::Apply(progress)
            }
        }
    }

    /// Trailing-edge flush; returns the held update, if any
    ///
    /// A flush arriving before the current window closes belongs to an
    /// earlier window and is ignored.
    pub fn flush(&mut self, now: Instant) -> Option<ProgressState> {
        if self
            .last_applied
            .is_some_and(|last| now.duration_since(last) < self.interval)
        {
            return None;
        }
        self.flush_scheduled = false;
        let progress = self.pending.take()?;
        self.last_applied = Some(now);
        self.stats.applied += 1;
        Some(progress)
    }

    /// Drain the held update without starting a new window
    pub fn take_pending(&mut self) -> Option<ProgressState> {
        self.flush_scheduled = false;
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stats(&self) -> ThrottleStats {
        self.stats.clone()
    }
}

impl Default for ProgressThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_INTERVAL)
    }
}

/// Throttling statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThrottleStats {
    pub submitted: u64,
    pub applied: u64,
    pub coalesced: u64,
}

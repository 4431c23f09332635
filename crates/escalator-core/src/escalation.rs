//! Escalation and timeout classification
//!
//! Pure functions mapping elapsed time onto an [`EscalationLevel`]. The
//! runtime uses [`next_escalation`] to schedule its deferred steps; renderers
//! and tests use [`calculate_escalation_level`] directly.

use crate::config::EscalationConfig;
use crate::errors::OperationError;
use crate::types::EscalationLevel;
use std::time::Duration;

/// Level for an operation that has been running for `elapsed`.
///
/// Each boundary is a closed lower bound: exactly `inline_threshold` is
/// already `Inline`. Enabled flags are not consulted here.
pub fn calculate_escalation_level(elapsed: Duration, config: &EscalationConfig) -> EscalationLevel {
    let elapsed_ms = elapsed.as_millis();

    if elapsed_ms >= u128::from(config.modal_threshold_ms) {
        EscalationLevel::Modal
    } else if elapsed_ms >= u128::from(config.overlay_threshold_ms) {
        EscalationLevel::Overlay
    } else if elapsed_ms >= u128::from(config.inline_threshold_ms) {
        EscalationLevel::Inline
    } else {
        EscalationLevel::None
    }
}

/// Threshold at which `level` is entered, if the level is enabled
pub fn threshold_for(level: EscalationLevel, config: &EscalationConfig) -> Option<Duration> {
    match level {
        EscalationLevel::None => Some(Duration::ZERO),
        EscalationLevel::Inline if config.inline_enabled => Some(config.inline_threshold()),
        EscalationLevel::Overlay if config.overlay_enabled => Some(config.overlay_threshold()),
        EscalationLevel::Modal if config.modal_enabled => Some(config.modal_threshold()),
        _ => None,
    }
}

/// Enabled escalation steps as `(level, threshold)` in ascending order
pub fn escalation_schedule(config: &EscalationConfig) -> Vec<(EscalationLevel, Duration)> {
    EscalationLevel::ALL
        .into_iter()
        .skip(1)
        .filter_map(|level| threshold_for(level, config).map(|at| (level, at)))
        .collect()
}

/// Next enabled level strictly above the current one at `elapsed`, with the
/// remaining delay until it is reached
pub fn next_escalation(
    elapsed: Duration,
    config: &EscalationConfig,
) -> Option<(EscalationLevel, Duration)> {
    escalation_schedule(config)
        .into_iter()
        .find(|(_, at)| *at > elapsed)
        .map(|(level, at)| (level, at - elapsed))
}

/// Whether `error` was synthesized by an elapsed timeout rather than
/// reported by the operation itself
pub fn is_timeout_error(error: &OperationError) -> bool {
    error.is_timeout()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_boundaries_are_closed_lower_bounds() {
        let config = EscalationConfig::with_thresholds(100, 500, 2_000);

        assert_eq!(calculate_escalation_level(ms(0), &config), EscalationLevel::None);
        assert_eq!(calculate_escalation_level(ms(99), &config), EscalationLevel::None);
        assert_eq!(calculate_escalation_level(ms(100), &config), EscalationLevel::Inline);
        assert_eq!(calculate_escalation_level(ms(499), &config), EscalationLevel::Inline);
        assert_eq!(calculate_escalation_level(ms(500), &config), EscalationLevel::Overlay);
        assert_eq!(calculate_escalation_level(ms(1_999), &config), EscalationLevel::Overlay);
        assert_eq!(calculate_escalation_level(ms(2_000), &config), EscalationLevel::Modal);
        assert_eq!(calculate_escalation_level(ms(60_000), &config), EscalationLevel::Modal);
    }

    #[test]
    fn test_schedule_skips_disabled_levels() {
        let mut config = EscalationConfig::with_thresholds(100, 500, 2_000);
        config.overlay_enabled = false;

        let schedule = escalation_schedule(&config);
        assert_eq!(
            schedule,
            vec![
                (EscalationLevel::Inline, ms(100)),
                (EscalationLevel::Modal, ms(2_000))
            ]
        );
    }

    #[test]
    fn test_next_escalation_reports_remaining_delay() {
        let config = EscalationConfig::with_thresholds(100, 500, 2_000);

        assert_eq!(
            next_escalation(ms(0), &config),
            Some((EscalationLevel::Inline, ms(100)))
        );
        assert_eq!(
            next_escalation(ms(100), &config),
            Some((EscalationLevel::Overlay, ms(400)))
        );
        assert_eq!(next_escalation(ms(2_000), &config), None);
    }

    #[test]
    fn test_timeout_classification() {
        assert!(is_timeout_error(&OperationError::Timeout { duration_ms: 10 }));
        assert!(!is_timeout_error(&OperationError::message(
            "Operation timed out after 10ms"
        )));
    }
}

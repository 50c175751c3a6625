//! Dispatch tuning constants.

use std::time::Duration;

/// Tuning knobs for the two dispatch workers. The defaults are the values
/// the engine has always shipped with; tests shrink the queue limits to
/// exercise the bounds.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Command queue capacity.
    pub command_queue_limit: usize,
    /// Event queue capacity.
    pub event_queue_limit: usize,
    /// Slice length for the command worker's idle watch on the sink.
    pub inactivity_timeout: Duration,
    /// Consecutive idle slices before the worker closes the sink.
    pub max_inactivity_checks: u32,
    /// Slice length for the scheduler's open-but-not-playing retry.
    pub activity_timeout: Duration,
    /// Retry budget before a stalled stream drops the head event.
    pub max_activity_checks: u32,
    /// Pause between a synthesized SENTENCE event and the real delivery.
    pub synthetic_sentence_pause: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            command_queue_limit: 400,
            event_queue_limit: 1000,
            inactivity_timeout: Duration::from_millis(50),
            max_inactivity_checks: 2,
            activity_timeout: Duration::from_millis(50),
            max_activity_checks: 6,
            synthetic_sentence_pause: Duration::from_millis(50),
        }
    }
}

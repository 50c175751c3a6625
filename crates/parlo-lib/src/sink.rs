//! The audio sink contract consumed by both dispatch workers.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The stream is gone — the device failed or the sink was torn down.
    #[error("audio stream unavailable")]
    Unavailable,
}

/// Playback-side view of the audio stream.
///
/// The command worker closes the sink after a stretch of inactivity; the
/// event scheduler queries playback progress to time its callbacks. `sample`
/// arguments are absolute indices into the stream, zero at stream open.
pub trait AudioSink: Send + Sync {
    /// Whether samples are still being consumed by the device.
    fn is_busy(&self) -> bool;

    /// Wall-clock time from now until `sample` has been played.
    /// `Duration::ZERO` means the sample is already out of the device;
    /// `Err(Unavailable)` means the stream is gone and never will be.
    fn remaining_time_until(&self, sample: u64) -> Result<Duration, SinkError>;

    /// Flush pending audio and release the device. Idempotent.
    fn close(&self);
}

//! parlo-lib — asynchronous speech dispatch engine.
//!
//! Two cooperating workers around bounded FIFO queues: a command worker
//! that serializes synthesis off the caller's thread, and an event
//! scheduler that delivers progress callbacks at sample-accurate times
//! against the audio stream. Depends on parlo-core for the pure data model.

pub mod engine;
pub mod fifo;
pub mod handshake;
pub mod playback;
pub mod scheduler;
pub mod sink;
pub mod synth;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::Engine;
pub use fifo::CommandFifo;
pub use playback::PlaybackSink;
pub use scheduler::{EventCallback, EventScheduler};
pub use sink::{AudioSink, SinkError};
pub use synth::{CommandProcessor, ProcessContext};

// Re-export parlo-core for convenience
pub use parlo_core;

//! parlo-core — pure data model for the parlo speech dispatch core.
//!
//! Event and command records, the bounded FIFO container, the error
//! taxonomy, and the dispatch tuning constants. No threads, no I/O —
//! consumers can depend on these types without pulling in the engine.

pub mod command;
pub mod config;
pub mod error;
pub mod event;
pub mod queue;

pub use command::{Command, CommandKind, CommandState, Parameter, VoiceSpec};
pub use config::DispatchConfig;
pub use error::SubmitError;
pub use event::{Event, EventKind};
pub use queue::Fifo;

//! The synthesizer seam — how the command worker hands work to the
//! text-to-speech backend.

use parlo_core::{Command, Event, Fifo, SubmitError};

use crate::handshake::Handshake;
use crate::scheduler::EventScheduler;

/// Runs one command to completion on the command worker thread.
///
/// `process` is blocking: a text command typically renders audio into the
/// sink and declares progress events through the context as it goes.
/// Long-running implementations must poll
/// [`ProcessContext::commands_enabled`] and return early when it turns
/// false — that is what makes cancel responsive. Sticky commands
/// (parameters, voice changes) must be applied even while commands are
/// disabled, so user intent survives a cancel.
///
/// Dropping a [`Command`] frees its payload.
pub trait CommandProcessor: Send {
    fn process(&mut self, command: Command, ctx: &ProcessContext<'_>);
}

/// What a processor may reach while handling a command.
pub struct ProcessContext<'a> {
    pub(crate) scheduler: &'a EventScheduler,
    pub(crate) gate: &'a Handshake<Fifo<Command>>,
}

impl ProcessContext<'_> {
    /// Queue a progress event for sample-accurate delivery.
    pub fn declare_event(&self, event: Event) -> Result<(), SubmitError> {
        self.scheduler.declare(event)
    }

    /// False once a stop is pending on the command worker.
    pub fn commands_enabled(&self) -> bool {
        !self.gate.stop_pending()
    }
}

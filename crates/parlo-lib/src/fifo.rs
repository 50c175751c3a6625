//! Command queue and worker — serializes synthesis off the caller's thread.
//!
//! Clients append commands; a dedicated worker pops them one at a time and
//! runs each to completion through the [`CommandProcessor`]. A submit that
//! finds the worker idle wakes it and blocks until the worker has picked
//! the work up, so an immediate `is_busy()` query observes `true`. Cancel
//! stops the in-flight command cooperatively, then drains the queue while
//! replaying sticky parameter/voice commands so user intent is not lost.
//!
//! When the queue runs dry the worker watches the audio sink and closes it
//! after a stretch of inactivity, re-checking for late submits first.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use parlo_core::{Command, CommandState, DispatchConfig, Fifo, SubmitError};

use crate::handshake::Handshake;
use crate::scheduler::EventScheduler;
use crate::sink::AudioSink;
use crate::synth::{CommandProcessor, ProcessContext};

/// Bound on how long terminate waits for the worker thread to wind down.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct CommandFifo {
    shared: Arc<Handshake<Fifo<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

enum Batch {
    One(Command),
    Two(Command, Command),
}

impl CommandFifo {
    /// Spawn the command worker. Returns once the thread is alive.
    pub fn spawn(
        config: &DispatchConfig,
        sink: Arc<dyn AudioSink>,
        scheduler: Arc<EventScheduler>,
        processor: Box<dyn CommandProcessor>,
    ) -> Self {
        let shared = Arc::new(Handshake::new(Fifo::with_capacity(config.command_queue_limit)));

        let worker = {
            let shared = shared.clone();
            let config = config.clone();
            thread::Builder::new()
                .name("parlo-commands".into())
                .spawn(move || worker_loop(&shared, &*sink, &scheduler, processor, &config))
                .expect("failed to spawn command worker thread")
        };

        let fifo = Self {
            shared,
            worker: Mutex::new(Some(worker)),
        };
        fifo.shared.await_started();
        fifo
    }

    /// Append one command.
    ///
    /// Fails with `BufferFull` at capacity. On success, if the worker was
    /// idle this wakes it and blocks until the command has actually been
    /// picked up.
    pub fn submit(&self, command: Command) -> Result<(), SubmitError> {
        self.submit_batch(Batch::One(command))
    }

    /// Atomically append two related commands (e.g. a setup plus a text).
    /// Fails with `BufferFull` when fewer than two slots remain; neither
    /// command is enqueued in that case.
    pub fn submit_pair(&self, first: Command, second: Command) -> Result<(), SubmitError> {
        self.submit_batch(Batch::Two(first, second))
    }

    fn submit_batch(&self, batch: Batch) -> Result<(), SubmitError> {
        let wake = self.shared.lock(|g| {
            if g.is_shutdown() {
                return Err(SubmitError::Internal("command worker terminated"));
            }
            match batch {
                Batch::One(command) => {
                    debug!(kind = command.label(), "submitting command");
                    g.shared
                        .push(command)
                        .map_err(|_| SubmitError::BufferFull)?;
                }
                Batch::Two(first, second) => {
                    if g.shared.remaining() < 2 {
                        return Err(SubmitError::BufferFull);
                    }
                    debug!(
                        first = first.label(),
                        second = second.label(),
                        "submitting command pair"
                    );
                    g.shared.push(first).map_err(|_| SubmitError::BufferFull)?;
                    g.shared.push(second).map_err(|_| SubmitError::BufferFull)?;
                }
            }
            // wake only an idle worker; while a stop is in flight the
            // worker still counts as running and must not be woken
            if g.running() {
                Ok(false)
            } else {
                g.request_start();
                Ok(true)
            }
        })?;

        if wake {
            self.shared.notify_start();
            self.shared.wait_start_consumed();
        }
        Ok(())
    }

    /// Abort the in-flight command and discard queued work.
    ///
    /// Blocks until the worker acknowledges. Sticky parameter/voice
    /// commands already queued are applied during the drain. Idempotent: a
    /// second cancel with nothing running returns immediately.
    pub fn cancel(&self) {
        let was_running = self.shared.lock(|g| {
            if g.running() {
                g.request_stop();
                true
            } else {
                false
            }
        });
        if was_running {
            self.shared.notify_stop();
            self.shared.await_stop_ack();
        }
    }

    /// Snapshot: is a command currently being processed.
    pub fn is_busy(&self) -> bool {
        self.shared.is_running()
    }

    /// False once a stop is pending; command implementations poll this to
    /// break out of internal loops on cancel.
    pub fn commands_enabled(&self) -> bool {
        !self.shared.stop_pending()
    }

    /// Snapshot of the queue depth.
    pub fn pending(&self) -> usize {
        self.shared.lock(|g| g.shared.len())
    }

    /// Shut the worker down: wake every wait site, join with a bounded
    /// wait, and discard whatever was still queued.
    pub fn terminate(&self) {
        self.shared.begin_shutdown();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if self.shared.await_exit(JOIN_TIMEOUT) {
                let _ = handle.join();
            } else {
                warn!("command worker did not exit in time, detaching");
            }
        }
    }
}

impl Drop for CommandFifo {
    fn drop(&mut self) {
        self.terminate();
    }
}

// ─── Worker thread ─────────────────────────────────────────────────────────

fn worker_loop(
    shared: &Handshake<Fifo<Command>>,
    sink: &dyn AudioSink,
    scheduler: &EventScheduler,
    mut processor: Box<dyn CommandProcessor>,
    config: &DispatchConfig,
) {
    shared.mark_started();
    let ctx = ProcessContext { scheduler, gate: shared };

    let mut watch_for_idle = false;
    loop {
        if watch_for_idle && !wait_for_start_or_activity(shared, sink, config) {
            close_idle_stream(shared, sink);
        }
        watch_for_idle = true;

        if !shared.await_start() {
            break;
        }

        let mut stop_seen = false;
        loop {
            let command = shared.lock(|g| match g.shared.pop() {
                None => {
                    g.set_running(false);
                    None
                }
                Some(mut command) => {
                    g.purge_start();
                    if g.stop_pending() {
                        g.set_running(false);
                        stop_seen = true;
                    }
                    command.state = CommandState::Processed;
                    Some(command)
                }
            });
            shared.notify_start();

            let Some(command) = command else { break };
            if !stop_seen {
                debug!(kind = command.label(), "processing command");
                processor.process(command, &ctx);
            } else if command.is_sticky() {
                // enqueued before the cancel, so its effect must survive
                processor.process(command, &ctx);
            }
            if stop_seen {
                break;
            }
        }

        // re-check: a stop may have landed while the last command ran
        if stop_seen || shared.stop_pending() {
            drain_with_sticky_replay(shared, &mut processor, &ctx);
            shared.lock(|g| g.purge_start());
            shared.notify_start();
            shared.acknowledge_stop();
        }
    }

    // shutdown: queued work is discarded, no replay
    let leftovers: Vec<Command> = shared.lock(|g| g.shared.drain().collect());
    if !leftovers.is_empty() {
        debug!(count = leftovers.len(), "discarding queued commands on shutdown");
    }
    drop(leftovers);
    shared.acknowledge_stop();
    shared.mark_exited();
}

/// Drain the queue, applying sticky parameter/voice commands so the user's
/// settings survive the cancel.
fn drain_with_sticky_replay(
    shared: &Handshake<Fifo<Command>>,
    processor: &mut Box<dyn CommandProcessor>,
    ctx: &ProcessContext<'_>,
) {
    let drained: Vec<Command> = shared.lock(|g| g.shared.drain().collect());
    for command in drained {
        if command.is_sticky() {
            debug!(kind = command.label(), "replaying sticky command");
            processor.process(command, ctx);
        }
    }
}

/// Watch for a start request while the stream drains. Returns `true` if a
/// start request (or shutdown) arrived; `false` after the sink has been
/// idle for the configured number of consecutive slices.
fn wait_for_start_or_activity(
    shared: &Handshake<Fifo<Command>>,
    sink: &dyn AudioSink,
    config: &DispatchConfig,
) -> bool {
    let mut idle_slices = 0u32;
    loop {
        if sink.is_busy() {
            idle_slices = 0;
        } else {
            idle_slices += 1;
        }
        if idle_slices > config.max_inactivity_checks {
            return false;
        }
        if shared.start_arrived_within(config.inactivity_timeout) {
            return true;
        }
    }
}

fn close_idle_stream(shared: &Handshake<Fifo<Command>>, sink: &dyn AudioSink) {
    // a submit may have raced the idle watch; re-check before closing
    let clear_to_close = shared.lock(|g| !g.start_pending() && !g.stop_pending());
    if clear_to_close {
        debug!("audio stream idle, closing");
        sink.close();
    }
}

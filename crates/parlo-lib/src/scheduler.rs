//! Event queue and scheduler — sample-accurate callback delivery.
//!
//! Synthesis code declares progress events tagged with the absolute sample
//! at which they become audible. A dedicated scheduler thread peeks the
//! head event, asks the audio sink how long until that sample has played,
//! sleeps that long (interruptibly), and then invokes the client callback.
//! A clear-all drains the queue without further callbacks; message
//! termination events additionally fire once when released, so clients
//! always learn that a message ended.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, warn};

use parlo_core::{DispatchConfig, Event, EventKind, Fifo, SubmitError};

use crate::handshake::Handshake;
use crate::sink::AudioSink;

/// Bound on how long terminate waits for the scheduler thread to wind down.
const JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Client notification callback. Always receives a two-element slice:
/// the event followed by a `ListTerminated` sentinel.
pub type EventCallback = Box<dyn FnMut(&[Event]) + Send + 'static>;

pub struct EventScheduler {
    shared: Arc<Handshake<Fifo<Event>>>,
    notifier: Arc<Mutex<Notifier>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventScheduler {
    /// Spawn the scheduler thread. Returns once the thread is alive.
    pub fn spawn(config: &DispatchConfig, sink: Arc<dyn AudioSink>) -> Arc<Self> {
        let shared = Arc::new(Handshake::new(Fifo::with_capacity(config.event_queue_limit)));
        let notifier = Arc::new(Mutex::new(Notifier {
            callback: None,
            last_uid: 0,
            pause: config.synthetic_sentence_pause,
        }));

        let worker = {
            let shared = shared.clone();
            let notifier = notifier.clone();
            let config = config.clone();
            thread::Builder::new()
                .name("parlo-events".into())
                .spawn(move || scheduler_loop(&shared, &notifier, &*sink, &config))
                .expect("failed to spawn event scheduler thread")
        };

        let scheduler = Arc::new(Self {
            shared,
            notifier,
            worker: Mutex::new(Some(worker)),
        });
        scheduler.shared.await_started();
        scheduler
    }

    /// Install (or clear) the client callback.
    pub fn set_callback(&self, callback: Option<EventCallback>) {
        lock_notifier(&self.notifier).callback = callback;
    }

    /// Queue an event for delivery and wake the scheduler.
    ///
    /// The event is owned by the queue from here on. On `BufferFull` it is
    /// released instead (a rejected message-termination event still fires
    /// its final callback).
    pub fn declare(&self, event: Event) -> Result<(), SubmitError> {
        let rejected = self.shared.lock(|g| {
            if g.is_shutdown() {
                return Err(SubmitError::Internal("event scheduler terminated"));
            }
            match g.shared.push(event) {
                Ok(()) => {
                    g.request_start();
                    Ok(None)
                }
                Err(event) => Ok(Some(event)),
            }
        })?;
        self.shared.notify_start();

        match rejected {
            None => Ok(()),
            Some(event) => {
                warn!(
                    uid = event.unique_identifier,
                    kind = event.kind.label(),
                    "event queue full, dropping event"
                );
                release_event(&self.notifier, event);
                Err(SubmitError::BufferFull)
            }
        }
    }

    /// Discard every queued event. If the scheduler is mid-notification the
    /// in-flight callback completes, the rest of the queue is drained on
    /// the scheduler thread, and this blocks until that is acknowledged.
    /// Afterwards no callback for a previously queued event will fire.
    pub fn clear_all(&self) {
        let notifying = self.shared.lock(|g| {
            if g.running() {
                g.request_stop();
                true
            } else {
                false
            }
        });
        if notifying {
            self.shared.notify_stop();
            self.shared.await_stop_ack();
        } else {
            let pending: Vec<Event> = self.shared.lock(|g| g.shared.drain().collect());
            for event in pending {
                release_event(&self.notifier, event);
            }
        }
    }

    /// Snapshot: is the scheduler currently working through events.
    pub fn is_notifying(&self) -> bool {
        self.shared.is_running()
    }

    /// Snapshot of the queue depth.
    pub fn pending(&self) -> usize {
        self.shared.lock(|g| g.shared.len())
    }

    /// Shut the scheduler down. Queued events are released (message
    /// terminations fire their final callbacks) and the thread is joined
    /// with a bounded wait.
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
                warn!("event scheduler did not exit in time, detaching");
            }
        }
    }
}

impl Drop for EventScheduler {
    fn drop(&mut self) {
        self.terminate();
    }
}

// ─── Notification ──────────────────────────────────────────────────────────

struct Notifier {
    callback: Option<EventCallback>,
    /// Identifier of the most recently notified event. A different
    /// identifier on the next event means a new message began, which must
    /// open with a SENTENCE even if the synthesizer skipped it.
    last_uid: u32,
    pause: Duration,
}

impl Notifier {
    fn deliver(&mut self, event: &Event) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };
        match event.kind {
            EventKind::Sentence => {
                callback(&[event.clone(), event.sentinel()]);
                self.last_uid = event.unique_identifier;
            }
            EventKind::MsgTerminated
            | EventKind::Mark(_)
            | EventKind::Word
            | EventKind::End
            | EventKind::Phoneme(_) => {
                if self.last_uid != event.unique_identifier {
                    let mut opener = event.clone();
                    opener.kind = EventKind::Sentence;
                    callback(&[opener.clone(), opener.sentinel()]);
                    thread::sleep(self.pause);
                }
                callback(&[event.clone(), event.sentinel()]);
                self.last_uid = event.unique_identifier;
            }
            // PLAY names are resources for the URI layer, SAMPLERATE is
            // consumed by the synchronous entry points, and the sentinel
            // never queues on its own.
            EventKind::Play(_) | EventKind::Samplerate(_) | EventKind::ListTerminated => {}
        }
    }
}

fn lock_notifier(notifier: &Mutex<Notifier>) -> MutexGuard<'_, Notifier> {
    // a poisoned lock means a client callback panicked; keep delivering
    notifier.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Free one event. A message-termination event fires a final callback on
/// release; once delivered it has been cleared to a sentinel, so the
/// release stays silent. Owned mark/play names are freed with the event.
fn release_event(notifier: &Mutex<Notifier>, event: Event) {
    if event.kind == EventKind::MsgTerminated {
        lock_notifier(notifier).deliver(&event);
    }
}

// ─── Scheduler thread ──────────────────────────────────────────────────────

/// What the sink said about the head event's sample.
enum Progress {
    /// Already played — fire now.
    Due,
    /// Will play; sleep this long.
    Wait(Duration),
    /// Stream gone (or never started) — drop the event.
    Unavailable,
    /// A stop request arrived while probing.
    Stopped,
}

fn scheduler_loop(
    shared: &Handshake<Fifo<Event>>,
    notifier: &Mutex<Notifier>,
    sink: &dyn AudioSink,
    config: &DispatchConfig,
) {
    shared.mark_started();

    loop {
        if !shared.await_start() {
            break;
        }
        let mut stop_seen = false;

        loop {
            let (head, stop_now) = shared.lock(|g| {
                g.purge_start();
                (g.shared.front().cloned(), g.stop_pending())
            });
            if stop_now {
                stop_seen = true;
                break;
            }
            let Some(event) = head else { break };

            match playback_progress(sink, shared, event.sample, config) {
                Progress::Stopped => {
                    stop_seen = true;
                    break;
                }
                Progress::Unavailable => {
                    debug!(
                        uid = event.unique_identifier,
                        kind = event.kind.label(),
                        sample = event.sample,
                        "stream unavailable, dropping event"
                    );
                    let dropped = shared.lock(|g| g.shared.pop());
                    if let Some(dropped) = dropped {
                        release_event(notifier, dropped);
                    }
                }
                Progress::Due => {
                    debug!(
                        uid = event.unique_identifier,
                        kind = event.kind.label(),
                        sample = event.sample,
                        "delivering event"
                    );
                    lock_notifier(notifier).deliver(&event);
                    let delivered = shared.lock(|g| {
                        if let Some(head) = g.shared.front_mut() {
                            head.clear_for_release();
                        }
                        g.shared.pop()
                    });
                    if let Some(delivered) = delivered {
                        release_event(notifier, delivered);
                    }
                }
                Progress::Wait(duration) => {
                    if shared.sleep_unless_stop(duration) {
                        stop_seen = true;
                        break;
                    }
                }
            }
        }

        shared.lock(|g| g.set_running(false));
        if stop_seen || shared.stop_pending() {
            drain_and_release(shared, notifier);
            shared.lock(|g| g.purge_start());
            shared.acknowledge_stop();
        }
    }

    // shutdown: release what is left, then report the exit
    drain_and_release(shared, notifier);
    shared.acknowledge_stop();
    shared.mark_exited();
}

fn drain_and_release(shared: &Handshake<Fifo<Event>>, notifier: &Mutex<Notifier>) {
    let pending: Vec<Event> = shared.lock(|g| g.shared.drain().collect());
    for event in pending {
        release_event(notifier, event);
    }
}

/// Ask the sink how far playback is from `sample`.
///
/// An open stream that is not consuming samples yet is startup underflow:
/// retry a bounded number of times before concluding the stream is stalled
/// and the event will never become audible.
fn playback_progress(
    sink: &dyn AudioSink,
    shared: &Handshake<Fifo<Event>>,
    sample: u64,
    config: &DispatchConfig,
) -> Progress {
    for _ in 0..config.max_activity_checks {
        match sink.remaining_time_until(sample) {
            Err(err) => {
                error!(sample, %err, "sink query failed");
                return Progress::Unavailable;
            }
            Ok(remaining) if remaining.is_zero() => return Progress::Due,
            Ok(remaining) => {
                if sink.is_busy() {
                    return Progress::Wait(remaining);
                }
                if shared.sleep_unless_stop(config.activity_timeout) {
                    return Progress::Stopped;
                }
            }
        }
    }
    Progress::Unavailable
}

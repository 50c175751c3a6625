//! Hand-rolled fakes shared by the engine tests.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use parlo_core::{Command, Event};

use crate::scheduler::EventCallback;
use crate::sink::{AudioSink, SinkError};
use crate::synth::{CommandProcessor, ProcessContext};

/// Scriptable audio sink. `ready()` reports every sample as already played;
/// `rewind_to(0)` + `set_busy(..)` models a stream that is still ahead of
/// the events.
pub(crate) struct FakeSink {
    sample_rate: u32,
    busy: AtomicBool,
    played: AtomicU64,
    unavailable: AtomicBool,
    closes: AtomicU64,
}

impl FakeSink {
    pub fn ready() -> Arc<Self> {
        Arc::new(Self {
            sample_rate: 16_000,
            busy: AtomicBool::new(false),
            played: AtomicU64::new(u64::MAX),
            unavailable: AtomicBool::new(false),
            closes: AtomicU64::new(0),
        })
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::Relaxed);
    }

    pub fn rewind_to(&self, sample: u64) {
        self.played.store(sample, Ordering::Relaxed);
    }

    pub fn make_unavailable(&self) {
        self.unavailable.store(true, Ordering::Relaxed);
    }

    pub fn close_count(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }
}

impl AudioSink for FakeSink {
    fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }

    fn remaining_time_until(&self, sample: u64) -> Result<Duration, SinkError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(SinkError::Unavailable);
        }
        let played = self.played.load(Ordering::Relaxed);
        if sample <= played {
            Ok(Duration::ZERO)
        } else {
            Ok(Duration::from_millis(
                (sample - played) * 1000 / u64::from(self.sample_rate),
            ))
        }
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::Relaxed);
    }
}

/// Processor built from a closure.
pub(crate) struct ClosureProcessor<F>(pub F);

impl<F> CommandProcessor for ClosureProcessor<F>
where
    F: FnMut(Command, &ProcessContext<'_>) + Send,
{
    fn process(&mut self, command: Command, ctx: &ProcessContext<'_>) {
        (self.0)(command, ctx);
    }
}

/// Callback that records the first (live) event of every delivery.
pub(crate) fn collecting_callback() -> (EventCallback, Arc<Mutex<Vec<Event>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let writer = log.clone();
    let callback: EventCallback = Box::new(move |events: &[Event]| {
        writer.lock().unwrap().push(events[0].clone());
    });
    (callback, log)
}

/// Poll `condition` until it holds or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

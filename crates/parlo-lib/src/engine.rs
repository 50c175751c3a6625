//! Engine facade — one command FIFO and one event scheduler over a shared
//! audio sink.
//!
//! ```text
//! submit(cmd) → [command queue] → worker: processor.process()
//!     → declare events → [event queue] → scheduler: sample-timed callbacks
//! ```
//!
//! Cancel traverses both halves in order: first the command worker stops
//! and drains (sticky replay included), then the event queue is cleared —
//! so no stale event can fire after cancel returns.

use std::sync::Arc;

use tracing::debug;

use parlo_core::{Command, DispatchConfig, SubmitError};

use crate::fifo::CommandFifo;
use crate::scheduler::{EventCallback, EventScheduler};
use crate::sink::AudioSink;
use crate::synth::CommandProcessor;

pub struct Engine {
    fifo: CommandFifo,
    scheduler: Arc<EventScheduler>,
}

impl Engine {
    /// Spawn both workers. Returns once both threads are alive.
    pub fn new(
        config: DispatchConfig,
        sink: Arc<dyn AudioSink>,
        processor: Box<dyn CommandProcessor>,
    ) -> Self {
        let scheduler = EventScheduler::spawn(&config, sink.clone());
        let fifo = CommandFifo::spawn(&config, sink, scheduler.clone(), processor);
        Self { fifo, scheduler }
    }

    /// Install (or clear) the notification callback.
    pub fn set_callback(&self, callback: Option<EventCallback>) {
        self.scheduler.set_callback(callback);
    }

    pub fn submit(&self, command: Command) -> Result<(), SubmitError> {
        self.fifo.submit(command)
    }

    pub fn submit_pair(&self, first: Command, second: Command) -> Result<(), SubmitError> {
        self.fifo.submit_pair(first, second)
    }

    /// Abort the in-flight command, drain both queues (sticky commands are
    /// still applied), and return once no callback for cancelled work can
    /// fire anymore. Idempotent.
    pub fn cancel(&self) {
        debug!("cancel requested");
        self.fifo.cancel();
        self.scheduler.clear_all();
    }

    /// Whether a command is currently being processed.
    pub fn is_busy(&self) -> bool {
        self.fifo.is_busy()
    }

    /// Block until all submitted work has been processed and every queued
    /// event has been delivered.
    pub fn synchronize(&self) {
        while self.fifo.is_busy()
            || self.fifo.pending() > 0
            || self.scheduler.is_notifying()
            || self.scheduler.pending() > 0
        {
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
    }

    /// Shut both workers down. The command worker goes first so no new
    /// events are produced while the scheduler drains.
    pub fn terminate(&self) {
        self.fifo.terminate();
        self.scheduler.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{collecting_callback, wait_until, FakeSink};
    use crate::synth::ProcessContext;
    use parlo_core::{CommandKind, Event, EventKind, Parameter};
    use std::time::Duration;

    /// A processor that turns a text command into the canonical event
    /// sequence: SENTENCE, one WORD per whitespace word, MSG_TERMINATED.
    struct SequenceProcessor {
        samples_per_word: u64,
    }

    impl CommandProcessor for SequenceProcessor {
        fn process(&mut self, command: Command, ctx: &ProcessContext<'_>) {
            match command.kind {
                CommandKind::Text {
                    text,
                    unique_identifier,
                    ..
                } => {
                    let mut sample = 0;
                    let _ = ctx.declare_event(
                        Event::new(EventKind::Sentence, unique_identifier).with_sample(sample),
                    );
                    for _word in text.split_whitespace() {
                        if !ctx.commands_enabled() {
                            return;
                        }
                        sample += self.samples_per_word;
                        let _ = ctx.declare_event(
                            Event::new(EventKind::Word, unique_identifier).with_sample(sample),
                        );
                    }
                    let _ = ctx.declare_event(
                        Event::new(EventKind::MsgTerminated, unique_identifier)
                            .with_sample(sample + self.samples_per_word),
                    );
                }
                _ => {}
            }
        }
    }

    fn spawn_engine() -> (Engine, Arc<FakeSink>) {
        let sink = FakeSink::ready();
        let engine = Engine::new(
            DispatchConfig::default(),
            sink.clone(),
            Box::new(SequenceProcessor {
                samples_per_word: 8_000,
            }),
        );
        (engine, sink)
    }

    #[test]
    fn single_sentence_flows_end_to_end() {
        let (engine, _sink) = spawn_engine();
        let (callback, log) = collecting_callback();
        engine.set_callback(Some(callback));

        engine.submit(Command::text("hi", 1)).unwrap();
        engine.synchronize();

        let kinds: Vec<EventKind> = log.lock().unwrap().iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Sentence, EventKind::Word, EventKind::MsgTerminated]
        );
    }

    #[test]
    fn cancel_leaves_engine_idle_and_quiet() {
        let (engine, _sink) = spawn_engine();
        let (callback, log) = collecting_callback();
        engine.set_callback(Some(callback));

        engine
            .submit(Command::text("a b c d e f g h i j", 1))
            .unwrap();
        engine.cancel();

        assert!(!engine.is_busy());
        let count_after_cancel = log.lock().unwrap().len();
        std::thread::sleep(Duration::from_millis(100));
        // nothing fires after cancel returned
        assert_eq!(log.lock().unwrap().len(), count_after_cancel);

        // a second cancel is a no-op
        engine.cancel();
        assert!(!engine.is_busy());
    }

    #[test]
    fn sticky_parameter_survives_cancel_of_its_pair() {
        let sink = FakeSink::ready();
        let rate_log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let rates = rate_log.clone();
        let engine = Engine::new(
            DispatchConfig::default(),
            sink,
            Box::new(crate::testing::ClosureProcessor(
                move |command: Command, ctx: &ProcessContext<'_>| match command.kind {
                    CommandKind::Parameter { value, .. } => rates.lock().unwrap().push(value),
                    CommandKind::Text { .. } => {
                        while ctx.commands_enabled() {
                            std::thread::sleep(Duration::from_millis(2));
                        }
                    }
                    _ => {}
                },
            )),
        );

        // a long text holds the worker; the pair behind it gets cancelled
        engine.submit(Command::text("occupy the worker", 1)).unwrap();
        engine
            .submit_pair(
                Command::parameter(Parameter::Rate, 300),
                Command::text("never spoken", 2),
            )
            .unwrap();
        engine.cancel();

        assert_eq!(rate_log.lock().unwrap().as_slice(), &[300]);
        assert!(!engine.is_busy());
    }

    #[test]
    fn engine_survives_submit_after_synchronize() {
        let (engine, _sink) = spawn_engine();
        let (callback, log) = collecting_callback();
        engine.set_callback(Some(callback));

        engine.submit(Command::text("first", 1)).unwrap();
        engine.synchronize();
        engine.submit(Command::text("second", 2)).unwrap();
        engine.synchronize();

        assert!(wait_until(Duration::from_secs(2), || {
            log.lock()
                .unwrap()
                .iter()
                .filter(|e| e.kind == EventKind::MsgTerminated)
                .count()
                == 2
        }));
    }
}

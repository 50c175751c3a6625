//! Scripted synthesizer — a stand-in for a real phoneme engine.
//!
//! Each word of a text command becomes one beat of audio in the sink (a
//! soft tone whose loudness follows the volume parameter) plus a WORD event
//! at the beat's first sample. The cadence follows the rate parameter in
//! words per minute, so event timing behaves like real speech.

use std::f32::consts::TAU;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use parlo_lib::parlo_core::{Command, CommandKind, Event, EventKind, Parameter};
use parlo_lib::{CommandProcessor, PlaybackSink, ProcessContext};

static RE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+").unwrap());

const TONE_HZ: f32 = 220.0;
const MIN_WPM: u32 = 60;

pub struct ScriptedSynthesizer {
    sink: Arc<PlaybackSink>,
    rate_wpm: u32,
    volume: i32,
    voice: String,
}

impl ScriptedSynthesizer {
    pub fn new(sink: Arc<PlaybackSink>) -> Self {
        Self {
            sink,
            rate_wpm: 175,
            volume: 100,
            voice: "en".into(),
        }
    }

    fn speak(&self, text: &str, unique_identifier: u32, user_data: Option<u64>, ctx: &ProcessContext<'_>) {
        let beat = beat_samples(self.sink.sample_rate(), self.rate_wpm);
        let tone = render_beat(beat as usize, self.sink.sample_rate(), self.volume);
        let rate = u64::from(self.sink.sample_rate());
        let start = self.sink.position();
        debug!(
            uid = unique_identifier,
            voice = %self.voice,
            wpm = self.rate_wpm,
            "speaking"
        );

        let event = |kind: EventKind| {
            let mut event = Event::new(kind, unique_identifier);
            event.user_data = user_data;
            event
        };

        let _ = ctx.declare_event(
            event(EventKind::Sentence)
                .with_sample(start)
                .with_text_span(1, text.chars().count() as u32),
        );

        let mut end = start;
        for (position, length, _word) in word_spans(text) {
            // cancel support: stop rendering as soon as commands go quiet
            if !ctx.commands_enabled() {
                return;
            }
            let sample = match self.sink.write(&tone) {
                Ok(sample) => sample,
                Err(_) => self.sink.position(),
            };
            end = sample + beat;
            let _ = ctx.declare_event(
                event(EventKind::Word)
                    .with_sample(sample)
                    .with_text_span(position, length)
                    .with_audio_position_ms(((sample.saturating_sub(start)) * 1000 / rate) as u32),
            );
        }

        let _ = ctx.declare_event(
            event(EventKind::MsgTerminated)
                .with_sample(end)
                .with_audio_position_ms((end.saturating_sub(start) * 1000 / rate) as u32),
        );
    }
}

impl CommandProcessor for ScriptedSynthesizer {
    fn process(&mut self, command: Command, ctx: &ProcessContext<'_>) {
        match command.kind {
            CommandKind::Text {
                text,
                unique_identifier,
                user_data,
            } => self.speak(&text, unique_identifier, user_data, ctx),
            CommandKind::Mark {
                text,
                mark_name,
                unique_identifier,
                user_data,
            } => {
                let mut mark = Event::new(EventKind::Mark(mark_name), unique_identifier)
                    .with_sample(self.sink.position());
                mark.user_data = user_data;
                let _ = ctx.declare_event(mark);
                self.speak(&text, unique_identifier, user_data, ctx);
            }
            CommandKind::Parameter { param, value, relative } => {
                match param {
                    Parameter::Rate => {
                        let base = if relative { self.rate_wpm as i32 } else { 0 };
                        self.rate_wpm = (base + value).max(MIN_WPM as i32) as u32;
                    }
                    Parameter::Volume => {
                        let base = if relative { self.volume } else { 0 };
                        self.volume = (base + value).clamp(0, 200);
                    }
                    other => debug!(?other, value, "parameter not modeled by scripted synthesizer"),
                }
            }
            CommandKind::VoiceName(name) => {
                debug!(voice = %name, "voice selected");
                self.voice = name;
            }
            CommandKind::VoiceSpec(spec) => {
                if let Some(name) = spec.name {
                    self.voice = name;
                }
            }
            CommandKind::Key(name) => self.speak(&name, 0, None, ctx),
            CommandKind::Char(c) => self.speak(&c.to_string(), 0, None, ctx),
            CommandKind::TerminatedMsg {
                unique_identifier,
                user_data,
            } => {
                let mut event =
                    Event::new(EventKind::MsgTerminated, unique_identifier).with_sample(self.sink.position());
                event.user_data = user_data;
                let _ = ctx.declare_event(event);
            }
        }
    }
}

/// 1-based character position and length of every word in `text`.
fn word_spans(text: &str) -> Vec<(u32, u32, &str)> {
    RE_WORD
        .find_iter(text)
        .map(|m| {
            let position = text[..m.start()].chars().count() as u32 + 1;
            let length = m.as_str().chars().count() as u32;
            (position, length, m.as_str())
        })
        .collect()
}

/// Samples per word beat at the given rate.
fn beat_samples(sample_rate: u32, wpm: u32) -> u64 {
    u64::from(sample_rate) * 60 / u64::from(wpm.max(MIN_WPM))
}

/// One word beat: a soft tone with a trailing gap of silence.
fn render_beat(len: usize, sample_rate: u32, volume: i32) -> Vec<i16> {
    let amplitude = (volume.clamp(0, 200) * 60) as f32;
    let audible = len.saturating_sub(len / 5);
    (0..len)
        .map(|i| {
            if i < audible {
                (amplitude * (TAU * TONE_HZ * i as f32 / sample_rate as f32).sin()) as i16
            } else {
                0
            }
        })
        .collect()
}

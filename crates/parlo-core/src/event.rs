//! Event records delivered to the client callback.
//!
//! An [`Event`] is a timestamped notification about synthesis progress:
//! sentence and word boundaries, SSML-style marks, end of message. The
//! `sample` field is the absolute index into the audio stream at which the
//! event becomes audible; the scheduler fires the callback when the sink
//! reports that sample as played.

use serde::Serialize;

/// What kind of progress an event reports.
///
/// Only `Mark` and `Play` own a name string. `Phoneme` carries the phoneme
/// code and `Samplerate` the stream rate in Hz.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "id")]
pub enum EventKind {
    Sentence,
    Word,
    Mark(String),
    Play(String),
    End,
    MsgTerminated,
    Phoneme(u32),
    Samplerate(u32),
    /// Sentinel closing every callback slice. Never queued on its own.
    #[default]
    ListTerminated,
}

impl EventKind {
    /// The owned name, for `Mark`/`Play` events.
    pub fn name(&self) -> Option<&str> {
        match self {
            EventKind::Mark(name) | EventKind::Play(name) => Some(name),
            _ => None,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Sentence => "sentence",
            EventKind::Word => "word",
            EventKind::Mark(_) => "mark",
            EventKind::Play(_) => "play",
            EventKind::End => "end",
            EventKind::MsgTerminated => "msg_terminated",
            EventKind::Phoneme(_) => "phoneme",
            EventKind::Samplerate(_) => "samplerate",
            EventKind::ListTerminated => "list_terminated",
        }
    }
}

/// A single synthesis progress notification.
///
/// Text offsets are 1-based and counted in characters, matching what the
/// synthesizer reports. `user_data` is an opaque correlation token supplied
/// by the client at submission and round-tripped untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Event {
    #[serde(flatten)]
    pub kind: EventKind,
    pub unique_identifier: u32,
    pub text_position: u32,
    pub length: u32,
    pub audio_position_ms: u32,
    pub sample: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_data: Option<u64>,
}

impl Event {
    pub fn new(kind: EventKind, unique_identifier: u32) -> Self {
        Self {
            kind,
            unique_identifier,
            ..Self::default()
        }
    }

    pub fn with_sample(mut self, sample: u64) -> Self {
        self.sample = sample;
        self
    }

    pub fn with_text_span(mut self, text_position: u32, length: u32) -> Self {
        self.text_position = text_position;
        self.length = length;
        self
    }

    pub fn with_audio_position_ms(mut self, ms: u32) -> Self {
        self.audio_position_ms = ms;
        self
    }

    pub fn with_user_data(mut self, token: u64) -> Self {
        self.user_data = Some(token);
        self
    }

    /// The `ListTerminated` sentinel that closes this event's callback
    /// slice: a copy of the event with only the kind replaced.
    pub fn sentinel(&self) -> Event {
        Event {
            kind: EventKind::ListTerminated,
            ..self.clone()
        }
    }

    /// Downgrade a delivered event so that any later release-time
    /// notification carries a sentinel instead of a second live event.
    pub fn clear_for_release(&mut self) {
        self.kind = EventKind::ListTerminated;
        self.user_data = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_keeps_everything_but_kind() {
        let event = Event::new(EventKind::Mark("intro".into()), 3)
            .with_sample(16_000)
            .with_text_span(1, 5)
            .with_user_data(42);
        let sentinel = event.sentinel();

        assert_eq!(sentinel.kind, EventKind::ListTerminated);
        assert_eq!(sentinel.unique_identifier, 3);
        assert_eq!(sentinel.sample, 16_000);
        assert_eq!(sentinel.user_data, Some(42));
    }

    #[test]
    fn clear_for_release_drops_kind_and_user_data() {
        let mut event = Event::new(EventKind::MsgTerminated, 9).with_user_data(7);
        event.clear_for_release();

        assert_eq!(event.kind, EventKind::ListTerminated);
        assert_eq!(event.user_data, None);
        assert_eq!(event.unique_identifier, 9);
    }

    #[test]
    fn only_mark_and_play_have_names() {
        assert_eq!(EventKind::Mark("a".into()).name(), Some("a"));
        assert_eq!(EventKind::Play("b".into()).name(), Some("b"));
        assert_eq!(EventKind::Word.name(), None);
        assert_eq!(EventKind::Samplerate(22_050).name(), None);
    }
}

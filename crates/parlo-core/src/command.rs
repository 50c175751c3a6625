//! Command records submitted by the client.
//!
//! A [`Command`] is one unit of work for the synthesis worker: text to
//! speak, a parameter change, a voice selection. The dispatch core itself
//! only reads the kind (for the sticky check) and the state; the payloads
//! belong to the command processor.

use serde::Serialize;

/// Synthesis parameters a `Parameter` command can set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Parameter {
    Rate,
    Volume,
    Pitch,
    Range,
    Punctuation,
    Capitals,
    WordGap,
}

/// Voice selection by attributes rather than by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VoiceSpec {
    pub name: Option<String>,
    pub language: Option<String>,
    /// 0 = unspecified, 1 = male, 2 = female.
    pub gender: u8,
    pub age: u8,
    pub variant: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "command", content = "args")]
pub enum CommandKind {
    Text {
        text: String,
        unique_identifier: u32,
        user_data: Option<u64>,
    },
    Parameter {
        param: Parameter,
        value: i32,
        relative: bool,
    },
    VoiceName(String),
    VoiceSpec(VoiceSpec),
    Mark {
        text: String,
        mark_name: String,
        unique_identifier: u32,
        user_data: Option<u64>,
    },
    Key(String),
    Char(char),
    TerminatedMsg {
        unique_identifier: u32,
        user_data: Option<u64>,
    },
}

/// Where a command is in its life cycle. Push marks `Pending`; the worker
/// flips to `Processed` when it hands the command to the processor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    #[default]
    Pending,
    Processed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    #[serde(flatten)]
    pub kind: CommandKind,
    pub state: CommandState,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            state: CommandState::Pending,
        }
    }

    pub fn text(text: impl Into<String>, unique_identifier: u32) -> Self {
        Self::new(CommandKind::Text {
            text: text.into(),
            unique_identifier,
            user_data: None,
        })
    }

    pub fn parameter(param: Parameter, value: i32) -> Self {
        Self::new(CommandKind::Parameter {
            param,
            value,
            relative: false,
        })
    }

    pub fn voice_name(name: impl Into<String>) -> Self {
        Self::new(CommandKind::VoiceName(name.into()))
    }

    /// Sticky commands survive a cancel: their effect is applied during the
    /// drain so user intent (rate, voice) is not lost with the spoken work.
    pub fn is_sticky(&self) -> bool {
        matches!(
            self.kind,
            CommandKind::Parameter { .. } | CommandKind::VoiceName(_) | CommandKind::VoiceSpec(_)
        )
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self.kind {
            CommandKind::Text { .. } => "text",
            CommandKind::Parameter { .. } => "parameter",
            CommandKind::VoiceName(_) => "voice_name",
            CommandKind::VoiceSpec(_) => "voice_spec",
            CommandKind::Mark { .. } => "mark",
            CommandKind::Key(_) => "key",
            CommandKind::Char(_) => "char",
            CommandKind::TerminatedMsg { .. } => "terminated_msg",
        }
    }
}

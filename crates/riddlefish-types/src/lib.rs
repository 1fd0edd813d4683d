//! `riddlefish-types` – shared vocabulary of the riddle fish.
//!
//! Every crate in the workspace speaks in terms of the types defined here:
//! visitor identities, presence events, puppet commands and the global
//! [`FishError`].  The wire format spoken with the remote dialogue service
//! lives in [`protocol`].

pub mod protocol;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Secondary attributes attached to a recognised visitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    /// Age bucket label produced by the attribute classifier, e.g. `"(8-12)"`.
    pub age_bucket: String,
    /// Face detection confidence at the moment the identity was created.
    pub confidence: f32,
}

/// A visitor the character has seen before.
///
/// Created once on the first confident sighting and never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub attributes: Attributes,
    /// Fixed-length face feature vector.
    pub encoding: Vec<f32>,
}

impl Identity {
    /// Create a fresh identity with a random v4 id.
    pub fn new(attributes: Attributes, encoding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4(),
            attributes,
            encoding,
        }
    }

    /// An identity only takes part in matching once it carries an encoding.
    pub fn is_matchable(&self) -> bool {
        !self.encoding.is_empty()
    }
}

/// Debounced presence signal emitted by the presence tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PresenceEvent {
    /// A visitor is in front of the camera.
    PersonDetected {
        id: Uuid,
        is_new: bool,
        attributes: Attributes,
    },
    /// Nobody has been seen for longer than the absence timeout.
    NoPersonSustained,
}

// ────────────────────────────────────────────────────────────────────────────
// Puppet commands
// ────────────────────────────────────────────────────────────────────────────

/// One independently driven degree of freedom of the puppet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actuator {
    Head,
    Tail,
    Mouth,
}

/// Closed set of gestures the puppet controller understands.
///
/// Unknown gestures are unrepresentable; string names are only parsed at the
/// edge via [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PuppetCommand {
    HeadUp,
    HeadDown,
    TailUp,
    TailDown,
    MouthOpen,
    MouthClose,
}

impl PuppetCommand {
    /// Every command, in a stable order.
    pub const ALL: [PuppetCommand; 6] = [
        PuppetCommand::HeadUp,
        PuppetCommand::HeadDown,
        PuppetCommand::TailUp,
        PuppetCommand::TailDown,
        PuppetCommand::MouthOpen,
        PuppetCommand::MouthClose,
    ];

    /// The actuator this command moves.
    pub fn actuator(self) -> Actuator {
        match self {
            PuppetCommand::HeadUp | PuppetCommand::HeadDown => Actuator::Head,
            PuppetCommand::TailUp | PuppetCommand::TailDown => Actuator::Tail,
            PuppetCommand::MouthOpen | PuppetCommand::MouthClose => Actuator::Mouth,
        }
    }

    /// `true` for up / open, `false` for down / close.
    pub fn is_raise(self) -> bool {
        matches!(
            self,
            PuppetCommand::HeadUp | PuppetCommand::TailUp | PuppetCommand::MouthOpen
        )
    }

    /// Wire name of the command, e.g. `"head_up"`.
    pub fn as_str(self) -> &'static str {
        match self {
            PuppetCommand::HeadUp => "head_up",
            PuppetCommand::HeadDown => "head_down",
            PuppetCommand::TailUp => "tail_up",
            PuppetCommand::TailDown => "tail_down",
            PuppetCommand::MouthOpen => "mouth_open",
            PuppetCommand::MouthClose => "mouth_close",
        }
    }
}

impl fmt::Display for PuppetCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PuppetCommand {
    type Err = FishError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PuppetCommand::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| FishError::Protocol(format!("unknown puppet action '{s}'")))
    }
}

/// Completion sentinel sent by the puppet controller after each command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PuppetAck {
    ActionCompleted,
}

// ────────────────────────────────────────────────────────────────────────────
// Visitor preferences
// ────────────────────────────────────────────────────────────────────────────

/// Conversation language chosen by a visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "nl")]
    Dutch,
    #[serde(rename = "ru")]
    Russian,
}

impl Language {
    /// ISO 639-1 code.
    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Dutch => "nl",
            Language::Russian => "ru",
        }
    }

    /// Parse an ISO 639-1 code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "en" => Some(Language::English),
            "nl" => Some(Language::Dutch),
            "ru" => Some(Language::Russian),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Language and synthesis voice remembered for one identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preference {
    pub id: Uuid,
    #[serde(rename = "lang")]
    pub language: Language,
    pub voice: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Global error type shared by every crate in the workspace.
#[derive(Error, Debug)]
pub enum FishError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Protocol Error: {0}")]
    Protocol(String),

    #[error("Storage Error: {0}")]
    Storage(String),

    #[error("Audio Error: {0}")]
    Audio(String),

    #[error("Transcription Error: {0}")]
    Transcription(String),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn puppet_command_names_roundtrip() {
        for cmd in PuppetCommand::ALL {
            let parsed: PuppetCommand = cmd.as_str().parse().unwrap();
            assert_eq!(parsed, cmd);
        }
    }

    #[test]
    fn unknown_puppet_action_is_rejected() {
        let err = "fin_wiggle".parse::<PuppetCommand>().unwrap_err();
        assert!(err.to_string().contains("fin_wiggle"));
    }

    #[test]
    fn puppet_command_actuator_and_direction() {
        assert_eq!(PuppetCommand::MouthOpen.actuator(), Actuator::Mouth);
        assert!(PuppetCommand::MouthOpen.is_raise());
        assert_eq!(PuppetCommand::TailDown.actuator(), Actuator::Tail);
        assert!(!PuppetCommand::TailDown.is_raise());
        assert_eq!(PuppetCommand::HeadUp.actuator(), Actuator::Head);
    }

    #[test]
    fn puppet_command_serializes_as_wire_name() {
        let json = serde_json::to_string(&PuppetCommand::HeadDown).unwrap();
        assert_eq!(json, "\"head_down\"");
    }

    #[test]
    fn presence_event_is_tagged() {
        let json = serde_json::to_string(&PresenceEvent::NoPersonSustained).unwrap();
        assert_eq!(json, r#"{"type":"NoPersonSustained"}"#);
    }

    #[test]
    fn identity_without_encoding_is_not_matchable() {
        let attrs = Attributes {
            age_bucket: "(25-32)".to_string(),
            confidence: 0.9,
        };
        assert!(!Identity::new(attrs.clone(), vec![]).is_matchable());
        assert!(Identity::new(attrs, vec![0.1, 0.2]).is_matchable());
    }

    #[test]
    fn preference_uses_lang_field() {
        let pref = Preference {
            id: Uuid::nil(),
            language: Language::Dutch,
            voice: "female_01.wav".to_string(),
        };
        let json = serde_json::to_string(&pref).unwrap();
        assert!(json.contains(r#""lang":"nl""#));
        let back: Preference = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pref);
    }

    #[test]
    fn language_codes() {
        assert_eq!(Language::from_code("ru"), Some(Language::Russian));
        assert_eq!(Language::from_code("de"), None);
        assert_eq!(Language::English.to_string(), "en");
    }

    #[test]
    fn fish_error_display() {
        let err = FishError::HardwareFault {
            component: "head".to_string(),
            details: "bus timeout".to_string(),
        };
        assert!(err.to_string().contains("head"));
        assert!(FishError::Transport("closed".into()).to_string().contains("closed"));
    }
}

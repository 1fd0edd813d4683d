//! Wire protocol spoken with the remote dialogue service.
//!
//! Every event travels as one JSON text frame shaped as an adjacently tagged
//! envelope:
//!
//! ```json
//! { "event": "greet_old_player", "data": { "id": "…", "lang": "en", … } }
//! ```
//!
//! | Direction | Event | Meaning |
//! |---|---|---|
//! | out | `greet_new_player` | enrollment result with the recorded language choice |
//! | out | `greet_old_player` | a returning visitor with known preferences |
//! | out | `give_answer_on_riddle` | the visitor's recorded answer |
//! | out | `save_player_preferences` | language/voice chosen for an identity |
//! | in | `say` | continue the turn (speak, then listen) |
//! | in | `say_no_continue` | end the turn (speak, then idle) |
//! | in | `retry_greeting` | redo the enrollment flow |
//! | in | `error` | the remote failed to process the last event |

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Attributes, FishError, Language, Preference};

/// Everything the remote needs to know about the visitor it is talking to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub id: Uuid,
    pub age: String,
    pub confidence: f32,
    pub lang: Language,
    pub voice: String,
}

impl PlayerProfile {
    pub fn new(id: Uuid, attributes: &Attributes, preference: &Preference) -> Self {
        Self {
            id,
            age: attributes.age_bucket.clone(),
            confidence: attributes.confidence,
            lang: preference.language,
            voice: preference.voice.clone(),
        }
    }
}

/// Identity part of a player, as echoed back by `retry_greeting`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub id: Uuid,
    pub age: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlayerGreeting {
    pub player: PlayerProfile,
    /// Base64 encoded recording of the spoken language choice.
    pub recording: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiddleAnswer {
    pub player: PlayerProfile,
    /// Base64 encoded recording of the answer.
    pub recording: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnContinue {
    pub player: PlayerProfile,
    #[serde(default)]
    pub total_riddles_correct: u32,
    pub answer_correct: bool,
    pub transcription: String,
    /// Locator of the synthesised reply audio.
    pub wav_location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnStop {
    pub player: PlayerProfile,
    pub transcription: String,
    pub wav_location: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GreetingRetry {
    pub player: PlayerRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    pub error: String,
}

/// Events sent to the remote dialogue service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    GreetNewPlayer(NewPlayerGreeting),
    GreetOldPlayer(PlayerProfile),
    GiveAnswerOnRiddle(RiddleAnswer),
    SavePlayerPreferences(Preference),
}

impl OutboundEvent {
    /// Event name as it appears on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::GreetNewPlayer(_) => "greet_new_player",
            OutboundEvent::GreetOldPlayer(_) => "greet_old_player",
            OutboundEvent::GiveAnswerOnRiddle(_) => "give_answer_on_riddle",
            OutboundEvent::SavePlayerPreferences(_) => "save_player_preferences",
        }
    }

    /// Serialise into a text frame.
    pub fn to_frame(&self) -> Result<String, FishError> {
        serde_json::to_string(self).map_err(|e| FishError::Protocol(e.to_string()))
    }
}

/// Events received from the remote dialogue service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundEvent {
    Say(TurnContinue),
    SayNoContinue(TurnStop),
    RetryGreeting(GreetingRetry),
    Error(RemoteError),
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            InboundEvent::Say(_) => "say",
            InboundEvent::SayNoContinue(_) => "say_no_continue",
            InboundEvent::RetryGreeting(_) => "retry_greeting",
            InboundEvent::Error(_) => "error",
        }
    }

    /// Parse a text frame.
    pub fn from_frame(frame: &str) -> Result<Self, FishError> {
        serde_json::from_str(frame).map_err(|e| FishError::Protocol(e.to_string()))
    }
}

/// Base64 encode recorded audio for embedding in a JSON frame.
pub fn encode_recording(input: &[u8]) -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut result = String::with_capacity(input.len().div_ceil(3) * 4);
    for chunk in input.chunks(3) {
        let b0 = chunk[0] as u32;
        let b1 = if chunk.len() > 1 { chunk[1] as u32 } else { 0 };
        let b2 = if chunk.len() > 2 { chunk[2] as u32 } else { 0 };
        let triple = (b0 << 16) | (b1 << 8) | b2;
        result.push(CHARS[((triple >> 18) & 0x3F) as usize] as char);
        result.push(CHARS[((triple >> 12) & 0x3F) as usize] as char);
        if chunk.len() > 1 {
            result.push(CHARS[((triple >> 6) & 0x3F) as usize] as char);
        } else {
            result.push('=');
        }
        if chunk.len() > 2 {
            result.push(CHARS[(triple & 0x3F) as usize] as char);
        } else {
            result.push('=');
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> PlayerProfile {
        PlayerProfile {
            id: Uuid::nil(),
            age: "(8-12)".to_string(),
            confidence: 0.75,
            lang: Language::English,
            voice: "male_02.wav".to_string(),
        }
    }

    #[test]
    fn outbound_envelope_shape() {
        let frame = OutboundEvent::GreetOldPlayer(profile()).to_frame().unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "greet_old_player");
        assert_eq!(value["data"]["lang"], "en");
        assert_eq!(value["data"]["age"], "(8-12)");
    }

    #[test]
    fn outbound_names_match_wire() {
        let ev = OutboundEvent::SavePlayerPreferences(Preference {
            id: Uuid::nil(),
            language: Language::Dutch,
            voice: "v".into(),
        });
        let value: serde_json::Value = serde_json::from_str(&ev.to_frame().unwrap()).unwrap();
        assert_eq!(value["event"], ev.name());
        assert_eq!(value["data"]["lang"], "nl");
    }

    #[test]
    fn inbound_say_parses() {
        let frame = r#"{
            "event": "say",
            "data": {
                "player": {"id": "00000000-0000-0000-0000-000000000000",
                           "age": "(8-12)", "confidence": 0.75,
                           "lang": "en", "voice": "male_02.wav"},
                "total_riddles_correct": 2,
                "answer_correct": true,
                "transcription": "Well done! Next one.",
                "wav_location": "http://tts.local/out/abc.wav"
            }
        }"#;
        match InboundEvent::from_frame(frame).unwrap() {
            InboundEvent::Say(turn) => {
                assert!(turn.answer_correct);
                assert_eq!(turn.total_riddles_correct, 2);
                assert_eq!(turn.player, profile());
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn inbound_retry_ignores_recording() {
        let frame = r#"{"event":"retry_greeting","data":{"player":{
            "id":"00000000-0000-0000-0000-000000000000","age":"(4-6)",
            "confidence":0.7,"recording":"AAAA"}}}"#;
        let ev = InboundEvent::from_frame(frame).unwrap();
        assert_eq!(ev.name(), "retry_greeting");
    }

    #[test]
    fn inbound_garbage_is_protocol_error() {
        let err = InboundEvent::from_frame(r#"{"event":"dance"}"#).unwrap_err();
        assert!(matches!(err, FishError::Protocol(_)));
    }

    #[test]
    fn base64_padding() {
        assert_eq!(encode_recording(b""), "");
        assert_eq!(encode_recording(b"f"), "Zg==");
        assert_eq!(encode_recording(b"fo"), "Zm8=");
        assert_eq!(encode_recording(b"foo"), "Zm9v");
        assert_eq!(encode_recording(b"RIFF"), "UklGRg==");
    }
}

//! Black-box voice collaborators: microphone, transcriber and speaker.
//!
//! The orchestrator only knows these traits.  Speech recognition and audio
//! output live behind them, so real devices and the headless doubles in
//! [`sim`][crate::sim] are interchangeable.

use std::time::Duration;

use async_trait::async_trait;
use riddlefish_types::FishError;
use thiserror::Error;

/// Text recognised in a recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    /// ISO 639-1 code of the language the recogniser detected, if it reports
    /// one.
    pub language: Option<String>,
}

/// Errors raised by a [`Transcriber`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranscriptionError {
    /// Nothing intelligible was said.
    #[error("no speech in recording")]
    Silence,
    #[error("transcription failed: {0}")]
    Failed(String),
}

impl From<TranscriptionError> for FishError {
    fn from(e: TranscriptionError) -> Self {
        FishError::Transcription(e.to_string())
    }
}

/// Records one spoken phrase.
#[async_trait]
pub trait Microphone: Send + Sync {
    /// Listen until the visitor stops talking and return the recording as a
    /// complete WAV file.  Dropping the future abandons the recording.
    async fn listen(&self) -> Result<Vec<u8>, FishError>;
}

/// Speech-to-text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, recording: &[u8]) -> Result<Transcript, TranscriptionError>;
}

/// Plays audio clips.
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Playback length of `clip`, needed before playback starts to time the
    /// mouth.
    fn duration(&self, clip: &[u8]) -> Result<Duration, FishError>;

    /// Play `clip` to the end.
    async fn play(&self, clip: Vec<u8>) -> Result<(), FishError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_maps_to_transcription_error() {
        let err: FishError = TranscriptionError::Silence.into();
        assert!(matches!(err, FishError::Transcription(msg) if msg.contains("no speech")));
    }
}

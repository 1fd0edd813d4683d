//! Headless voice collaborators.
//!
//! Used by simulation mode and by the orchestrator tests: a microphone that
//! "records" a short silent WAV, a transcriber that answers from a script,
//! and a speaker that only waits for the length of each clip.

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use riddlefish_types::FishError;
use tokio::time::sleep;

use crate::voice::{Microphone, Speaker, Transcriber, Transcript, TranscriptionError};

const SAMPLE_RATE: u32 = 16_000;

/// Encode `length` of mono 16-bit silence as a WAV file.
pub fn silent_wav(length: Duration) -> Result<Vec<u8>, FishError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let samples = (length.as_nanos() * SAMPLE_RATE as u128 / 1_000_000_000) as u32;
    let mut buf = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut buf, spec).map_err(|e| FishError::Audio(e.to_string()))?;
        for _ in 0..samples {
            writer
                .write_sample(0i16)
                .map_err(|e| FishError::Audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| FishError::Audio(e.to_string()))?;
    }
    Ok(buf.into_inner())
}

/// Length of a WAV clip, read from its header.
pub fn wav_duration(clip: &[u8]) -> Result<Duration, FishError> {
    let reader = WavReader::new(Cursor::new(clip)).map_err(|e| FishError::Audio(e.to_string()))?;
    let rate = u64::from(reader.spec().sample_rate.max(1));
    Ok(Duration::from_nanos(u64::from(reader.duration()) * 1_000_000_000 / rate))
}

/// Takes `phrase` to "record" a silent phrase of the same length.
pub struct SilentMicrophone {
    phrase: Duration,
}

impl SilentMicrophone {
    pub fn new(phrase: Duration) -> Self {
        Self { phrase }
    }
}

#[async_trait]
impl Microphone for SilentMicrophone {
    async fn listen(&self) -> Result<Vec<u8>, FishError> {
        sleep(self.phrase).await;
        silent_wav(self.phrase)
    }
}

/// Answers every recording from a script.  The last entry repeats once the
/// script runs out.
pub struct KeywordTranscriber {
    script: Mutex<VecDeque<Result<Transcript, TranscriptionError>>>,
}

impl KeywordTranscriber {
    /// Always hear `keyword`, with `language` as the detected language.
    pub fn new(keyword: &str, language: Option<&str>) -> Self {
        Self::scripted(vec![Ok(Transcript {
            text: keyword.to_string(),
            language: language.map(str::to_string),
        })])
    }

    pub fn scripted(script: Vec<Result<Transcript, TranscriptionError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }
}

#[async_trait]
impl Transcriber for KeywordTranscriber {
    async fn transcribe(&self, _recording: &[u8]) -> Result<Transcript, TranscriptionError> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| TranscriptionError::Failed("script poisoned".into()))?;
        match script.len() {
            0 => Err(TranscriptionError::Silence),
            1 => script.front().cloned().unwrap_or(Err(TranscriptionError::Silence)),
            _ => script.pop_front().unwrap_or(Err(TranscriptionError::Silence)),
        }
    }
}

/// Waits for the length of each clip instead of playing it.
#[derive(Default)]
pub struct WaitingSpeaker {
    played: Arc<Mutex<Vec<Duration>>>,
}

impl WaitingSpeaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lengths of every clip played so far.
    pub fn played(&self) -> Arc<Mutex<Vec<Duration>>> {
        Arc::clone(&self.played)
    }
}

#[async_trait]
impl Speaker for WaitingSpeaker {
    fn duration(&self, clip: &[u8]) -> Result<Duration, FishError> {
        wav_duration(clip)
    }

    async fn play(&self, clip: Vec<u8>) -> Result<(), FishError> {
        let length = wav_duration(&clip)?;
        if let Ok(mut played) = self.played.lock() {
            played.push(length);
        }
        sleep(length).await;
        Ok(())
    }
}

//! Cancellable voice capture.
//!
//! [`VoiceCapture::start`] records one phrase on a background task.  While
//! recording, the task polls the shared presence flag every
//! [`PRESENCE_POLL`]; if the visitor walks away the recording is abandoned
//! and the partial audio discarded.  The result arrives exactly once over a
//! oneshot channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, warn};

use crate::voice::Microphone;

/// How often a running capture checks whether the visitor is still there.
pub const PRESENCE_POLL: Duration = Duration::from_millis(100);

/// How a capture ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// A complete WAV recording.
    Captured(Vec<u8>),
    /// The visitor left or the capture was cancelled.
    Cancelled,
    /// The microphone failed.
    Failed(String),
}

/// Handle to a running capture.
pub struct VoiceCapture {
    outcome: oneshot::Receiver<CaptureOutcome>,
    task: JoinHandle<()>,
}

impl VoiceCapture {
    /// Start recording.  `present` is the orchestrator's belief that a
    /// visitor is in front of the fish.
    pub fn start(microphone: Arc<dyn Microphone>, present: Arc<AtomicBool>) -> Self {
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let outcome = record(microphone, present).await;
            // The receiver is gone when the capture was cancelled.
            let _ = tx.send(outcome);
        });
        Self { outcome: rx, task }
    }

    /// Wait for the outcome.  Cancel-safe; a capture whose task vanished
    /// reports [`CaptureOutcome::Cancelled`].
    pub async fn outcome(&mut self) -> CaptureOutcome {
        (&mut self.outcome).await.unwrap_or(CaptureOutcome::Cancelled)
    }

    /// Abort the recording.
    pub fn cancel(self) {
        self.task.abort();
        debug!("voice capture cancelled");
    }
}

async fn record(microphone: Arc<dyn Microphone>, present: Arc<AtomicBool>) -> CaptureOutcome {
    let mut poll = interval(PRESENCE_POLL);
    let listen = microphone.listen();
    tokio::pin!(listen);
    loop {
        tokio::select! {
            recorded = &mut listen => {
                return match recorded {
                    Ok(audio) => CaptureOutcome::Captured(audio),
                    Err(e) => {
                        warn!(error = %e, "voice capture failed");
                        CaptureOutcome::Failed(e.to_string())
                    }
                };
            }
            _ = poll.tick() => {
                if !present.load(Ordering::SeqCst) {
                    debug!("visitor left during capture; discarding audio");
                    return CaptureOutcome::Cancelled;
                }
            }
        }
    }
}

/// Resolves with the outcome of `capture`, or never when there is none.
pub async fn capture_done(capture: &mut Option<VoiceCapture>) -> CaptureOutcome {
    match capture {
        Some(c) => c.outcome().await,
        None => std::future::pending().await,
    }
}

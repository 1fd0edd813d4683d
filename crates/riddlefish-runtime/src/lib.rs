//! `riddlefish-runtime` – the conversation brain of the riddle fish.
//!
//! # Modules
//!
//! - [`orchestrator`] – [`SessionOrchestrator`][orchestrator::SessionOrchestrator]:
//!   the single async control loop that turns presence events and dialogue
//!   events into speech, gestures and outbound events.
//! - [`session`] – [`Session`][session::Session]: the visitor currently in
//!   front of the fish.
//! - [`puppet_link`] – [`PuppetLink`][puppet_link::PuppetLink]: one gesture
//!   at a time over the command/ack channel pair of the puppet worker.
//! - [`capture`] – [`VoiceCapture`][capture::VoiceCapture]: cancellable
//!   background recording of the visitor's answer.
//! - [`lipsync`] – mouth movement timed to the syllables of a clip.
//! - [`language`] – language choice from a transcript, random voice pick.
//! - [`audio`] – clips from local paths or the dialogue service's URLs.
//! - [`voice`] – the microphone, transcriber and speaker traits.
//! - [`prompts`] – the locally stored prompt clips.
//! - [`sim`] – headless voice collaborators for simulation mode.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod audio;
pub mod capture;
pub mod language;
pub mod lipsync;
pub mod orchestrator;
pub mod prompts;
pub mod puppet_link;
pub mod session;
pub mod sim;
pub mod telemetry;
pub mod voice;

pub use orchestrator::{OrchestratorConfig, SessionOrchestrator, VoiceKit};
pub use puppet_link::{Puppet, PuppetLink};
pub use telemetry::{TracerProviderGuard, init_tracing};

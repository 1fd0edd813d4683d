//! [`SessionOrchestrator`] – the fish's conversation loop.
//!
//! One Tokio task owns every piece of session state and reacts to five
//! kinds of wake-up:
//!
//! 1. **Presence** – a [`PresenceEvent`] from the presence worker.  A new
//!    visitor starts a [`Session`] (enrollment or a returning-visitor
//!    greeting); a sustained absence ends it.
//! 2. **Remote** – an [`InboundEvent`] from the dialogue service.
//! 3. **Capture** – a background [`VoiceCapture`] finished.
//! 4. **Reconnect** – the dialogue link's backoff timer fired.
//! 5. **Shutdown** – the shared shutdown flag was raised.
//!
//! Handlers run one at a time and may await long gestures and clips; events
//! arriving meanwhile queue up in their channels and are handled in order.
//!
//! ```text
//!             PersonDetected{is_new}        greet_new_player / greet_old_player
//!  NoVisitor ───────────────────────► Enrolling ─────────────────► AwaitingTurn
//!      ▲                                                      say │  ▲
//!      │ NoPersonSustained                                        ▼  │ answer sent
//!      └──────────────────────────── Ended ◄── say_no_continue ProcessingTurn
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use riddlefish_memory::preference::PreferenceStore;
use riddlefish_middleware::{ConnectionManager, DialogueTransport, reconnect_due};
use riddlefish_types::protocol::{
    InboundEvent, NewPlayerGreeting, OutboundEvent, RiddleAnswer, TurnContinue, TurnStop,
    encode_recording,
};
use riddlefish_types::{Language, Preference, PresenceEvent, PuppetCommand};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval, sleep};
use tracing::{debug, error, info, warn};

use crate::audio::{AudioFetcher, AudioSource};
use crate::capture::{CaptureOutcome, VoiceCapture, capture_done};
use crate::language::{derive_language, pick_voice};
use crate::lipsync::speak;
use crate::prompts::{PromptKind, Prompts};
use crate::puppet_link::Puppet;
use crate::session::{Phase, Session};
use crate::voice::{Microphone, Speaker, Transcriber, TranscriptionError};

/// Voice used when the configured list is empty.
pub const DEFAULT_VOICE: &str = "female_01.wav";

/// Configuration bundle for [`SessionOrchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub prompts: Prompts,
    /// Synthesis voices a new visitor is randomly assigned from.
    pub voices: Vec<String>,
    /// Pause between the English and the Dutch language prompt.
    pub prompt_gap: Duration,
    /// Pause between greeting a returning visitor and raising the head.
    pub greet_delay: Duration,
    /// Pause after lowering the head, before the success sound.
    pub celebrate_pause: Duration,
    pub tail_flaps: u32,
    pub flap_gap: Duration,
    /// How often the loop checks the shutdown flag.
    pub shutdown_poll: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            prompts: Prompts::default(),
            voices: vec![
                "female_01.wav".to_string(),
                "male_01.wav".to_string(),
                "male_02.wav".to_string(),
            ],
            prompt_gap: Duration::from_secs(1),
            greet_delay: Duration::from_millis(1500),
            celebrate_pause: Duration::from_millis(500),
            tail_flaps: 5,
            flap_gap: Duration::from_millis(500),
            shutdown_poll: Duration::from_millis(100),
        }
    }
}

/// The external voice collaborators.
#[derive(Clone)]
pub struct VoiceKit {
    pub microphone: Arc<dyn Microphone>,
    pub transcriber: Arc<dyn Transcriber>,
    pub speaker: Arc<dyn Speaker>,
    pub audio: AudioFetcher,
}

enum Wake {
    Presence(PresenceEvent),
    PresenceClosed,
    Remote(InboundEvent),
    LinkLost,
    Captured(CaptureOutcome),
    Reconnect,
    Idle,
    Shutdown,
}

/// What came of asking for the visitor's language once.
enum Heard {
    Language(Language, Vec<u8>),
    NotUnderstood,
    Left,
}

pub struct SessionOrchestrator<T, P, S>
where
    T: DialogueTransport,
    P: Puppet,
    S: PreferenceStore,
{
    conn: ConnectionManager<T>,
    puppet: P,
    preferences: S,
    voice: VoiceKit,
    config: OrchestratorConfig,
    presence: UnboundedReceiver<PresenceEvent>,
    presence_open: bool,
    /// Whether a visitor is believed to be in front of the fish.  Shared with
    /// running captures.
    present: Arc<AtomicBool>,
    session: Option<Session>,
    capture: Option<VoiceCapture>,
    shutdown: Arc<AtomicBool>,
}

impl<T, P, S> SessionOrchestrator<T, P, S>
where
    T: DialogueTransport,
    P: Puppet,
    S: PreferenceStore,
{
    pub fn new(
        conn: ConnectionManager<T>,
        puppet: P,
        preferences: S,
        voice: VoiceKit,
        config: OrchestratorConfig,
        presence: UnboundedReceiver<PresenceEvent>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            conn,
            puppet,
            preferences,
            voice,
            config,
            presence,
            presence_open: true,
            present: Arc::new(AtomicBool::new(false)),
            session: None,
            capture: None,
            shutdown,
        }
    }

    /// Run until the shutdown flag is raised, then close the dialogue link.
    pub async fn run(mut self) {
        info!("session orchestrator started");
        self.conn.start().await;
        let mut shutdown_poll = interval(self.config.shutdown_poll);

        loop {
            let reconnect_at = self.conn.reconnect_deadline();
            let wake = tokio::select! {
                event = self.presence.recv(), if self.presence_open => {
                    event.map_or(Wake::PresenceClosed, Wake::Presence)
                }
                event = self.conn.recv() => event.map_or(Wake::LinkLost, Wake::Remote),
                outcome = capture_done(&mut self.capture) => Wake::Captured(outcome),
                () = reconnect_due(reconnect_at) => Wake::Reconnect,
                _ = shutdown_poll.tick() => {
                    if self.shutdown_requested() { Wake::Shutdown } else { Wake::Idle }
                }
            };

            match wake {
                Wake::Presence(event) => self.on_presence(event).await,
                Wake::PresenceClosed => {
                    warn!("presence worker is gone; no more visitors will be noticed");
                    self.presence_open = false;
                }
                Wake::Remote(event) => self.on_remote(event).await,
                // A reconnect has already been scheduled.
                Wake::LinkLost => {}
                Wake::Captured(outcome) => {
                    self.capture = None;
                    self.on_answer(outcome).await;
                }
                Wake::Reconnect => {
                    self.conn.try_reconnect().await;
                }
                Wake::Idle => {}
                Wake::Shutdown => break,
            }
        }

        if let Some(capture) = self.capture.take() {
            capture.cancel();
        }
        self.conn.shutdown().await;
        info!("session orchestrator stopped");
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    // ── presence ────────────────────────────────────────────────────────────

    async fn on_presence(&mut self, event: PresenceEvent) {
        match event {
            PresenceEvent::PersonDetected {
                id,
                is_new,
                attributes,
            } => {
                self.present.store(true, Ordering::SeqCst);
                if let Some(session) = &self.session {
                    debug!(visitor = %session.id, seen = %id, "presence refreshed");
                    return;
                }
                info!(visitor = %id, is_new, age = %attributes.age_bucket, "visitor arrived");
                self.session = Some(Session::new(id, attributes));
                if is_new {
                    self.enroll().await;
                } else {
                    self.greet_returning().await;
                }
            }
            PresenceEvent::NoPersonSustained => self.visitor_left().await,
        }
    }

    async fn visitor_left(&mut self) {
        self.present.store(false, Ordering::SeqCst);
        let Some(session) = self.session.take() else {
            debug!("absence without an active visitor");
            return;
        };
        if let Some(capture) = self.capture.take() {
            capture.cancel();
        }
        self.puppet.perform(PuppetCommand::HeadDown).await;
        info!(visitor = %session.id, turns = session.turns, "visitor left");
    }

    /// Handle presence events that queued up while a long handler ran.
    /// Returns `false` if the visitor has left in the meantime.
    async fn drain_presence(&mut self) -> bool {
        while let Ok(event) = self.presence.try_recv() {
            match event {
                PresenceEvent::NoPersonSustained => {
                    self.visitor_left().await;
                    return false;
                }
                PresenceEvent::PersonDetected { .. } => self.present.store(true, Ordering::SeqCst),
            }
        }
        true
    }

    async fn greet_returning(&mut self) {
        let Some(id) = self.session.as_ref().map(|s| s.id) else {
            return;
        };
        let preference = match self.preferences.get(id) {
            Ok(Some(preference)) => preference,
            Ok(None) => {
                warn!(visitor = %id, "known visitor without preferences; enrolling again");
                return self.enroll().await;
            }
            Err(e) => {
                warn!(visitor = %id, error = %e, "unreadable preferences; enrolling again");
                return self.enroll().await;
            }
        };

        let Some(profile) = self.session.as_mut().and_then(|s| {
            s.preference = Some(preference);
            s.profile()
        }) else {
            return;
        };
        info!(visitor = %id, lang = %profile.lang, "greeting returning visitor");
        self.conn.emit(&OutboundEvent::GreetOldPlayer(profile)).await;
        sleep(self.config.greet_delay).await;
        self.puppet.perform(PuppetCommand::HeadUp).await;
        self.set_phase(Phase::AwaitingTurn);
    }

    // ── enrollment ──────────────────────────────────────────────────────────

    /// Ask for a language until one is understood, then register the visitor
    /// with the dialogue service.
    async fn enroll(&mut self) {
        let Some(id) = self.session.as_ref().map(|s| s.id) else {
            return;
        };
        // An answer recorded for the old session must not follow the new
        // greeting.
        if let Some(capture) = self.capture.take() {
            capture.cancel();
        }
        self.set_phase(Phase::Enrolling);
        self.puppet.perform(PuppetCommand::HeadUp).await;

        let (language, recording) = loop {
            self.say_prompt(PromptKind::English).await;
            sleep(self.config.prompt_gap).await;
            self.say_prompt(PromptKind::Dutch).await;

            match self.hear_language().await {
                Heard::Language(language, recording) => break (language, recording),
                Heard::Left => return self.visitor_left().await,
                Heard::NotUnderstood => {}
            }

            self.say_prompt(PromptKind::Repeat).await;
            if !self.drain_presence().await || self.shutdown_requested() {
                return;
            }
        };

        let voice = pick_voice(&self.config.voices).unwrap_or_else(|| DEFAULT_VOICE.to_string());
        let preference = Preference { id, language, voice };
        if let Err(e) = self.preferences.put(&preference) {
            error!(visitor = %id, error = %e, "could not store preferences");
        }
        info!(visitor = %id, lang = %language, voice = %preference.voice, "visitor enrolled");

        let Some(profile) = self.session.as_mut().and_then(|s| {
            s.preference = Some(preference.clone());
            s.profile()
        }) else {
            return;
        };
        self.conn
            .emit(&OutboundEvent::SavePlayerPreferences(preference))
            .await;
        self.conn
            .emit(&OutboundEvent::GreetNewPlayer(NewPlayerGreeting {
                player: profile,
                recording: encode_recording(&recording),
            }))
            .await;
        self.set_phase(Phase::AwaitingTurn);
    }

    /// Record one answer to the language prompts, giving up as soon as the
    /// visitor walks away.
    async fn hear_language(&mut self) -> Heard {
        let mut capture = VoiceCapture::start(Arc::clone(&self.voice.microphone), Arc::clone(&self.present));
        let outcome = loop {
            tokio::select! {
                outcome = capture.outcome() => break outcome,
                event = self.presence.recv(), if self.presence_open => match event {
                    Some(PresenceEvent::NoPersonSustained) => {
                        capture.cancel();
                        return Heard::Left;
                    }
                    Some(PresenceEvent::PersonDetected { .. }) => {
                        self.present.store(true, Ordering::SeqCst);
                    }
                    None => self.presence_open = false,
                },
            }
        };

        let recording = match outcome {
            CaptureOutcome::Captured(recording) => recording,
            CaptureOutcome::Cancelled => return Heard::Left,
            CaptureOutcome::Failed(details) => {
                warn!(%details, "could not record language choice");
                return Heard::NotUnderstood;
            }
        };
        match self.voice.transcriber.transcribe(&recording).await {
            Ok(transcript) => match derive_language(&transcript) {
                Some(language) => Heard::Language(language, recording),
                None => {
                    info!(heard = %transcript.text, "language not recognised");
                    Heard::NotUnderstood
                }
            },
            Err(TranscriptionError::Silence) => {
                info!("visitor said nothing");
                Heard::NotUnderstood
            }
            Err(e) => {
                warn!(error = %e, "transcription failed");
                Heard::NotUnderstood
            }
        }
    }

    // ── dialogue ────────────────────────────────────────────────────────────

    async fn on_remote(&mut self, event: InboundEvent) {
        debug!(event = event.name(), "dialogue event");
        match event {
            InboundEvent::Say(turn) => self.on_say(turn).await,
            InboundEvent::SayNoContinue(turn) => self.on_say_no_continue(turn).await,
            InboundEvent::RetryGreeting(retry) => match self.session.as_ref().map(|s| s.id) {
                Some(visitor) => {
                    info!(%visitor, player = %retry.player.id, "dialogue service asked to greet again");
                    self.enroll().await;
                }
                None => warn!(player = %retry.player.id, "retry_greeting without a visitor"),
            },
            InboundEvent::Error(remote) => {
                error!(error = %remote.error, "dialogue service reported an error");
                self.say_prompt(PromptKind::MemoryTrouble).await;
            }
        }
    }

    async fn on_say(&mut self, turn: TurnContinue) {
        if turn.answer_correct {
            info!(correct = turn.total_riddles_correct, "riddle solved");
            self.celebrate().await;
        }
        // The celebration takes seconds; the visitor may have left meanwhile.
        if !self.drain_presence().await {
            return;
        }

        let present = self.present.load(Ordering::SeqCst);
        let Some(session) = self.session.as_mut().filter(|_| present) else {
            debug!("visitor gone; not continuing the turn");
            self.puppet.perform(PuppetCommand::HeadDown).await;
            return;
        };
        session.phase = Phase::ProcessingTurn;
        session.turns += 1;
        let turns = session.turns;
        debug!(visitor = %session.id, turns, "continuing turn");

        self.say_reply(&turn.wav_location, &turn.transcription).await;

        if let Some(previous) = self.capture.take() {
            previous.cancel();
        }
        self.capture = Some(VoiceCapture::start(
            Arc::clone(&self.voice.microphone),
            Arc::clone(&self.present),
        ));
    }

    async fn on_answer(&mut self, outcome: CaptureOutcome) {
        match outcome {
            CaptureOutcome::Captured(recording) => {
                let Some(player) = self.session.as_ref().and_then(Session::profile) else {
                    debug!("answer recorded after the visitor left; dropping it");
                    return;
                };
                self.set_phase(Phase::AwaitingTurn);
                self.conn
                    .emit(&OutboundEvent::GiveAnswerOnRiddle(RiddleAnswer {
                        player,
                        recording: encode_recording(&recording),
                    }))
                    .await;
            }
            CaptureOutcome::Cancelled => debug!("answer capture cancelled"),
            CaptureOutcome::Failed(details) => {
                warn!(%details, "answer capture failed");
                self.set_phase(Phase::AwaitingTurn);
            }
        }
    }

    async fn on_say_no_continue(&mut self, turn: TurnStop) {
        self.say_reply(&turn.wav_location, &turn.transcription).await;
        self.puppet.perform(PuppetCommand::HeadDown).await;
        self.set_phase(Phase::Ended);
        info!(player = %turn.player.id, "conversation ended by dialogue service");
    }

    /// Head down, success sound with tail flaps, head up.
    async fn celebrate(&mut self) {
        self.puppet.perform(PuppetCommand::MouthClose).await;
        self.puppet.perform(PuppetCommand::HeadDown).await;
        sleep(self.config.celebrate_pause).await;

        let sound = match self
            .voice
            .audio
            .fetch(&AudioSource::parse(&self.config.prompts.success_sound))
            .await
        {
            Ok(sound) => Some(sound),
            Err(e) => {
                warn!(error = %e, "success sound unavailable");
                None
            }
        };
        let speaker = Arc::clone(&self.voice.speaker);
        let playback = async move {
            if let Some(sound) = sound {
                if let Err(e) = speaker.play(sound).await {
                    warn!(error = %e, "success sound failed");
                }
            }
        };
        let flaps = self.config.tail_flaps;
        let gap = self.config.flap_gap;
        let puppet = &mut self.puppet;
        let flapping = async move {
            for _ in 0..flaps {
                puppet.perform(PuppetCommand::TailUp).await;
                puppet.perform(PuppetCommand::TailDown).await;
                sleep(gap).await;
            }
        };
        tokio::join!(playback, flapping);

        self.puppet.perform(PuppetCommand::HeadUp).await;
    }

    // ── speech ──────────────────────────────────────────────────────────────

    async fn say_prompt(&mut self, kind: PromptKind) {
        let prompt = self.config.prompts.get(kind).clone();
        let clip = match self.voice.audio.fetch(&AudioSource::parse(&prompt.clip)).await {
            Ok(clip) => clip,
            Err(e) => {
                warn!(prompt = ?kind, error = %e, "prompt clip unavailable");
                return;
            }
        };
        if let Err(e) = speak(&mut self.puppet, self.voice.speaker.as_ref(), clip, &prompt.text).await {
            warn!(prompt = ?kind, error = %e, "prompt playback failed");
        }
    }

    /// Speak a reply synthesised by the dialogue service; fall back to the
    /// memory-trouble prompt if it cannot be fetched.
    async fn say_reply(&mut self, locator: &str, text: &str) {
        let clip = match self.voice.audio.fetch(&AudioSource::parse(locator)).await {
            Ok(clip) => clip,
            Err(e) => {
                warn!(error = %e, "reply audio unavailable");
                return self.say_prompt(PromptKind::MemoryTrouble).await;
            }
        };
        if let Err(e) = speak(&mut self.puppet, self.voice.speaker.as_ref(), clip, text).await {
            warn!(error = %e, "reply playback failed");
        }
    }

    fn set_phase(&mut self, phase: Phase) {
        if let Some(session) = self.session.as_mut() {
            session.phase = phase;
        }
    }
}

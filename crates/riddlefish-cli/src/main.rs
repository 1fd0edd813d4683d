//! `riddlefish-cli` – the riddle fish process.
//!
//! This binary is the ignition switch for the whole animatronic.  It:
//!
//! 1. Loads `~/.riddlefish/config.toml`, writing the defaults on first start.
//! 2. Opens the identity and preference stores.
//! 3. Starts the puppet worker (simulated board or `/dev/i2c-N`) and the
//!    presence worker on their own threads.
//! 4. Runs the session orchestrator on a Tokio runtime until **Ctrl-C**,
//!    then waits for both workers to park and exit.

mod config;

use colored::Colorize;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info, warn};

use riddlefish_hal::bus::RegisterBus;
use riddlefish_hal::puppet::PuppetController;
use riddlefish_hal::sim::{SimCamera, SimPuppetBus};
use riddlefish_memory::identity::SqliteIdentityStore;
use riddlefish_memory::preference::SqlitePreferenceStore;
use riddlefish_middleware::{Backoff, ConnectionManager, RetryPolicy, WebSocketTransport};
use riddlefish_perception::sim::{FixedAttributeClassifier, ScriptedFaceAnalyzer};
use riddlefish_perception::tracker::PresenceTracker;
use riddlefish_runtime::audio::{AudioFetcher, DEFAULT_FETCH_TIMEOUT};
use riddlefish_runtime::sim::{KeywordTranscriber, SilentMicrophone, WaitingSpeaker};
use riddlefish_runtime::{PuppetLink, SessionOrchestrator, VoiceKit, init_tracing};
use riddlefish_types::PresenceEvent;

use config::Config;

fn main() -> ExitCode {
    let _telemetry = init_tracing("riddlefish");

    print_banner();

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – parking the fish …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    let cfg = match load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match boot(&cfg, shutdown) {
        Ok(()) => {
            println!("  {} The fish is asleep.", "✓".green().bold());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "startup failed");
            ExitCode::FAILURE
        }
    }
}

/// Load the config, or write and use the defaults when there is none yet.
/// Environment overrides apply in both cases.
fn load_config() -> Result<Config, String> {
    let mut cfg = match config::load()? {
        Some(cfg) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        None => {
            let cfg = Config::default();
            config::save(&cfg)?;
            println!(
                "  {} Default config written to {}",
                "✓".green().bold(),
                config::config_path().display().to_string().bold()
            );
            cfg
        }
    };
    config::apply_env_overrides(&mut cfg);
    Ok(cfg)
}

fn step(n: u32, what: &str) {
    print!("  [{}/5] {} … ", n, what.bold());
    io::stdout().flush().ok();
}

fn failed(e: impl std::fmt::Display) -> String {
    println!("{}", "FAILED".red());
    e.to_string()
}

fn boot(cfg: &Config, shutdown: Arc<AtomicBool>) -> Result<(), String> {
    println!();
    println!("{}", "═══════════════════════════════════════".bold());
    println!("{}", "        Riddle Fish Boot Sequence      ".bold().cyan());
    println!("{}", "═══════════════════════════════════════".bold());

    // ── Step 1 – Stores ────────────────────────────────────────────────────
    step(1, &format!("Opening stores at {}", cfg.db_path));
    if let Some(parent) = std::path::Path::new(&cfg.db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(failed)?;
    }
    let identities = SqliteIdentityStore::open(&cfg.db_path).map_err(failed)?;
    let preferences = SqlitePreferenceStore::open(&cfg.db_path).map_err(failed)?;
    println!("{}", "OK".green());

    // ── Step 2 – Async runtime ─────────────────────────────────────────────
    step(2, "Building async runtime");
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("riddlefish-rt")
        .build()
        .map_err(failed)?;
    println!("{}", "OK".green());

    // ── Step 3 – Presence worker ───────────────────────────────────────────
    step(3, "Starting presence worker");
    let (presence_tx, presence_rx) = unbounded_channel();
    let presence_worker = spawn_presence(cfg, identities, presence_tx, shutdown.clone()).map_err(failed)?;
    println!("{}", "OK".green());

    // ── Step 4 – Puppet worker ─────────────────────────────────────────────
    let bus_name = if cfg.simulate {
        "simulated board".to_string()
    } else {
        format!("/dev/i2c-{} @ {:#04x}", cfg.puppet.i2c_bus, cfg.puppet.address)
    };
    step(4, &format!("Starting puppet worker ({})", bus_name));
    let (link, puppet_worker) = match open_bus(cfg)
        .and_then(|bus| spawn_puppet(bus, cfg, shutdown.clone()).map_err(|e| e.to_string()))
    {
        Ok(started) => started,
        Err(e) => {
            shutdown.store(true, Ordering::SeqCst);
            if presence_worker.join().is_err() {
                error!(worker = "presence", "worker thread panicked");
            }
            return Err(failed(e));
        }
    };
    println!("{}", "OK".green());

    // ── Step 5 – Orchestrator ──────────────────────────────────────────────
    step(5, &format!("Waking the orchestrator ({})", cfg.server_url));
    let conn = ConnectionManager::new(
        WebSocketTransport::new(cfg.server_url.clone()),
        Backoff::default(),
        RetryPolicy::default(),
    );
    let voice = VoiceKit {
        microphone: Arc::new(SilentMicrophone::new(cfg.phrase_limit())),
        transcriber: Arc::new(KeywordTranscriber::new(&cfg.simulation.answer, None)),
        speaker: Arc::new(WaitingSpeaker::new()),
        audio: AudioFetcher::new(DEFAULT_FETCH_TIMEOUT).map_err(failed)?,
    };
    let orchestrator = SessionOrchestrator::new(
        conn,
        link,
        preferences,
        voice,
        cfg.orchestrator_config(),
        presence_rx,
        shutdown.clone(),
    );
    println!("{}", "OK".green());
    println!("{}", "═══════════════════════════════════════".bold());
    println!("  {} The fish is {}. Press {} to stop.", "✓".green().bold(), "awake".green().bold(), "Ctrl-C".bold());

    runtime.block_on(orchestrator.run());
    runtime.shutdown_timeout(Duration::from_secs(1));

    // The orchestrator only returns on shutdown; make sure the workers see it.
    shutdown.store(true, Ordering::SeqCst);
    for (name, worker) in [("puppet", puppet_worker), ("presence", presence_worker)] {
        if worker.join().is_err() {
            error!(worker = name, "worker thread panicked");
        }
    }
    info!("all workers stopped");
    Ok(())
}

fn open_bus(cfg: &Config) -> Result<Box<dyn RegisterBus>, String> {
    if cfg.simulate {
        return Ok(Box::new(SimPuppetBus::new()));
    }
    open_i2c(cfg)
}

#[cfg(target_os = "linux")]
fn open_i2c(cfg: &Config) -> Result<Box<dyn RegisterBus>, String> {
    riddlefish_hal::i2c::LinuxI2cBus::open(cfg.puppet.i2c_bus, cfg.puppet.address)
        .map(|bus| Box::new(bus) as Box<dyn RegisterBus>)
        .map_err(|e| e.to_string())
}

#[cfg(not(target_os = "linux"))]
fn open_i2c(_cfg: &Config) -> Result<Box<dyn RegisterBus>, String> {
    Err("I²C is only available on Linux; set simulate = true".to_string())
}

fn spawn_puppet(
    bus: Box<dyn RegisterBus>,
    cfg: &Config,
    shutdown: Arc<AtomicBool>,
) -> io::Result<(PuppetLink, JoinHandle<()>)> {
    let (cmd_tx, cmd_rx) = mpsc::channel();
    let (ack_tx, ack_rx) = unbounded_channel();
    let controller = PuppetController::new(bus, cfg.puppet_config(), shutdown);
    let handle = thread::Builder::new()
        .name("puppet".to_string())
        .spawn(move || controller.run(cmd_rx, ack_tx))?;
    Ok((PuppetLink::new(cmd_tx, ack_rx), handle))
}

/// Only the scripted face models ship with this binary; real detectors are
/// wired in through the `FaceAnalyzer` and `AttributeClassifier` traits.
fn spawn_presence(
    cfg: &Config,
    identities: SqliteIdentityStore,
    events: tokio::sync::mpsc::UnboundedSender<PresenceEvent>,
    shutdown: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, String> {
    let sim = &cfg.simulation;
    let tracker = PresenceTracker::new(
        SimCamera::new("sim0"),
        ScriptedFaceAnalyzer::new(
            Duration::from_secs(sim.present_secs),
            Duration::from_secs(sim.absent_secs),
            sim.visitors,
        ),
        FixedAttributeClassifier::new(sim.age_bucket.clone(), 0.9),
        identities,
        cfg.presence_config(),
        events,
        shutdown,
    )
    .map_err(|e| e.to_string())?;
    thread::Builder::new()
        .name("presence".to_string())
        .spawn(move || tracker.run())
        .map_err(|e| e.to_string())
}

fn print_banner() {
    println!();
    println!("{}", r#"      ><(((('>   riddle fish"#.bold().cyan());
    println!();
    println!("  {} {}",
        "Riddle Fish".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Talking animatronic fish with a memory for faces");
    println!();
}

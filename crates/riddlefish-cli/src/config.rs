//! Configuration vault: reads/writes `~/.riddlefish/config.toml`.

use riddlefish_hal::puppet::PuppetConfig;
use riddlefish_hal::registers::DEFAULT_ADDRESS;
use riddlefish_perception::tracker::PresenceConfig;
use riddlefish_runtime::OrchestratorConfig;
use riddlefish_runtime::prompts::Prompts;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted settings stored in `~/.riddlefish/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket endpoint of the dialogue service.
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// SQLite file holding identities and preferences.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Drive the simulated puppet board instead of `/dev/i2c-N`.
    #[serde(default = "default_simulate")]
    pub simulate: bool,

    #[serde(default)]
    pub presence: PresenceSection,

    #[serde(default)]
    pub puppet: PuppetSection,

    #[serde(default)]
    pub voice: VoiceSection,

    #[serde(default)]
    pub prompts: Prompts,

    #[serde(default)]
    pub simulation: SimulationSection,
}

/// `[presence]`: tuning of the camera worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSection {
    pub process_interval: u32,
    pub detection_threshold: f32,
    pub similarity_threshold: f32,
    pub attribute_confidence_gate: f32,
    pub absence_timeout_ms: u64,
    pub cycle_sleep_ms: u64,
}

impl Default for PresenceSection {
    fn default() -> Self {
        let d = PresenceConfig::default();
        Self {
            process_interval: d.process_interval,
            detection_threshold: d.detection_threshold,
            similarity_threshold: d.similarity_threshold,
            attribute_confidence_gate: d.attribute_confidence_gate,
            absence_timeout_ms: d.absence_timeout.as_millis() as u64,
            cycle_sleep_ms: d.cycle_sleep.as_millis() as u64,
        }
    }
}

/// `[puppet]`: where the puppet board lives and how often it is polled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PuppetSection {
    pub i2c_bus: u8,
    pub address: u16,
    pub poll_interval_ms: u64,
}

impl Default for PuppetSection {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            address: DEFAULT_ADDRESS,
            poll_interval_ms: PuppetConfig::default().poll_interval.as_millis() as u64,
        }
    }
}

/// `[voice]`: reply voices and how long one answer may be.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceSection {
    pub voices: Vec<String>,
    pub phrase_limit_ms: u64,
}

impl Default for VoiceSection {
    fn default() -> Self {
        Self {
            voices: OrchestratorConfig::default().voices,
            phrase_limit_ms: 3000,
        }
    }
}

/// `[simulation]`: the scripted visitor used when no camera is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSection {
    /// How long each simulated visitor stays in view.
    pub present_secs: u64,
    /// Gap between two simulated visitors.
    pub absent_secs: u64,
    /// Number of distinct faces cycled through.
    pub visitors: usize,
    pub age_bucket: String,
    /// What the simulated visitor "says" every time it is recorded.
    pub answer: String,
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            present_secs: 60,
            absent_secs: 15,
            visitors: 2,
            age_bucket: "(8-12)".to_string(),
            answer: "English".to_string(),
        }
    }
}

fn default_server_url() -> String {
    "ws://localhost:8081/ws".to_string()
}
fn default_db_path() -> String {
    home_dir()
        .join(".riddlefish")
        .join("riddlefish.db")
        .to_string_lossy()
        .into_owned()
}
fn default_simulate() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            db_path: default_db_path(),
            simulate: default_simulate(),
            presence: PresenceSection::default(),
            puppet: PuppetSection::default(),
            voice: VoiceSection::default(),
            prompts: Prompts::default(),
            simulation: SimulationSection::default(),
        }
    }
}

impl Config {
    pub fn presence_config(&self) -> PresenceConfig {
        PresenceConfig {
            process_interval: self.presence.process_interval.max(1),
            detection_threshold: self.presence.detection_threshold,
            similarity_threshold: self.presence.similarity_threshold,
            attribute_confidence_gate: self.presence.attribute_confidence_gate,
            absence_timeout: Duration::from_millis(self.presence.absence_timeout_ms),
            cycle_sleep: Duration::from_millis(self.presence.cycle_sleep_ms),
        }
    }

    pub fn puppet_config(&self) -> PuppetConfig {
        PuppetConfig {
            poll_interval: Duration::from_millis(self.puppet.poll_interval_ms),
            ..PuppetConfig::default()
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let mut cfg = OrchestratorConfig {
            prompts: self.prompts.clone(),
            ..OrchestratorConfig::default()
        };
        if !self.voice.voices.is_empty() {
            cfg.voices = self.voice.voices.clone();
        }
        cfg
    }

    pub fn phrase_limit(&self) -> Duration {
        Duration::from_millis(self.voice.phrase_limit_ms)
    }
}

fn home_dir() -> PathBuf {
    PathBuf::from(
        std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Return the path to `~/.riddlefish/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &Path) -> PathBuf {
    home.join(".riddlefish").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

fn parse_flag(v: &str) -> Option<bool> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply `RIDDLEFISH_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `RIDDLEFISH_SERVER_URL` | `server_url` |
/// | `RIDDLEFISH_I2C_BUS` | `puppet.i2c_bus` |
/// | `RIDDLEFISH_DB_PATH` | `db_path` |
/// | `RIDDLEFISH_SIMULATE` | `simulate` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("RIDDLEFISH_SERVER_URL") {
        cfg.server_url = v;
    }
    if let Ok(v) = std::env::var("RIDDLEFISH_I2C_BUS")
        && let Ok(bus) = v.trim().parse::<u8>()
    {
        cfg.puppet.i2c_bus = bus;
    }
    if let Ok(v) = std::env::var("RIDDLEFISH_DB_PATH") {
        cfg.db_path = v;
    }
    if let Ok(v) = std::env::var("RIDDLEFISH_SIMULATE")
        && let Some(flag) = parse_flag(&v)
    {
        cfg.simulate = flag;
    }
}

/// Save the config to disk, creating `~/.riddlefish/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-var tests share the process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.puppet.address, DEFAULT_ADDRESS);
        assert_eq!(loaded.voice.voices.len(), 3);
    }

    #[test]
    fn config_path_points_to_riddlefish_dir() {
        let p = config_path_for_home(Path::new("/home/testuser"));
        assert_eq!(p, PathBuf::from("/home/testuser/.riddlefish/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(dir.path());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "simulate = false\n[puppet]\ni2c_bus = 3\n[prompts.english]\nclip = \"en.wav\"\ntext = \"English please?\"\n",
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert!(!cfg.simulate);
        assert_eq!(cfg.puppet.i2c_bus, 3);
        assert_eq!(cfg.puppet.address, DEFAULT_ADDRESS);
        assert_eq!(cfg.prompts.english.clip, "en.wav");
        assert_eq!(cfg.prompts.dutch, Prompts::default().dutch);
        assert_eq!(cfg.server_url, default_server_url());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "simulate = \"maybe").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn sections_map_to_worker_configs() {
        let mut cfg = Config::default();
        cfg.presence.absence_timeout_ms = 1200;
        cfg.presence.process_interval = 0;
        cfg.puppet.poll_interval_ms = 20;
        cfg.voice.voices = vec!["robot.wav".into()];
        cfg.voice.phrase_limit_ms = 2500;

        assert_eq!(cfg.presence_config().absence_timeout, Duration::from_millis(1200));
        assert_eq!(cfg.presence_config().process_interval, 1);
        assert_eq!(cfg.puppet_config().poll_interval, Duration::from_millis(20));
        assert_eq!(cfg.orchestrator_config().voices, vec!["robot.wav".to_string()]);
        assert_eq!(cfg.phrase_limit(), Duration::from_millis(2500));

        cfg.voice.voices.clear();
        assert_eq!(cfg.orchestrator_config().voices.len(), 3);
    }

    #[test]
    fn apply_env_overrides_changes_fields() {
        let _guard = ENV_LOCK.lock().unwrap();
        // SAFETY: env access is serialised by ENV_LOCK.
        unsafe {
            std::env::set_var("RIDDLEFISH_SERVER_URL", "ws://fish-host:9000/ws");
            std::env::set_var("RIDDLEFISH_I2C_BUS", "4");
            std::env::set_var("RIDDLEFISH_DB_PATH", "/var/lib/fish.db");
            std::env::set_var("RIDDLEFISH_SIMULATE", "false");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("RIDDLEFISH_SERVER_URL");
            std::env::remove_var("RIDDLEFISH_I2C_BUS");
            std::env::remove_var("RIDDLEFISH_DB_PATH");
            std::env::remove_var("RIDDLEFISH_SIMULATE");
        }
        assert_eq!(cfg.server_url, "ws://fish-host:9000/ws");
        assert_eq!(cfg.puppet.i2c_bus, 4);
        assert_eq!(cfg.db_path, "/var/lib/fish.db");
        assert!(!cfg.simulate);
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        // SAFETY: env access is serialised by ENV_LOCK.
        unsafe {
            std::env::set_var("RIDDLEFISH_I2C_BUS", "not-a-bus");
            std::env::set_var("RIDDLEFISH_SIMULATE", "perhaps");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        unsafe {
            std::env::remove_var("RIDDLEFISH_I2C_BUS");
            std::env::remove_var("RIDDLEFISH_SIMULATE");
        }
        assert_eq!(cfg.puppet.i2c_bus, 1);
        assert!(cfg.simulate);
    }
}

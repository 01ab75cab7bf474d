//! Layered configuration: embedded defaults, then the user's file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use dicepad_types::{SampleBank, DEFAULT_STEPS, MAX_STEPS};

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(path, e) => write!(f, "could not read config {}: {}", path.display(), e),
            Self::Parse(path, e) => write!(f, "malformed config {}: {}", path.display(), e),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(_, e) => Some(e),
            Self::Parse(_, e) => Some(e),
        }
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    defaults: DefaultsConfig,
    #[serde(default)]
    engine: EngineSection,
}

#[derive(Deserialize, Default)]
struct DefaultsConfig {
    bpm: Option<f32>,
    master_volume: Option<f32>,
    chaos: Option<f32>,
    bias: Option<f32>,
    pattern_length: Option<usize>,
    seed: Option<u64>,
}

#[derive(Deserialize, Default)]
struct EngineSection {
    feedback_capacity: Option<usize>,
    sink_capacity: Option<usize>,
    telemetry_interval_ms: Option<u64>,
}

/// Tuning for the scheduler thread and its channels.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub feedback_capacity: usize,
    pub sink_capacity: usize,
    /// Zero disables telemetry summaries.
    pub telemetry_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feedback_capacity: 1024,
            sink_capacity: 1024,
            telemetry_interval: Duration::from_secs(5),
        }
    }
}

pub struct Config {
    defaults: DefaultsConfig,
    engine: EngineSection,
}

impl Config {
    /// Embedded defaults overlaid with `~/.config/dicepad/config.toml`.
    pub fn load() -> Self {
        Self::load_with(user_config_path().as_deref())
    }

    /// Embedded defaults overlaid with `path`, if it exists. Unreadable or
    /// malformed files are logged and skipped.
    pub fn load_with(path: Option<&Path>) -> Self {
        let mut base: ConfigFile = match toml::from_str(DEFAULT_CONFIG) {
            Ok(base) => base,
            Err(e) => {
                log::error!(target: "config", "embedded config.toml is invalid: {}", e);
                ConfigFile::default()
            }
        };

        if let Some(path) = path.filter(|p| p.exists()) {
            match read_file(path) {
                Ok(user) => {
                    merge_defaults(&mut base.defaults, user.defaults);
                    merge_engine(&mut base.engine, user.engine);
                    log::info!(target: "config", "loaded {}", path.display());
                }
                Err(e) => log::warn!(target: "config", "ignoring {}", e),
            }
        }

        Config {
            defaults: base.defaults,
            engine: base.engine,
        }
    }

    pub fn bpm(&self) -> f32 {
        self.defaults.bpm.unwrap_or(120.0)
    }

    pub fn seed(&self) -> Option<u64> {
        self.defaults.seed
    }

    pub fn pattern_length(&self) -> usize {
        self.defaults
            .pattern_length
            .unwrap_or(DEFAULT_STEPS)
            .clamp(1, MAX_STEPS)
    }

    /// A fresh bank with the configured tempo, levels and seed.
    pub fn new_bank(&self) -> SampleBank {
        let mut bank = SampleBank::new();
        self.apply_to(&mut bank);
        bank
    }

    /// Apply the `[defaults]` section to an existing bank.
    pub fn apply_to(&self, bank: &mut SampleBank) {
        let d = &self.defaults;
        bank.set_bpm(self.bpm());
        if let Some(v) = d.master_volume {
            bank.set_master_volume(v);
        }
        if let Some(c) = d.chaos {
            bank.set_chaos(c);
        }
        if let Some(b) = d.bias {
            bank.set_bias(b);
        }
        if d.pattern_length.is_some() {
            let len = self.pattern_length();
            for i in 0..bank.patterns().len() {
                if let Some(p) = bank.pattern_mut(i) {
                    p.set_length(len);
                }
            }
        }
        if d.seed.is_some() {
            bank.random_seed = d.seed;
        }
    }

    pub fn engine(&self) -> EngineConfig {
        let fallback = EngineConfig::default();
        EngineConfig {
            feedback_capacity: self
                .engine
                .feedback_capacity
                .unwrap_or(fallback.feedback_capacity)
                .max(1),
            sink_capacity: self
                .engine
                .sink_capacity
                .unwrap_or(fallback.sink_capacity)
                .max(1),
            telemetry_interval: self
                .engine
                .telemetry_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(fallback.telemetry_interval),
        }
    }
}

pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("dicepad").join("config.toml"))
}

fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

fn merge_defaults(base: &mut DefaultsConfig, user: DefaultsConfig) {
    if user.bpm.is_some() {
        base.bpm = user.bpm;
    }
    if user.master_volume.is_some() {
        base.master_volume = user.master_volume;
    }
    if user.chaos.is_some() {
        base.chaos = user.chaos;
    }
    if user.bias.is_some() {
        base.bias = user.bias;
    }
    if user.pattern_length.is_some() {
        base.pattern_length = user.pattern_length;
    }
    if user.seed.is_some() {
        base.seed = user.seed;
    }
}

fn merge_engine(base: &mut EngineSection, user: EngineSection) {
    if user.feedback_capacity.is_some() {
        base.feedback_capacity = user.feedback_capacity;
    }
    if user.sink_capacity.is_some() {
        base.sink_capacity = user.sink_capacity;
    }
    if user.telemetry_interval_ms.is_some() {
        base.telemetry_interval_ms = user.telemetry_interval_ms;
    }
}

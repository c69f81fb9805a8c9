use anyhow::{anyhow, Result};
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::models::SendMode;

/// Environment variable that moves the settings directory
pub const CONFIG_DIR_ENV: &str = "OPTIMIST_CONFIG_DIR";

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("failure rate must be within 0.0..=1.0, got {0}")]
    FailureRate(f64),
}

/// Knobs of the simulated chat
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Latency of every simulated send, in milliseconds
    pub delay_ms: u64,
    /// Probability that a simulated send fails
    pub failure_rate: f64,
    pub mode: SendMode,
    /// Open the chat with a short canned conversation
    pub seed_conversation: bool,
    /// Keep the input disabled while anything is in flight
    pub lock_input_while_pending: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            delay_ms: 2000,
            failure_rate: 0.2,
            mode: SendMode::Optimistic,
            seed_conversation: true,
            lock_input_while_pending: true,
        }
    }
}

impl Settings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(ConfigError::FailureRate(self.failure_rate));
        }
        Ok(())
    }
}

static CONFIG_DIR_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Pin the settings directory for the rest of the process. Only the first call wins.
pub fn set_config_dir_override(dir: PathBuf) {
    if CONFIG_DIR_OVERRIDE.set(dir).is_err() {
        info!("Settings directory already overridden, keeping the first value");
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = if let Some(dir) = CONFIG_DIR_OVERRIDE.get() {
        dir.clone()
    } else if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        PathBuf::from(dir)
    } else {
        dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join("optimist")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn settings_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join(SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> Result<Option<Settings>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let settings: Settings = serde_json::from_str(&contents)?;
    settings.validate()?;
    info!("Loaded settings from {}", path.display());

    Ok(Some(settings))
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    settings.validate()?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, settings)?;

    info!("Settings saved to {}", path.display());
    Ok(())
}

pub fn load_settings() -> Result<Option<Settings>> {
    load_settings_from(&settings_path()?)
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(&settings_path()?, settings)
}

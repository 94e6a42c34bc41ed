//! TOML configuration file loading
//!
//! Supports `~/.config/atc/config.toml` as the persistent config source.
//! Every field is optional; anything left out falls back to the defaults in
//! [`super::Config`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AtcConfigFile {
    /// Worker credentials, one per worker
    #[serde(default)]
    pub tokens: Vec<String>,

    /// Users allowed to run admin commands
    #[serde(default)]
    pub admin_ids: Vec<u64>,

    /// Speech provider selection (e.g. "festival", or a clip directory)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// First word of a command message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_prefix: Option<String>,

    /// Delays and polling intervals
    #[serde(default)]
    pub timing: TimingFileConfig,

    /// Fleet policy knobs
    #[serde(default)]
    pub fleet: FleetFileConfig,

    /// Speech backend settings
    #[serde(default)]
    pub speech: SpeechFileConfig,
}

/// Timing configuration, all values in milliseconds
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct TimingFileConfig {
    /// Delay between a triggering event and the start of draining
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,

    /// Interval for polling "is audio playing"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_ms: Option<u64>,

    /// Wait before retrying a refused playback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_ms: Option<u64>,

    /// Idle watchdog tick
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watchdog_interval_ms: Option<u64>,

    /// Wait before restarting a closed worker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_delay_ms: Option<u64>,
}

/// Fleet policy configuration
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FleetFileConfig {
    /// Priority a freshly started worker begins with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_priority: Option<i64>,

    /// Upper bound of the idle-shedding draw (inclusive)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shed_range: Option<u32>,
}

/// Speech backend configuration
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SpeechFileConfig {
    /// Directory for rendered clips
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<String>,
}

/// Load the TOML config file at `path`
///
/// Returns `AtcConfigFile::default()` if the file doesn't exist.
///
/// # Errors
///
/// Returns error if the file exists but cannot be read or parsed
pub fn load_config_file(path: &Path) -> Result<AtcConfigFile> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(AtcConfigFile::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");

    Ok(config)
}

/// Write the config file to `path`, creating parent directories
///
/// # Errors
///
/// Returns error if serialization or the write fails
pub fn save_config_file(path: &Path, config: &AtcConfigFile) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::debug!(path = %path.display(), "saved config file");

    Ok(())
}

/// Return the config file path: `~/.config/atc/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("atc").join("config.toml"))
}

//! Configuration management for the announcer fleet

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use self::file::{AtcConfigFile, FleetFileConfig, SpeechFileConfig, TimingFileConfig};
use crate::{Error, Result};

/// Voice selected when none is configured
pub const DEFAULT_VOICE_NAME: &str = "festival";

/// Default first word of a command message
pub const DEFAULT_COMMAND_PREFIX: &str = "`atc";

/// Fleet configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Where this configuration is persisted
    pub path: PathBuf,

    /// Worker credentials, one worker per token
    pub tokens: Vec<String>,

    /// Users allowed to run admin commands
    pub admin_ids: Vec<u64>,

    /// Speech provider selection
    pub voice: String,

    /// First word of a command message
    pub command_prefix: String,

    /// Delays and polling intervals
    pub timing: Timing,

    /// Priority and shedding policy
    pub fleet: FleetSettings,

    /// Speech backend settings
    pub speech: SpeechConfig,
}

/// Delays used by workers and the fleet supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Delay between a triggering event and the start of draining
    pub debounce: Duration,

    /// Interval for polling "is audio playing"
    pub poll: Duration,

    /// Wait before retrying a refused playback
    pub retry: Duration,

    /// Idle watchdog tick
    pub watchdog_interval: Duration,

    /// Wait before restarting a closed worker
    pub restart_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(1),
            poll: Duration::from_millis(100),
            retry: Duration::from_millis(100),
            watchdog_interval: Duration::from_secs(1),
            restart_delay: Duration::from_secs(1),
        }
    }
}

impl Timing {
    fn from_file(file: &TimingFileConfig) -> Self {
        let defaults = Self::default();
        let ms = |v: Option<u64>, d: Duration| v.map_or(d, Duration::from_millis);

        Self {
            debounce: ms(file.debounce_ms, defaults.debounce),
            poll: ms(file.poll_ms, defaults.poll),
            retry: ms(file.retry_ms, defaults.retry),
            watchdog_interval: ms(file.watchdog_interval_ms, defaults.watchdog_interval),
            restart_delay: ms(file.restart_delay_ms, defaults.restart_delay),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_file(self) -> TimingFileConfig {
        let ms = |d: Duration| Some(d.as_millis() as u64);

        TimingFileConfig {
            debounce_ms: ms(self.debounce),
            poll_ms: ms(self.poll),
            retry_ms: ms(self.retry),
            watchdog_interval_ms: ms(self.watchdog_interval),
            restart_delay_ms: ms(self.restart_delay),
        }
    }
}

/// Priority and shedding policy for the fleet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetSettings {
    /// Priority a freshly started worker begins with
    pub base_priority: i64,

    /// Upper bound (inclusive) of the idle-shedding draw
    pub shed_range: u32,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            base_priority: 0,
            shed_range: 3600,
        }
    }
}

/// Speech backend configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechConfig {
    /// Directory for rendered clips
    pub temp_dir: PathBuf,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("temp"),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or the standard location when `None`
    ///
    /// # Errors
    ///
    /// Returns error if the file is unreadable or malformed, or if no
    /// standard config location can be determined
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => file::config_file_path()
                .ok_or_else(|| Error::Config("cannot determine config directory".to_string()))?,
        };

        let file = file::load_config_file(&path)?;
        Ok(Self::from_file(path, file))
    }

    /// Build a configuration from a parsed file, applying defaults
    #[must_use]
    pub fn from_file(path: PathBuf, file: AtcConfigFile) -> Self {
        let speech_defaults = SpeechConfig::default();
        let fleet_defaults = FleetSettings::default();

        let tokens = file
            .tokens
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Self {
            path,
            tokens,
            admin_ids: file.admin_ids,
            voice: file
                .voice
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_VOICE_NAME.to_string()),
            command_prefix: file
                .command_prefix
                .unwrap_or_else(|| DEFAULT_COMMAND_PREFIX.to_string()),
            timing: Timing::from_file(&file.timing),
            fleet: FleetSettings {
                base_priority: file
                    .fleet
                    .base_priority
                    .unwrap_or(fleet_defaults.base_priority),
                shed_range: file.fleet.shed_range.unwrap_or(fleet_defaults.shed_range),
            },
            speech: SpeechConfig {
                temp_dir: file
                    .speech
                    .temp_dir
                    .map_or(speech_defaults.temp_dir, PathBuf::from),
            },
        }
    }

    /// Convert back into the file schema
    #[must_use]
    pub fn to_file(&self) -> AtcConfigFile {
        AtcConfigFile {
            tokens: self.tokens.clone(),
            admin_ids: self.admin_ids.clone(),
            voice: Some(self.voice.clone()),
            command_prefix: Some(self.command_prefix.clone()),
            timing: self.timing.to_file(),
            fleet: FleetFileConfig {
                base_priority: Some(self.fleet.base_priority),
                shed_range: Some(self.fleet.shed_range),
            },
            speech: SpeechFileConfig {
                temp_dir: Some(self.speech.temp_dir.display().to_string()),
            },
        }
    }

    /// Persist the configuration to [`Config::path`]
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written
    pub fn save(&self) -> Result<()> {
        file::save_config_file(&self.path, &self.to_file())
    }

    /// Ensure the configuration can run a fleet
    ///
    /// # Errors
    ///
    /// Returns error if no worker tokens are configured
    pub fn validate(&self) -> Result<()> {
        if self.tokens.is_empty() {
            return Err(Error::Config(
                "at least one worker token must be provided".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `user_id` may run admin commands
    #[must_use]
    pub fn is_admin(&self, user_id: u64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

//! Rule configuration, loaded from TOML.
//!
//! ```toml
//! [global]
//! strip_to_notes = true
//! force_channel_zero = true
//! strip_keep_meta = ["tempo", "time_signature"]
//! ignore_filename_contains = ["_orig"]
//! ignore_folders = ["archive"]
//!
//! [watch]
//! debounce_ms = 1000
//!
//! [rules.bass]
//! filename_contains = ["bass"]
//! transpose_semitones = -12
//! track_name = "Bass"
//!
//! [rules.drums]
//! filename_contains = ["drum", "perc"]
//! max_note_length = "1/8"
//!
//! [rules.wildcard]
//! track_name = "Keys"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::midi_event::META_SUBTYPE_NAMES;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "midiwatch.toml";

/// Configuration loading errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub watch: WatchConfig,

    pub rules: RulesConfig,
}

/// Toggles applied to every file.
#[derive(Debug, Clone, Deserialize)]
pub struct GlobalConfig {
    #[serde(default = "default_true")]
    pub strip_to_notes: bool,

    #[serde(default = "default_true")]
    pub force_channel_zero: bool,

    /// Meta subtype names that survive stripping (e.g. `"tempo"`).
    #[serde(default)]
    pub strip_keep_meta: Vec<String>,

    #[serde(default)]
    pub ignore_filename_contains: Vec<String>,

    #[serde(default)]
    pub ignore_folders: Vec<String>,

    /// Stamp transposed files so a restart never transposes them again.
    #[serde(default)]
    pub mark_processed: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            strip_to_notes: true,
            force_channel_zero: true,
            strip_keep_meta: Vec::new(),
            ignore_filename_contains: Vec::new(),
            ignore_folders: Vec::new(),
            mark_processed: false,
        }
    }
}

/// Timing knobs for the watcher and file I/O.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub debounce_ms: u64,
    /// How long after a self-write an unchanged file is still treated as ours.
    pub self_write_window_ms: u64,
    pub read_attempts: u32,
    pub read_retry_delay_ms: u64,
    pub replace_attempts: u32,
    pub replace_retry_delay_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 1000,
            self_write_window_ms: 2000,
            read_attempts: 5,
            read_retry_delay_ms: 100,
            replace_attempts: 3,
            replace_retry_delay_ms: 100,
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn self_write_window(&self) -> Duration {
        Duration::from_millis(self.self_write_window_ms)
    }

    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }

    pub fn replace_retry_delay(&self) -> Duration {
        Duration::from_millis(self.replace_retry_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesConfig {
    pub bass: BassRule,
    pub drums: DrumsRule,
    #[serde(default)]
    pub wildcard: Option<WildcardRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BassRule {
    pub filename_contains: Vec<String>,
    pub transpose_semitones: i32,
    #[serde(default)]
    pub track_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DrumsRule {
    pub filename_contains: Vec<String>,
    /// Note-length spec, e.g. `"1/8"`. Resolved per file.
    pub max_note_length: String,
    #[serde(default)]
    pub track_name: Option<String>,
}

/// Applies to files no other rule matched. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WildcardRule {
    #[serde(default)]
    pub transpose_semitones: Option<i32>,
    #[serde(default)]
    pub track_name: Option<String>,
    #[serde(default)]
    pub max_note_length: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load and validate the config at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&contents, path)
    }

    /// Parse and validate TOML. `path` is only used in error messages.
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for name in &self.global.strip_keep_meta {
            if !META_SUBTYPE_NAMES.contains(&name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "unknown meta subtype {name:?} in global.strip_keep_meta"
                )));
            }
        }

        let rules = &self.rules;
        check_keywords(
            "rules.bass.filename_contains",
            &rules.bass.filename_contains,
        )?;
        check_keywords(
            "rules.drums.filename_contains",
            &rules.drums.filename_contains,
        )?;

        check_semitones(
            "rules.bass.transpose_semitones",
            rules.bass.transpose_semitones,
        )?;
        let wildcard = rules.wildcard.as_ref();
        if let Some(semitones) = wildcard.and_then(|w| w.transpose_semitones) {
            check_semitones("rules.wildcard.transpose_semitones", semitones)?;
        }

        let watch = &self.watch;
        if watch.debounce_ms == 0 {
            return Err(ConfigError::Invalid(
                "watch.debounce_ms must be positive".into(),
            ));
        }
        if watch.read_attempts == 0 || watch.replace_attempts == 0 {
            return Err(ConfigError::Invalid(
                "watch.read_attempts and watch.replace_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn check_keywords(field: &str, keywords: &[String]) -> Result<(), ConfigError> {
    if keywords.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must not be empty")));
    }
    if keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(ConfigError::Invalid(format!(
            "{field} contains an empty keyword"
        )));
    }
    Ok(())
}

fn check_semitones(field: &str, semitones: i32) -> Result<(), ConfigError> {
    if !(-127..=127).contains(&semitones) {
        return Err(ConfigError::Invalid(format!(
            "{field} must be within -127..=127, got {semitones}"
        )));
    }
    Ok(())
}

//! Configuration loading and management
//!
//! The daemon reads its watches from a JSON file:
//!
//! ```json
//! {
//!   "hotstrings": [
//!     { "name": "btw", "trigger": "btw", "replacement": "by the way" },
//!     { "name": "sig", "trigger": "sig", "ctrl": true, "threshold_ms": 1500 }
//!   ],
//!   "hotkeys": [
//!     { "id": "pause", "key": "p", "ctrl": true, "alt": true }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::hotkey::{vk, HotkeyCombo, ModifierState};
use crate::state::{TriggerError, TriggerSpec, DEFAULT_THRESHOLD};

/// Environment variable overriding the watch file location
pub const CONFIG_ENV: &str = "HOTSTRINGD_CONFIG";

/// Errors in the watch file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid watch file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("hotstring '{name}': {source}")]
    InvalidTrigger { name: String, source: TriggerError },

    #[error("hotkey '{id}': unsupported key {key:?}")]
    InvalidKey { id: String, key: String },

    #[error("duplicate name '{0}'")]
    Duplicate(String),
}

fn default_threshold_ms() -> u64 {
    DEFAULT_THRESHOLD.as_millis() as u64
}

/// One hotstring watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotstringConfig {
    pub name: String,
    pub trigger: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub system: bool,
    /// Time budget for typing the whole trigger
    #[serde(default = "default_threshold_ms")]
    pub threshold_ms: u64,
    /// Text typed in place of the trigger when it fires
    #[serde(default)]
    pub replacement: Option<String>,
}

impl HotstringConfig {
    /// `[ctrl, alt, shift, system]`
    pub fn modifiers(&self) -> [bool; 4] {
        [self.ctrl, self.alt, self.shift, self.system]
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }
}

/// One key-combination hotkey
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotkeyConfig {
    pub id: String,
    /// A single letter or digit
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub system: bool,
}

impl HotkeyConfig {
    pub fn combo(&self) -> Result<HotkeyCombo, ConfigError> {
        let invalid = || ConfigError::InvalidKey {
            id: self.id.clone(),
            key: self.key.clone(),
        };

        let mut chars = self.key.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return Err(invalid());
        };
        let keycode = match c {
            '0'..='9' => c as u32,
            _ => vk::from_letter(c).ok_or_else(invalid)?,
        };

        let modifiers = ModifierState {
            control: self.ctrl,
            alt: self.alt,
            shift: self.shift,
            system: self.system,
        };
        Ok(HotkeyCombo::new(keycode, modifiers))
    }
}

/// Contents of the watch file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchFile {
    #[serde(default)]
    pub hotstrings: Vec<HotstringConfig>,
    #[serde(default)]
    pub hotkeys: Vec<HotkeyConfig>,
}

impl WatchFile {
    /// Parse and validate
    pub fn parse(json: &str) -> Result<Self, ConfigError> {
        let file: WatchFile = serde_json::from_str(json)?;
        file.validate()?;
        Ok(file)
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::parse(&json)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for hotstring in &self.hotstrings {
            TriggerSpec::new(&hotstring.trigger, ModifierState::from_array(hotstring.modifiers())).map_err(
                |source| ConfigError::InvalidTrigger {
                    name: hotstring.name.clone(),
                    source,
                },
            )?;
            if !names.insert(hotstring.name.as_str()) {
                return Err(ConfigError::Duplicate(hotstring.name.clone()));
            }
        }

        let mut ids = HashSet::new();
        for hotkey in &self.hotkeys {
            hotkey.combo()?;
            if !ids.insert(hotkey.id.as_str()) {
                return Err(ConfigError::Duplicate(hotkey.id.clone()));
            }
        }
        Ok(())
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Path of the JSON watch file
    pub watch_path: PathBuf,

    /// Watches loaded from `watch_path`
    pub watches: WatchFile,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let data_dir = default_data_dir()?;
        let watch_path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("hotstrings.json"));

        Self::load_from(data_dir, watch_path)
    }

    /// Load with explicit locations. A missing watch file means no watches.
    pub fn load_from(data_dir: PathBuf, watch_path: PathBuf) -> Result<Self> {
        let watches = if watch_path.exists() {
            WatchFile::read(&watch_path).with_context(|| format!("loading {}", watch_path.display()))?
        } else {
            warn!(path = %watch_path.display(), "watch file not found, starting with no watches");
            WatchFile::default()
        };

        Ok(Self {
            data_dir,
            watch_path,
            watches,
        })
    }
}

fn default_data_dir() -> Result<PathBuf> {
    if let Some(app_data) = std::env::var_os("APPDATA") {
        return Ok(PathBuf::from(app_data).join("hotstringd"));
    }
    let home = std::env::var("HOME").context("neither APPDATA nor HOME is set")?;
    Ok(PathBuf::from(home).join(".local").join("share").join("hotstringd"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let file = WatchFile::parse(r#"{"hotstrings":[{"name":"btw","trigger":"btw","replacement":"by the way"}]}"#)
            .unwrap();
        let hotstring = &file.hotstrings[0];
        assert_eq!(hotstring.modifiers(), [false; 4]);
        assert_eq!(hotstring.threshold(), Duration::from_millis(2000));
        assert_eq!(hotstring.replacement.as_deref(), Some("by the way"));
        assert!(file.hotkeys.is_empty());
    }

    #[test]
    fn test_parse_hotkey() {
        let file = WatchFile::parse(r#"{"hotkeys":[{"id":"pause","key":"P","ctrl":true,"alt":true}]}"#).unwrap();
        let combo = file.hotkeys[0].combo().unwrap();
        assert_eq!(combo.keycode, 0x50);
        assert!(combo.ctrl && combo.alt && !combo.shift && !combo.system);
    }

    #[test]
    fn test_invalid_trigger_rejected() {
        let err = WatchFile::parse(r#"{"hotstrings":[{"name":"x","trigger":"a b"}]}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidTrigger {
                source: TriggerError::NotAlphabetic(' '),
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_hotkey_rejected() {
        let err = WatchFile::parse(r#"{"hotkeys":[{"id":"x","key":"F1"}]}"#).unwrap_err();
        assert!(err.to_string().contains("F1"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let json = r#"{"hotstrings":[{"name":"a","trigger":"btw"},{"name":"a","trigger":"omw"}]}"#;
        assert!(matches!(WatchFile::parse(json), Err(ConfigError::Duplicate(name)) if name == "a"));
    }

    #[test]
    fn test_missing_file_means_no_watches() {
        let dir = std::env::temp_dir().join("hotstringd-config-test-missing");
        let config = Config::load_from(dir.clone(), dir.join("nope.json")).unwrap();
        assert!(config.watches.hotstrings.is_empty());
        assert!(config.watches.hotkeys.is_empty());
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("hotstringd-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("hotstrings.json");
        std::fs::write(&path, r#"{"hotstrings":[{"name":"omw","trigger":"OMW","threshold_ms":500}]}"#).unwrap();

        let config = Config::load_from(dir.clone(), path).unwrap();
        assert_eq!(config.watches.hotstrings[0].threshold_ms, 500);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

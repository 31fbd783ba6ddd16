//! TOML-based configuration persistence for the host subsystem.
//!
//! Reads and writes [`HostConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\BitLink\config.toml`
//! - Linux:    `~/.config/bitlink/config.toml`
//! - macOS:    `~/Library/Application Support/BitLink/config.toml`
//!
//! Fields annotated with `#[serde(default = "...")]` fall back to the
//! protocol defaults when absent, so the subsystem works on first run and
//! when upgrading from an older config file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use bitlink_core::BAUD_RATE;

use crate::application::device::LinkSettings;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level host configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HostConfig {
    #[serde(default)]
    pub host: HostSection,
    #[serde(default)]
    pub link: LinkSection,
}

/// General host behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HostSection {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Serial-session timing settings.
///
/// These exist for bench setups with slow bridges; the defaults match the
/// board family's debug firmware.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSection {
    /// Serial baud rate required by the debug link.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Milliseconds to wait after enabling serial before the first write.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Milliseconds between handshake retransmissions.
    #[serde(default = "default_hello_retry_interval_ms")]
    pub hello_retry_interval_ms: u64,
    /// Total handshake attempts before giving up.
    #[serde(default = "default_hello_attempts")]
    pub hello_attempts: u32,
}

impl LinkSection {
    /// Converts the persisted values into the engine's timing settings.
    pub fn to_settings(&self) -> LinkSettings {
        LinkSettings {
            baud_rate: self.baud_rate,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            hello_retry_interval: Duration::from_millis(self.hello_retry_interval_ms),
            hello_attempts: self.hello_attempts,
        }
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_baud_rate() -> u32 {
    BAUD_RATE
}
fn default_settle_delay_ms() -> u64 {
    1500
}
fn default_hello_retry_interval_ms() -> u64 {
    2000
}
fn default_hello_attempts() -> u32 {
    5
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            settle_delay_ms: default_settle_delay_ms(),
            hello_retry_interval_ms: default_hello_retry_interval_ms(),
            hello_attempts: default_hello_attempts(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot
/// be determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads [`HostConfig`] from disk, returning `HostConfig::default()` if the
/// file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<HostConfig, ConfigError> {
    let path = config_file_path()?;

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let config: HostConfig = toml::from_str(&content)?;
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HostConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Persists `config` to disk, creating the config directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &HostConfig) -> Result<(), ConfigError> {
    let path = config_file_path()?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(())
}

/// Resolves the platform config base directory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("BitLink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("bitlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("BitLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_protocol_constants() {
        let config = HostConfig::default();
        assert_eq!(config.link.baud_rate, 115_200);
        assert_eq!(config.link.settle_delay_ms, 1500);
        assert_eq!(config.link.hello_retry_interval_ms, 2000);
        assert_eq!(config.link.hello_attempts, 5);
        assert_eq!(config.host.log_level, "info");
    }

    #[test]
    fn test_to_settings_converts_durations() {
        let section = LinkSection {
            baud_rate: 9600,
            settle_delay_ms: 10,
            hello_retry_interval_ms: 25,
            hello_attempts: 3,
        };
        let settings = section.to_settings();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.settle_delay, Duration::from_millis(10));
        assert_eq!(settings.hello_retry_interval, Duration::from_millis(25));
        assert_eq!(settings.hello_attempts, 3);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = HostConfig::default();
        config.link.settle_delay_ms = 500;
        config.host.log_level = "debug".to_string();

        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let restored: HostConfig = toml::from_str(&toml_str).expect("deserialize");

        assert_eq!(config, restored);
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let config: HostConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(config, HostConfig::default());
    }

    #[test]
    fn test_deserialize_partial_link_section_keeps_other_defaults() {
        let toml_str = r#"
[link]
hello_attempts = 8
"#;
        let config: HostConfig = toml::from_str(toml_str).expect("deserialize partial");
        assert_eq!(config.link.hello_attempts, 8);
        assert_eq!(config.link.baud_rate, 115_200);
        assert_eq!(config.host.log_level, "info");
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<HostConfig, toml::de::Error> = toml::from_str("[[[ not valid toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("config.toml"),
                "config file must be named config.toml, got {path:?}"
            );
        }
        // NoPlatformConfigDir in a stripped CI environment is also acceptable.
    }
}

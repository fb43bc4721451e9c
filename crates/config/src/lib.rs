#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Configuration management for apkm
//!
//! This crate handles loading and merging configuration from:
//! - Default values (hard-coded)
//! - Configuration file (~/.config/apkm/config.toml)
//! - Environment variables
//! - CLI flags

pub mod constants;

use apkm_errors::{ConfigError, Error};
use apkm_types::{ColorChoice, OutputFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub install: InstallSection,

    #[serde(default)]
    pub payload: PayloadConfig,

    #[serde(default)]
    pub service: ServiceConfig,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    #[serde(default = "default_color_choice")]
    pub color: ColorChoice,
}

/// Which part of an install run the wall-clock timeout covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutScope {
    /// Only the wait for a verdict after the session was committed
    #[default]
    AwaitOutcome,
    /// Payload streaming and commit as well as the verdict wait
    WholeSession,
}

/// Install pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallSection {
    #[serde(default = "default_install_timeout")]
    pub timeout: u64, // seconds
    #[serde(default)]
    pub timeout_scope: TimeoutScope,
}

/// Archive extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadConfig {
    #[serde(default = "default_max_extract_bytes")]
    pub max_extract_bytes: u64,
    pub cache_dir: Option<PathBuf>,
}

/// Local installer service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub root: Option<PathBuf>,
    #[serde(default)]
    pub notification_delay_ms: u64,
    #[serde(default)]
    pub require_user_action: bool,
    pub storage_quota_bytes: Option<u64>,
}

// Default implementations

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: OutputFormat::Tty,
            color: ColorChoice::Auto,
        }
    }
}

impl Default for InstallSection {
    fn default() -> Self {
        Self {
            timeout: constants::DEFAULT_INSTALL_TIMEOUT_SECS,
            timeout_scope: TimeoutScope::AwaitOutcome,
        }
    }
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            max_extract_bytes: constants::DEFAULT_MAX_EXTRACT_BYTES,
            cache_dir: None,
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            root: None,
            notification_delay_ms: 0,
            require_user_action: false,
            storage_quota_bytes: None,
        }
    }
}

impl InstallSection {
    /// Timeout as a duration
    #[must_use]
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

// Default value functions for serde
fn default_output_format() -> OutputFormat {
    OutputFormat::Tty
}

fn default_color_choice() -> ColorChoice {
    ColorChoice::Auto
}

fn default_install_timeout() -> u64 {
    constants::DEFAULT_INSTALL_TIMEOUT_SECS
}

fn default_max_extract_bytes() -> u64 {
    constants::DEFAULT_MAX_EXTRACT_BYTES
}

impl Config {
    /// Get the default config file path
    ///
    /// # Errors
    ///
    /// Returns an error if the system config directory cannot be determined.
    pub fn default_path() -> Result<PathBuf, Error> {
        let config_dir = dirs::config_dir().ok_or_else(|| ConfigError::NotFound {
            path: "config directory".to_string(),
        })?;
        Ok(config_dir
            .join(constants::APP_DIR)
            .join(constants::CONFIG_FILE))
    }

    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the file contents
    /// contain invalid TOML syntax that cannot be parsed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)
            .await
            .map_err(|_| ConfigError::NotFound {
                path: path.display().to_string(),
            })?;

        let config: Self = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read
    /// or contains invalid TOML syntax.
    pub async fn load() -> Result<Self, Error> {
        let config_path = Self::default_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from an optional path or use default
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed
    pub async fn load_or_default(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(config_path) => Self::load_from_file(config_path).await,
            None => Self::load().await,
        }
    }

    /// Reject values the pipeline cannot work with
    ///
    /// # Errors
    ///
    /// Returns an error for a zero timeout or a zero extraction cap.
    pub fn validate(&self) -> Result<(), Error> {
        if self.install.timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "install.timeout".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if self.payload.max_extract_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "payload.max_extract_bytes".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Merge with environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if environment variables contain invalid values
    /// that cannot be parsed into the expected types.
    pub fn merge_env(&mut self) -> Result<(), Error> {
        // APKM_OUTPUT
        if let Ok(output) = std::env::var("APKM_OUTPUT") {
            self.general.default_output = match output.as_str() {
                "plain" => OutputFormat::Plain,
                "tty" => OutputFormat::Tty,
                "json" => OutputFormat::Json,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "APKM_OUTPUT".to_string(),
                        value: output,
                    }
                    .into())
                }
            };
        }

        // APKM_COLOR
        if let Ok(color) = std::env::var("APKM_COLOR") {
            self.general.color = match color.as_str() {
                "always" => ColorChoice::Always,
                "auto" => ColorChoice::Auto,
                "never" => ColorChoice::Never,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "APKM_COLOR".to_string(),
                        value: color,
                    }
                    .into())
                }
            };
        }

        // APKM_INSTALL_TIMEOUT
        if let Ok(timeout) = std::env::var("APKM_INSTALL_TIMEOUT") {
            self.install.timeout = timeout.parse().map_err(|_| ConfigError::InvalidValue {
                field: "APKM_INSTALL_TIMEOUT".to_string(),
                value: timeout,
            })?;
        }

        // APKM_TIMEOUT_SCOPE
        if let Ok(scope) = std::env::var("APKM_TIMEOUT_SCOPE") {
            self.install.timeout_scope = match scope.as_str() {
                "await_outcome" => TimeoutScope::AwaitOutcome,
                "whole_session" => TimeoutScope::WholeSession,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "APKM_TIMEOUT_SCOPE".to_string(),
                        value: scope,
                    }
                    .into())
                }
            };
        }

        // APKM_MAX_EXTRACT_BYTES
        if let Ok(bytes) = std::env::var("APKM_MAX_EXTRACT_BYTES") {
            self.payload.max_extract_bytes =
                bytes.parse().map_err(|_| ConfigError::InvalidValue {
                    field: "APKM_MAX_EXTRACT_BYTES".to_string(),
                    value: bytes,
                })?;
        }

        // APKM_CACHE_DIR
        if let Ok(dir) = std::env::var("APKM_CACHE_DIR") {
            self.payload.cache_dir = Some(PathBuf::from(dir));
        }

        // APKM_SERVICE_ROOT
        if let Ok(root) = std::env::var("APKM_SERVICE_ROOT") {
            self.service.root = Some(PathBuf::from(root));
        }

        // APKM_REQUIRE_USER_ACTION
        if let Ok(confirm) = std::env::var("APKM_REQUIRE_USER_ACTION") {
            self.service.require_user_action = match confirm.as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        field: "APKM_REQUIRE_USER_ACTION".to_string(),
                        value: confirm,
                    }
                    .into())
                }
            };
        }

        self.validate()
    }

    /// Get the extraction cache directory (with default)
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.payload.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(constants::APP_DIR)
        })
    }

    /// Get the local installer service root (with default)
    #[must_use]
    pub fn service_root(&self) -> PathBuf {
        self.service.root.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(constants::APP_DIR)
                .join(constants::SERVICE_DIR)
        })
    }
}

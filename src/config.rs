//! Application configuration.
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Values are read with the `SESSION_AIDE`
//! prefix and nested values use double underscores as separators:
//!
//! - `SESSION_AIDE__DISCORD__TOKEN=...` -> `discord.token`
//! - `SESSION_AIDE__SESSIONS__CONTAINER_NAME=...` -> `sessions.container_name`
//!
//! # Example
//!
//! ```no_run
//! use session_aide::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

/// Error while loading configuration from the environment.
#[derive(Debug, Error)]
#[error("configuration error: {0}")]
pub struct ConfigError(#[from] config::ConfigError);

/// Error from semantic validation of loaded configuration values.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: &'static str },

    #[error("Field '{field}' has invalid format: {reason}")]
    InvalidFormat { field: &'static str, reason: String },
}

/// Root application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Platform API access (token, base URL).
    pub discord: DiscordSettings,

    /// Session naming and container lookup.
    #[serde(default)]
    pub sessions: SessionSettings,
}

impl AppConfig {
    /// Load configuration from environment variables, reading a `.env` file
    /// first when present (development).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or cannot be
    /// parsed into the expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SESSION_AIDE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.discord.validate()?;
        self.sessions.validate()?;
        Ok(())
    }
}

/// Platform API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordSettings {
    /// Bot token used for the `Authorization` header.
    pub token: SecretString,

    /// Base URL of the platform REST API. Overridable for testing.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
}

impl DiscordSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.token.expose_secret().trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "discord.token",
            });
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(ValidationError::InvalidFormat {
                field: "discord.api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        Ok(())
    }
}

fn default_api_base_url() -> String {
    "https://discord.com/api/v10".to_string()
}

/// Session container lookup and channel naming.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Name of the category that holds session channels, matched
    /// case-insensitively when a guild becomes ready.
    #[serde(default = "default_container_name")]
    pub container_name: String,

    /// Prefix of derived channel names (`<prefix>-<counter>`).
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
}

impl SessionSettings {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.container_name.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                field: "sessions.container_name",
            });
        }
        let prefix_ok = !self.channel_prefix.is_empty()
            && self
                .channel_prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !prefix_ok {
            return Err(ValidationError::InvalidFormat {
                field: "sessions.channel_prefix",
                reason: "must be non-empty lowercase alphanumeric with dashes".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            container_name: default_container_name(),
            channel_prefix: default_channel_prefix(),
        }
    }
}

fn default_container_name() -> String {
    "Help Sessions".to_string()
}

fn default_channel_prefix() -> String {
    "session".to_string()
}

//! Configuration module for the VoiceCare realtime client
//!
//! Client configuration comes from defaults, `.env` files, environment
//! variables and YAML files. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use voicecare_realtime::config::ClientConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ClientConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config = ClientConfig::from_file(&PathBuf::from("voicecare.yaml"))?;
//!
//! println!("Backend at {}", config.backend_base_url);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

mod env;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

/// Default backend base URL (session, tools and function-call endpoints)
pub const DEFAULT_BACKEND_BASE_URL: &str = "http://localhost:8080/api";
/// Default realtime model deployment
pub const DEFAULT_DEPLOYMENT: &str = "gpt-realtime-2";
/// Default assistant voice
pub const DEFAULT_VOICE: &str = "ballad";
/// Default input transcription model
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
/// Label of the logical data channel
pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "realtime-channel";
/// Default tool-dispatch timeout in milliseconds
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;
/// Default negotiation timeout in milliseconds
pub const DEFAULT_NEGOTIATION_TIMEOUT_MS: u64 = 15_000;

/// Default assistant instructions sent with every `session.update`.
pub const DEFAULT_INSTRUCTIONS: &str = "## Role & Objective\n\n\
You are a helpful sales and booking assistant. Guide customers through discovery, \
recommend suitable options and help them complete their purchase or booking.\n\n\
## Personality & Tone\n\n\
* Always respond in English.\n\
* Be conversational, warm and professional.\n\
* Keep responses to 2-3 sentences.\n\n\
## Tools\n\n\
* Call a tool to show visual content whenever the customer asks about products, deals or their cart.\n\
* Never invent prices or availability; use tool results.";

/// Errors raised while loading client configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Client configuration
///
/// Contains everything a realtime session needs to reach the backend and
/// configure the remote assistant:
/// - Backend location
/// - Model deployment and voice
/// - Assistant instructions and transcription model
/// - Timeouts for tool calls and transport negotiation
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the backend API (no trailing slash required)
    pub backend_base_url: String,
    /// Realtime model deployment name
    pub deployment: String,
    /// Voice used for audio responses
    pub voice: String,
    /// Customer account number forwarded on session creation
    pub account_number: Option<String>,
    /// Base instructions for the assistant
    pub instructions: String,
    /// Model used for input audio transcription
    pub transcription_model: String,
    /// Label of the logical data channel
    pub data_channel_label: String,
    /// Tool-dispatch timeout in milliseconds (0 disables the timeout)
    pub tool_timeout_ms: u64,
    /// Transport negotiation timeout in milliseconds (0 disables the timeout)
    pub negotiation_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_base_url: DEFAULT_BACKEND_BASE_URL.to_string(),
            deployment: DEFAULT_DEPLOYMENT.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            account_number: None,
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            data_channel_label: DEFAULT_DATA_CHANNEL_LABEL.to_string(),
            tool_timeout_ms: DEFAULT_TOOL_TIMEOUT_MS,
            negotiation_timeout_ms: DEFAULT_NEGOTIATION_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// Loads the `.env` file (if present) first; actual environment variables
    /// override `.env` values, and unset values fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        env::apply_env(&mut config)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let yaml_config = YamlConfig::from_file(path)?;

        let mut config = Self::default();
        env::apply_env(&mut config)?;
        yaml_config.apply(&mut config);

        validation::validate(&config)?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate(self)
    }

    /// Tool-dispatch timeout, `None` when disabled
    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout_ms > 0).then(|| Duration::from_millis(self.tool_timeout_ms))
    }

    /// Negotiation timeout, `None` when disabled
    pub fn negotiation_timeout(&self) -> Option<Duration> {
        (self.negotiation_timeout_ms > 0).then(|| Duration::from_millis(self.negotiation_timeout_ms))
    }

    /// Backend endpoint URL for the given path
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.backend_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

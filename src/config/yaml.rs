use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::{ClientConfig, ConfigError};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables and defaults.
///
/// # Example YAML structure
/// ```yaml
/// backend:
///   base_url: "https://shop.example.com/api"
///   account_number: "ACC-1001"
///
/// realtime:
///   deployment: "gpt-realtime-2"
///   voice: "ballad"
///   transcription_model: "whisper-1"
///   data_channel_label: "realtime-channel"
///   instructions: |
///     You are a helpful booking assistant.
///
/// timeouts:
///   tool_ms: 30000
///   negotiation_ms: 15000
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub backend: Option<BackendYaml>,
    pub realtime: Option<RealtimeYaml>,
    pub timeouts: Option<TimeoutsYaml>,
}

/// Backend settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackendYaml {
    pub base_url: Option<String>,
    pub account_number: Option<String>,
}

/// Realtime assistant settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RealtimeYaml {
    pub deployment: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub transcription_model: Option<String>,
    pub data_channel_label: Option<String>,
}

/// Timeouts from YAML (milliseconds, 0 disables)
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TimeoutsYaml {
    pub tool_ms: Option<u64>,
    pub negotiation_ms: Option<u64>,
}

impl YamlConfig {
    /// Load a YAML configuration file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse YAML content
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Overlay every value present in the file onto `config`
    pub fn apply(self, config: &mut ClientConfig) {
        if let Some(backend) = self.backend {
            if let Some(url) = backend.base_url {
                config.backend_base_url = url;
            }
            if let Some(account) = backend.account_number {
                config.account_number = Some(account);
            }
        }

        if let Some(realtime) = self.realtime {
            if let Some(deployment) = realtime.deployment {
                config.deployment = deployment;
            }
            if let Some(voice) = realtime.voice {
                config.voice = voice;
            }
            if let Some(instructions) = realtime.instructions {
                config.instructions = instructions;
            }
            if let Some(model) = realtime.transcription_model {
                config.transcription_model = model;
            }
            if let Some(label) = realtime.data_channel_label {
                config.data_channel_label = label;
            }
        }

        if let Some(timeouts) = self.timeouts {
            if let Some(ms) = timeouts.tool_ms {
                config.tool_timeout_ms = ms;
            }
            if let Some(ms) = timeouts.negotiation_ms {
                config.negotiation_timeout_ms = ms;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_partial_config() {
        let yaml = r#"
realtime:
  voice: "coral"
"#;
        let parsed = YamlConfig::parse(yaml).unwrap();
        assert!(parsed.backend.is_none());

        let mut config = ClientConfig::default();
        parsed.apply(&mut config);
        assert_eq!(config.voice, "coral");
        assert_eq!(config.deployment, "gpt-realtime-2");
    }

    #[test]
    fn test_yaml_multiline_instructions() {
        let yaml = r#"
realtime:
  instructions: |
    You are a travel deals assistant.
    Keep it short.
"#;
        let mut config = ClientConfig::default();
        YamlConfig::parse(yaml).unwrap().apply(&mut config);
        assert!(config.instructions.starts_with("You are a travel deals assistant."));
        assert!(config.instructions.contains("Keep it short."));
    }

    #[test]
    fn test_yaml_empty_document() {
        let parsed = YamlConfig::parse("{}").unwrap();
        let mut config = ClientConfig::default();
        parsed.apply(&mut config);
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_yaml_malformed() {
        let result = YamlConfig::parse("timeouts:\n  tool_ms: [not, a, number]\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}

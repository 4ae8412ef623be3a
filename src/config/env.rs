use std::env;
use std::str::FromStr;

use super::{ClientConfig, ConfigError};

/// Read a non-empty environment variable
fn get_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parse a numeric environment variable
fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match get_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        None => Ok(None),
    }
}

/// Apply `VOICECARE_*` environment variables on top of `config`
pub(super) fn apply_env(config: &mut ClientConfig) -> Result<(), ConfigError> {
    if let Some(url) = get_env("VOICECARE_BACKEND_BASE_URL") {
        config.backend_base_url = url;
    }
    if let Some(deployment) = get_env("VOICECARE_DEPLOYMENT") {
        config.deployment = deployment;
    }
    if let Some(voice) = get_env("VOICECARE_VOICE") {
        config.voice = voice;
    }
    if let Some(account) = get_env("VOICECARE_ACCOUNT_NUMBER") {
        config.account_number = Some(account);
    }
    if let Some(instructions) = get_env("VOICECARE_INSTRUCTIONS") {
        config.instructions = instructions;
    }
    if let Some(model) = get_env("VOICECARE_TRANSCRIPTION_MODEL") {
        config.transcription_model = model;
    }
    if let Some(label) = get_env("VOICECARE_DATA_CHANNEL_LABEL") {
        config.data_channel_label = label;
    }
    if let Some(ms) = parse_env::<u64>("VOICECARE_TOOL_TIMEOUT_MS")? {
        config.tool_timeout_ms = ms;
    }
    if let Some(ms) = parse_env::<u64>("VOICECARE_NEGOTIATION_TIMEOUT_MS")? {
        config.negotiation_timeout_ms = ms;
    }
    Ok(())
}

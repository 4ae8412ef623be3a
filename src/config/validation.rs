use url::Url;

use super::{ClientConfig, ConfigError};

/// Validate the merged client configuration
pub(super) fn validate(config: &ClientConfig) -> Result<(), ConfigError> {
    validate_backend_url(&config.backend_base_url)?;

    for (name, value) in [
        ("deployment", &config.deployment),
        ("voice", &config.voice),
        ("data_channel_label", &config.data_channel_label),
        ("transcription_model", &config.transcription_model),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{name} must not be empty")));
        }
    }

    Ok(())
}

fn validate_backend_url(raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw).map_err(|e| {
        ConfigError::Validation(format!("backend_base_url '{raw}' is not a valid URL: {e}"))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "backend_base_url must use http or https, got: {other}"
        ))),
    }
}

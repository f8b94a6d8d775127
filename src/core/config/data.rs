use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::models::{DEFAULT_CHAT_MODEL_MARKER, DEFAULT_PREFERRED_FAMILY};
use crate::core::app::{AppSettings, DEFAULT_MODEL};
use crate::core::config::io::ConfigError;
use crate::core::transport::DEFAULT_BASE_URL;

/// Keys accepted by `chatdeck set` and `chatdeck unset`.
pub const CONFIG_KEYS: &[&str] = &[
    "base-url",
    "default-model",
    "state-path",
    "stream-idle-timeout-secs",
    "chat-model-marker",
    "preferred-model-family",
];

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_idle_timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_model_marker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_model_family: Option<String>,
}

/// Shorten paths under `$HOME` to `~/...` for messages.
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl Config {
    pub fn base_url(&self) -> &str {
        non_empty(&self.base_url).unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn app_settings(&self) -> AppSettings {
        AppSettings {
            model: non_empty(&self.default_model)
                .unwrap_or(DEFAULT_MODEL)
                .to_string(),
            idle_timeout: self
                .stream_idle_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            chat_model_marker: non_empty(&self.chat_model_marker)
                .unwrap_or(DEFAULT_CHAT_MODEL_MARKER)
                .to_string(),
            preferred_model_family: non_empty(&self.preferred_model_family)
                .unwrap_or(DEFAULT_PREFERRED_FAMILY)
                .to_string(),
        }
    }

    /// Set a key by its CLI name (`default-model`, ...).
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "value must not be empty".to_string(),
            });
        }
        match key {
            "base-url" => self.base_url = Some(value.to_string()),
            "default-model" => self.default_model = Some(value.to_string()),
            "state-path" => self.state_path = Some(PathBuf::from(value)),
            "stream-idle-timeout-secs" => {
                let secs = value
                    .parse::<u64>()
                    .map_err(|err| ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: err.to_string(),
                    })?;
                self.stream_idle_timeout_secs = Some(secs);
            }
            "chat-model-marker" => self.chat_model_marker = Some(value.to_string()),
            "preferred-model-family" => self.preferred_model_family = Some(value.to_string()),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn unset_value(&mut self, key: &str) -> Result<(), ConfigError> {
        match key {
            "base-url" => self.base_url = None,
            "default-model" => self.default_model = None,
            "state-path" => self.state_path = None,
            "stream-idle-timeout-secs" => self.stream_idle_timeout_secs = None,
            "chat-model-marker" => self.chat_model_marker = None,
            "preferred-model-family" => self.preferred_model_family = None,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// `(key, value)` pairs for display; unset keys show as `None`.
    pub fn entries(&self) -> Vec<(&'static str, Option<String>)> {
        vec![
            ("base-url", self.base_url.clone()),
            ("default-model", self.default_model.clone()),
            (
                "state-path",
                self.state_path.as_ref().map(|path| path_display(path)),
            ),
            (
                "stream-idle-timeout-secs",
                self.stream_idle_timeout_secs.map(|secs| secs.to_string()),
            ),
            ("chat-model-marker", self.chat_model_marker.clone()),
            ("preferred-model-family", self.preferred_model_family.clone()),
        ]
    }
}

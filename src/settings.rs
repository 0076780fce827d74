use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::env;

/// Environment variable holding the Gemini API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

// Optional overrides, resolved once at startup.
const CHAT_MODEL_ENV: &str = "ZEMENAI_CHAT_MODEL";
const TTS_MODEL_ENV: &str = "ZEMENAI_TTS_MODEL";
const BASE_URL_ENV: &str = "ZEMENAI_BASE_URL";

/// Fixed voice profile for Amharic speech synthesis.
pub const TTS_VOICE: &str = "Kore";

/// Language tag handed to the local fallback synthesizer.
pub const FALLBACK_LOCALE: &str = "am-ET";

fn default_chat_model() -> String {
    "gemini-3-pro-preview".to_string()
}

fn default_tts_model() -> String {
    "gemini-2.5-flash-preview-tts".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_playback_volume() -> f32 {
    1.0
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppSettings {
    /// API key for the remote model service. Never persisted.
    #[serde(skip)]
    pub api_key: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub selected_output_device: Option<String>,
    #[serde(default = "default_playback_volume")]
    pub playback_volume: f32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            chat_model: default_chat_model(),
            tts_model: default_tts_model(),
            base_url: default_base_url(),
            selected_output_device: None,
            playback_volume: default_playback_volume(),
        }
    }
}

impl AppSettings {
    /// Resolve settings from the hosting environment.
    ///
    /// A missing API key is a warning, not an error: the process keeps
    /// running, remote calls will simply fail until a key is provided.
    pub fn from_env() -> Self {
        let api_key = env::var(API_KEY_ENV).unwrap_or_default();
        if api_key.trim().is_empty() {
            warn!(
                "{} is not set; remote model calls will fail until it is provided",
                API_KEY_ENV
            );
        }

        let mut settings = AppSettings {
            api_key,
            ..AppSettings::default()
        };

        if let Some(model) = env_override(CHAT_MODEL_ENV) {
            settings.chat_model = model;
        }
        if let Some(model) = env_override(TTS_MODEL_ENV) {
            settings.tts_model = model;
        }
        if let Some(url) = env_override(BASE_URL_ENV) {
            settings.base_url = url.trim_end_matches('/').to_string();
        }

        settings
    }
}

/// Read a non-empty override from the environment.
fn env_override(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                debug!("Using override from {}: {}", name, trimmed);
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert_eq!(settings.chat_model, "gemini-3-pro-preview");
        assert_eq!(settings.tts_model, "gemini-2.5-flash-preview-tts");
        assert_eq!(
            settings.base_url,
            "https://generativelanguage.googleapis.com/v1beta"
        );
        assert_eq!(settings.playback_volume, 1.0);
        assert!(settings.selected_output_device.is_none());
    }

    #[test]
    fn test_env_override_ignores_empty_value() {
        std::env::set_var("ZEMENAI_TEST_OVERRIDE_EMPTY", "  ");
        assert_eq!(env_override("ZEMENAI_TEST_OVERRIDE_EMPTY"), None);
        std::env::remove_var("ZEMENAI_TEST_OVERRIDE_EMPTY");
    }

    #[test]
    fn test_env_override_trims_value() {
        std::env::set_var("ZEMENAI_TEST_OVERRIDE_SET", " gemini-test ");
        assert_eq!(
            env_override("ZEMENAI_TEST_OVERRIDE_SET"),
            Some("gemini-test".to_string())
        );
        std::env::remove_var("ZEMENAI_TEST_OVERRIDE_SET");
    }
}

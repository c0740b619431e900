//! TOML configuration file loading
//!
//! Supports `~/.config/aria/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::voice::VoiceParams;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AriaConfigFile {
    /// Assistant persona and interaction timing
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    /// Chat completion configuration
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Voice/audio configuration
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,

    /// Use canned demo services instead of cloud APIs
    pub demo: Option<bool>,
}

/// Assistant persona and cycle timing
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    /// Display name (e.g. "ARIA")
    pub name: Option<String>,

    /// System prompt sent with every request
    pub system_prompt: Option<String>,

    /// Exchanges kept in history
    pub max_history_pairs: Option<usize>,

    /// Seconds to wait for speech to start
    pub listen_timeout_secs: Option<f64>,

    /// Maximum seconds of a single phrase
    pub phrase_limit_secs: Option<f64>,
}

/// Chat completion configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// Model identifier (e.g. "gpt-4")
    pub model: Option<String>,

    /// OpenAI-compatible API base URL
    pub base_url: Option<String>,

    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Voice mode selected at startup
    pub default_mode: Option<String>,

    /// STT provider ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS provider ("openai" or "elevenlabs")
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice for modes selecting the primary voice
    pub primary_voice: Option<String>,

    /// TTS voice for modes selecting the secondary voice
    pub secondary_voice: Option<String>,

    /// Extra or overridden voice modes, keyed by name
    #[serde(default)]
    pub modes: BTreeMap<String, VoiceParams>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
    pub deepgram: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AriaConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AriaConfigFile {
    config_file_path().map_or_else(AriaConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Falls back to defaults (with a warning) on read or parse failure.
pub fn load_config_file_from(path: &Path) -> AriaConfigFile {
    if !path.exists() {
        return AriaConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AriaConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AriaConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/aria/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("aria").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_file() {
        let fc: AriaConfigFile = toml::from_str(
            r#"
            demo = true

            [llm]
            model = "gpt-4o-mini"
            temperature = 0.2

            [voice.modes.Robot]
            rate = 120
            pitch = 0.1
            voice = "secondary"
            mangle_text = true
            "#,
        )
        .unwrap();

        assert_eq!(fc.demo, Some(true));
        assert_eq!(fc.llm.model.as_deref(), Some("gpt-4o-mini"));
        assert!(fc.llm.max_tokens.is_none());
        assert!(fc.assistant.system_prompt.is_none());

        let robot = &fc.voice.modes["Robot"];
        assert_eq!(robot.rate, 120);
        assert!(robot.mangle_text);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let fc = load_config_file_from(Path::new("/nonexistent/aria/config.toml"));
        assert!(fc.demo.is_none());
        assert!(fc.voice.modes.is_empty());
    }

    #[test]
    fn test_invalid_file_yields_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();

        let fc = load_config_file_from(&path);
        assert!(fc.llm.model.is_none());
    }
}

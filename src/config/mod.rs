//! Configuration management for the assistant
//!
//! A single [`Config`] value is built at startup (env > TOML file > defaults)
//! and handed to the controller and service adapters at construction.

pub mod file;

use std::time::Duration;

use crate::conversation::DEFAULT_MAX_PAIRS;
use crate::services::CompletionParams;
use crate::voice::{SttProvider, TtsProvider, VoiceModes};
use crate::{Error, Result};

use self::file::AriaConfigFile;

/// Default assistant persona
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are ARIA, a futuristic AI voice assistant. \
You are helpful, intelligent, and have a slightly futuristic personality. Keep your \
responses conversational and engaging, but concise enough for speech. You can help with \
various tasks, answer questions, and have friendly conversations. Always be respectful \
and helpful.";

/// Default OpenAI-compatible API base URL for completions
pub const DEFAULT_COMPLETION_URL: &str = "https://api.openai.com/v1";

/// Assistant configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Persona and cycle timing
    pub assistant: AssistantConfig,

    /// Chat completion configuration
    pub completion: CompletionConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// Use canned demo services instead of cloud APIs
    pub demo: bool,
}

/// Persona and interaction timing
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Display name used by front ends
    pub name: String,

    /// System prompt pinned at the start of history
    pub system_prompt: String,

    /// Exchanges kept in history
    pub max_history_pairs: usize,

    /// How long to wait for speech to start
    pub listen_timeout: Duration,

    /// Longest phrase captured in one listen
    pub phrase_limit: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "ARIA".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_history_pairs: DEFAULT_MAX_PAIRS,
            listen_timeout: Duration::from_secs(10),
            phrase_limit: Duration::from_secs(10),
        }
    }
}

/// Chat completion configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,

    /// Model and sampling parameters
    pub params: CompletionParams,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_COMPLETION_URL.to_string(),
            params: CompletionParams::default(),
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Mode selected at startup
    pub default_mode: String,

    /// Known voice modes
    pub modes: VoiceModes,

    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice for modes selecting the primary voice
    pub primary_voice: String,

    /// TTS voice for modes selecting the secondary voice
    pub secondary_voice: String,
}

impl VoiceConfig {
    /// Defaults with models and voices suited to the given providers
    #[must_use]
    pub fn for_providers(stt_provider: SttProvider, tts_provider: TtsProvider) -> Self {
        let (primary_voice, secondary_voice) = tts_provider.default_voices();
        Self {
            default_mode: "Male".to_string(),
            modes: VoiceModes::default(),
            stt_provider,
            stt_model: stt_provider.default_model().to_string(),
            tts_provider,
            tts_model: tts_provider.default_model().to_string(),
            primary_voice: primary_voice.to_string(),
            secondary_voice: secondary_voice.to_string(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self::for_providers(SttProvider::Whisper, TtsProvider::OpenAI)
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (completions, Whisper and TTS)
    pub openai: Option<String>,

    /// `ElevenLabs` API key (optional TTS)
    pub elevenlabs: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,
}

impl Config {
    /// Load configuration from the environment and the standard config file
    ///
    /// # Errors
    ///
    /// Returns error if a value is malformed or the result fails validation
    pub fn load(demo: bool) -> Result<Self> {
        let fc = file::load_config_file();
        let mut config = Self::from_sources(fc, |key| std::env::var(key).ok())?;
        config.demo |= demo;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from a parsed file and an env lookup (env > file > default)
    ///
    /// Does not validate; call [`validate`](Self::validate) once overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns error if a provider name or numeric env value is malformed
    pub fn from_sources<F>(fc: AriaConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            elevenlabs: env("ELEVENLABS_API_KEY").or(fc.api_keys.elevenlabs),
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
        };

        let max_history_pairs = match env("ARIA_HISTORY_PAIRS") {
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("ARIA_HISTORY_PAIRS is not a number: {raw}")))?,
            None => fc
                .assistant
                .max_history_pairs
                .unwrap_or(defaults.assistant.max_history_pairs),
        };

        let assistant = AssistantConfig {
            name: fc.assistant.name.unwrap_or(defaults.assistant.name),
            system_prompt: fc
                .assistant
                .system_prompt
                .unwrap_or(defaults.assistant.system_prompt),
            max_history_pairs,
            listen_timeout: seconds(fc.assistant.listen_timeout_secs, "listen_timeout_secs")?
                .unwrap_or(defaults.assistant.listen_timeout),
            phrase_limit: seconds(fc.assistant.phrase_limit_secs, "phrase_limit_secs")?
                .unwrap_or(defaults.assistant.phrase_limit),
        };

        let base_params = defaults.completion.params;
        let completion = CompletionConfig {
            base_url: env("ARIA_COMPLETION_URL")
                .or(fc.llm.base_url)
                .unwrap_or(defaults.completion.base_url),
            params: CompletionParams {
                model: env("ARIA_MODEL").or(fc.llm.model).unwrap_or(base_params.model),
                max_tokens: fc.llm.max_tokens.unwrap_or(base_params.max_tokens),
                temperature: fc.llm.temperature.unwrap_or(base_params.temperature),
                top_p: fc.llm.top_p.unwrap_or(base_params.top_p),
                frequency_penalty: fc
                    .llm
                    .frequency_penalty
                    .unwrap_or(base_params.frequency_penalty),
                presence_penalty: fc
                    .llm
                    .presence_penalty
                    .unwrap_or(base_params.presence_penalty),
            },
        };

        let mut modes = defaults.voice.modes;
        for (name, params) in fc.voice.modes {
            modes.insert(name, params);
        }

        let stt_provider = match fc.voice.stt_provider.as_deref() {
            Some(name) => parse_stt_provider(name)?,
            None => defaults.voice.stt_provider,
        };
        let tts_provider = match fc.voice.tts_provider.as_deref() {
            Some(name) => parse_tts_provider(name)?,
            None => defaults.voice.tts_provider,
        };
        let voice_defaults = VoiceConfig::for_providers(stt_provider, tts_provider);

        let voice = VoiceConfig {
            default_mode: env("ARIA_VOICE_MODE")
                .or(fc.voice.default_mode)
                .unwrap_or(voice_defaults.default_mode),
            modes,
            stt_provider,
            stt_model: env("ARIA_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or(voice_defaults.stt_model),
            tts_provider,
            tts_model: env("ARIA_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or(voice_defaults.tts_model),
            primary_voice: env("ARIA_TTS_VOICE")
                .or(fc.voice.primary_voice)
                .unwrap_or(voice_defaults.primary_voice),
            secondary_voice: fc
                .voice
                .secondary_voice
                .unwrap_or(voice_defaults.secondary_voice),
        };

        Ok(Self {
            assistant,
            completion,
            voice,
            api_keys,
            demo: fc.demo.unwrap_or(false),
        })
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns error describing the first problem found
    pub fn validate(&self) -> Result<()> {
        if self.assistant.max_history_pairs == 0 {
            return Err(Error::Config("max_history_pairs must be at least 1".to_string()));
        }
        if self.assistant.listen_timeout.is_zero() || self.assistant.phrase_limit.is_zero() {
            return Err(Error::Config(
                "listen timeout and phrase limit must be positive".to_string(),
            ));
        }
        if self.voice.modes.canonical_name(&self.voice.default_mode).is_none() {
            return Err(Error::Config(format!(
                "default voice mode {:?} is not defined",
                self.voice.default_mode
            )));
        }
        if !self.demo && self.api_keys.openai.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Config(
                "OPENAI_API_KEY is required unless running with --demo".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse an STT provider name
///
/// # Errors
///
/// Returns error for unknown providers
pub fn parse_stt_provider(name: &str) -> Result<SttProvider> {
    match name.to_ascii_lowercase().as_str() {
        "whisper" | "openai" => Ok(SttProvider::Whisper),
        "deepgram" => Ok(SttProvider::Deepgram),
        other => Err(Error::Config(format!("unknown STT provider: {other}"))),
    }
}

/// Parse a TTS provider name
///
/// # Errors
///
/// Returns error for unknown providers
pub fn parse_tts_provider(name: &str) -> Result<TtsProvider> {
    match name.to_ascii_lowercase().as_str() {
        "openai" => Ok(TtsProvider::OpenAI),
        "elevenlabs" => Ok(TtsProvider::ElevenLabs),
        other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
    }
}

fn seconds(value: Option<f64>, field: &str) -> Result<Option<Duration>> {
    value
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_err(|e| Error::Config(format!("{field}: {e}")))
        })
        .transpose()
}

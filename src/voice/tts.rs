//! Text-to-speech (TTS) over HTTP APIs

use serde::Serialize;

use crate::{Error, Result};

/// Default ElevenLabs API base URL
pub const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsProvider {
    OpenAI,
    ElevenLabs,
}

impl TtsProvider {
    /// Model used when none is configured
    #[must_use]
    pub const fn default_model(self) -> &'static str {
        match self {
            Self::OpenAI => "tts-1",
            Self::ElevenLabs => "eleven_monolingual_v1",
        }
    }

    /// Primary and secondary voices used when none are configured
    ///
    /// ElevenLabs takes voice ids: Drew and Rachel from the pre-made set.
    #[must_use]
    pub const fn default_voices(self) -> (&'static str, &'static str) {
        match self {
            Self::OpenAI => ("onyx", "nova"),
            Self::ElevenLabs => ("29vD33N1CtxCmqQRPOHJ", "21m00Tcm4TlvDq8ikWAM"),
        }
    }
}

/// Synthesizes MP3 speech from text
#[derive(Clone)]
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    provider: TtsProvider,
}

impl TextToSpeech {
    /// Create a synthesizer using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_openai(api_key: String, model: String) -> Result<Self> {
        Self::new(
            TtsProvider::OpenAI,
            api_key,
            model,
            super::stt::OPENAI_BASE_URL.to_string(),
        )
    }

    /// Create a synthesizer using ElevenLabs
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new_elevenlabs(api_key: String, model: String) -> Result<Self> {
        Self::new(
            TtsProvider::ElevenLabs,
            api_key,
            model,
            ELEVENLABS_BASE_URL.to_string(),
        )
    }

    /// Create a synthesizer against an explicit base URL
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(
        provider: TtsProvider,
        api_key: String,
        model: String,
        base_url: String,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(format!("{provider:?} API key required for TTS")));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            provider,
        })
    }

    /// Synthesize text with the given voice and speed
    ///
    /// ElevenLabs has no speed control, so `speed` only applies to `OpenAI`.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> Result<Vec<u8>> {
        let response = match self.provider {
            TtsProvider::OpenAI => self.request_openai(text, voice, speed).await?,
            TtsProvider::ElevenLabs => self.request_elevenlabs(text, voice).await?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(provider = ?self.provider, status = %status, "TTS API error");
            return Err(Error::Tts(format!("{:?} TTS error {status}: {body}", self.provider)));
        }

        let audio = response.bytes().await?;
        tracing::debug!(bytes = audio.len(), voice, "speech synthesized");
        Ok(audio.to_vec())
    }

    async fn request_openai(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> Result<reqwest::Response> {
        #[derive(Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice,
            speed,
        };

        Ok(self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?)
    }

    async fn request_elevenlabs(&self, text: &str, voice_id: &str) -> Result<reqwest::Response> {
        #[derive(Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        Ok(self
            .client
            .post(format!("{}/text-to-speech/{voice_id}", self.base_url))
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?)
    }
}

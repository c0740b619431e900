//! Speech input adapters

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::SpeechInput;
use crate::voice::{
    AudioCapture, DEEPGRAM_BASE_URL, Endpoint, OPENAI_BASE_URL, SAMPLE_RATE, SpeechToText,
    SttProvider, UtteranceDetector, samples_to_wav,
};
use crate::{Config, Error, InteractionError, Result};

/// Slack on top of timeout + phrase limit before capture gives up
const CAPTURE_GRACE: Duration = Duration::from_secs(2);

/// Microphone capture followed by cloud transcription
pub struct MicrophoneInput {
    stt: SpeechToText,
}

impl MicrophoneInput {
    #[must_use]
    pub const fn new(stt: SpeechToText) -> Self {
        Self { stt }
    }

    /// Build the transcriber selected by `config`
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        let (api_key, base_url) = match config.voice.stt_provider {
            SttProvider::Whisper => (config.api_keys.openai.clone(), OPENAI_BASE_URL),
            SttProvider::Deepgram => (config.api_keys.deepgram.clone(), DEEPGRAM_BASE_URL),
        };
        let api_key = api_key.ok_or_else(|| {
            Error::Config(format!(
                "{:?} API key required for speech input",
                config.voice.stt_provider
            ))
        })?;

        let stt = SpeechToText::new(
            config.voice.stt_provider,
            api_key,
            config.voice.stt_model.clone(),
            base_url.to_string(),
        )?;
        Ok(Self::new(stt))
    }
}

#[async_trait]
impl SpeechInput for MicrophoneInput {
    async fn listen(
        &self,
        timeout: Duration,
        phrase_limit: Duration,
    ) -> std::result::Result<String, InteractionError> {
        // cpal streams are not Send, so the device lives on a blocking thread
        let endpoint = tokio::task::spawn_blocking(move || -> Result<Endpoint> {
            let mut capture = AudioCapture::new()?;
            let mut detector = UtteranceDetector::new(SAMPLE_RATE, timeout, phrase_limit);
            capture.record_utterance(&mut detector, timeout + phrase_limit + CAPTURE_GRACE)
        })
        .await
        .map_err(|e| InteractionError::TranscriptionServiceError(e.to_string()))?
        .map_err(|e| InteractionError::TranscriptionServiceError(e.to_string()))?;

        let samples = match endpoint {
            Endpoint::Complete(samples) => samples,
            Endpoint::TimedOut | Endpoint::Pending => {
                return Err(InteractionError::TranscriptionTimeout);
            }
        };

        tracing::debug!(samples = samples.len(), "phrase captured");

        let wav = samples_to_wav(&samples, SAMPLE_RATE)
            .map_err(|e| InteractionError::TranscriptionServiceError(e.to_string()))?;

        let text = self
            .stt
            .transcribe(&wav)
            .await
            .map_err(|e| InteractionError::TranscriptionServiceError(e.to_string()))?;

        if text.is_empty() {
            return Err(InteractionError::TranscriptionUnrecognized);
        }

        tracing::info!(text = %text, "transcribed");
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "microphone"
    }
}

/// Phrases "heard" by the demo input
pub const DEMO_PHRASES: &[&str] = &[
    "Hello ARIA",
    "How are you today?",
    "What can you do?",
    "Tell me about yourself",
    "What's the weather like?",
    "Thank you",
];

/// Returns canned phrases in rotation after a simulated listening delay
pub struct ScriptedInput {
    phrases: Vec<String>,
    next: AtomicUsize,
    delay: Duration,
}

impl ScriptedInput {
    #[must_use]
    pub fn new(phrases: Vec<String>, delay: Duration) -> Self {
        Self {
            phrases,
            next: AtomicUsize::new(0),
            delay,
        }
    }

    /// The built-in demo phrases with a two second listening delay
    #[must_use]
    pub fn demo() -> Self {
        Self::new(
            DEMO_PHRASES.iter().map(ToString::to_string).collect(),
            Duration::from_secs(2),
        )
    }
}

#[async_trait]
impl SpeechInput for ScriptedInput {
    async fn listen(
        &self,
        timeout: Duration,
        _phrase_limit: Duration,
    ) -> std::result::Result<String, InteractionError> {
        if self.phrases.is_empty() {
            tokio::time::sleep(timeout).await;
            return Err(InteractionError::TranscriptionTimeout);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.phrases.len();
        Ok(self.phrases[index].clone())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_phrases_rotate() {
        let input = ScriptedInput::new(vec!["a".to_string(), "b".to_string()], Duration::ZERO);
        let t = Duration::from_secs(1);

        assert_eq!(input.listen(t, t).await.unwrap(), "a");
        assert_eq!(input.listen(t, t).await.unwrap(), "b");
        assert_eq!(input.listen(t, t).await.unwrap(), "a");
    }

    #[tokio::test]
    async fn test_empty_script_times_out() {
        let input = ScriptedInput::new(Vec::new(), Duration::ZERO);
        let result = input
            .listen(Duration::from_millis(10), Duration::from_millis(10))
            .await;
        assert_eq!(result, Err(InteractionError::TranscriptionTimeout));
    }

    #[test]
    fn test_microphone_requires_key() {
        assert!(MicrophoneInput::from_config(&Config::default()).is_err());

        let mut config = Config::default();
        config.api_keys.openai = Some("sk-test".to_string());
        assert!(MicrophoneInput::from_config(&config).is_ok());
    }
}

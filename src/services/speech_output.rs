//! Speech output adapters

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::SpeechOutput;
use crate::voice::{
    AudioPlayback, ELEVENLABS_BASE_URL, OPENAI_BASE_URL, TextToSpeech, TtsProvider,
    VoiceParams, VoiceSelection,
};
use crate::{Config, Error, InteractionError, Result};

/// Stop flag of the current utterance
///
/// `arm` installs a fresh flag; the next `speak` claims it. A `speak` that
/// finds the flag already claimed (nobody armed) starts its own.
#[derive(Default)]
struct StopSlot {
    flag: Arc<AtomicBool>,
    claimed: bool,
}

impl StopSlot {
    fn arm(slot: &Mutex<Self>) {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Self::default();
    }

    fn claim(slot: &Mutex<Self>) -> Arc<AtomicBool> {
        let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.claimed {
            *slot = Self::default();
        }
        slot.claimed = true;
        Arc::clone(&slot.flag)
    }

    fn stop(slot: &Mutex<Self>) {
        slot.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flag
            .store(true, Ordering::Relaxed);
    }
}

/// Cloud TTS played through the default output device
///
/// Pitch has no equivalent in the cloud TTS APIs and is not applied.
pub struct SpeakerOutput {
    tts: TextToSpeech,
    primary_voice: String,
    secondary_voice: String,
    params: Mutex<VoiceParams>,
    stop: Mutex<StopSlot>,
}

impl SpeakerOutput {
    #[must_use]
    pub fn new(tts: TextToSpeech, primary_voice: String, secondary_voice: String) -> Self {
        Self {
            tts,
            primary_voice,
            secondary_voice,
            params: Mutex::new(VoiceParams::default()),
            stop: Mutex::new(StopSlot::default()),
        }
    }

    /// Build the synthesizer selected by `config`
    ///
    /// # Errors
    ///
    /// Returns error if the provider's API key is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        let (api_key, base_url) = match config.voice.tts_provider {
            TtsProvider::OpenAI => (config.api_keys.openai.clone(), OPENAI_BASE_URL),
            TtsProvider::ElevenLabs => (config.api_keys.elevenlabs.clone(), ELEVENLABS_BASE_URL),
        };
        let api_key = api_key.ok_or_else(|| {
            Error::Config(format!(
                "{:?} API key required for speech output",
                config.voice.tts_provider
            ))
        })?;

        let tts = TextToSpeech::new(
            config.voice.tts_provider,
            api_key,
            config.voice.tts_model.clone(),
            base_url.to_string(),
        )?;

        Ok(Self::new(
            tts,
            config.voice.primary_voice.clone(),
            config.voice.secondary_voice.clone(),
        ))
    }

    fn voice_for(&self, selection: VoiceSelection) -> &str {
        match selection {
            VoiceSelection::Primary => &self.primary_voice,
            VoiceSelection::Secondary => &self.secondary_voice,
        }
    }
}

#[async_trait]
impl SpeechOutput for SpeakerOutput {
    async fn speak(&self, text: &str) -> std::result::Result<(), InteractionError> {
        let params = self
            .params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let stop = StopSlot::claim(&self.stop);
        if stop.load(Ordering::Relaxed) {
            tracing::debug!("stopped before synthesis");
            return Ok(());
        }

        let text = params.prepare_text(text);
        let voice = self.voice_for(params.voice);

        tracing::debug!(voice, speed = params.tts_speed(), "synthesizing");
        let audio = self
            .tts
            .synthesize(&text, voice, params.tts_speed())
            .await
            .map_err(|e| InteractionError::PlaybackServiceError(e.to_string()))?;

        if stop.load(Ordering::Relaxed) {
            tracing::debug!("stopped before playback");
            return Ok(());
        }

        // cpal streams are not Send, so playback runs on a blocking thread
        tokio::task::spawn_blocking(move || {
            let playback = AudioPlayback::new()?;
            playback.play_mp3(&audio, &stop)
        })
        .await
        .map_err(|e| InteractionError::PlaybackServiceError(e.to_string()))?
        .map_err(|e| InteractionError::PlaybackServiceError(e.to_string()))
    }

    fn arm(&self) {
        StopSlot::arm(&self.stop);
    }

    fn stop(&self) {
        StopSlot::stop(&self.stop);
    }

    fn configure(&self, params: VoiceParams) {
        *self.params.lock().unwrap_or_else(PoisonError::into_inner) = params;
    }

    fn name(&self) -> &'static str {
        "speaker"
    }
}

/// Simulated speech: logs the text and waits as long as speaking would take
pub struct ConsoleOutput {
    speaker: String,
    params: Mutex<VoiceParams>,
    /// Multiplier on the simulated duration (1.0 = real time)
    pace: f64,
    stop: Mutex<StopSlot>,
    stopped: Notify,
}

impl ConsoleOutput {
    #[must_use]
    pub fn new(speaker: String) -> Self {
        Self::with_pace(speaker, 1.0)
    }

    /// Scale the simulated speaking time; tests use a small pace
    #[must_use]
    pub fn with_pace(speaker: String, pace: f64) -> Self {
        Self {
            speaker,
            params: Mutex::new(VoiceParams::default()),
            pace,
            stop: Mutex::new(StopSlot::default()),
            stopped: Notify::new(),
        }
    }

    /// How long `text` takes to "say": 0.1s per character, at least 2s
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn speaking_time(&self, text: &str) -> Duration {
        let secs = (text.chars().count() as f64 * 0.1).max(2.0);
        Duration::from_secs_f64(secs * self.pace.max(0.0))
    }
}

#[async_trait]
impl SpeechOutput for ConsoleOutput {
    async fn speak(&self, text: &str) -> std::result::Result<(), InteractionError> {
        let params = self
            .params
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let stop = StopSlot::claim(&self.stop);

        // register for wakeups before checking the flag so no stop slips between
        let notified = self.stopped.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if stop.load(Ordering::Relaxed) {
            tracing::debug!("stopped before speaking");
            return Ok(());
        }

        let text = params.prepare_text(text);
        let duration = self.speaking_time(&text);

        tracing::info!(
            speaker = %self.speaker,
            rate = params.rate,
            pitch = params.pitch,
            text = %text,
            "would say"
        );

        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = notified => {
                tracing::debug!("simulated speech stopped");
            }
        }
        Ok(())
    }

    fn arm(&self) {
        StopSlot::arm(&self.stop);
    }

    fn stop(&self) {
        StopSlot::stop(&self.stop);
        self.stopped.notify_waiters();
    }

    fn configure(&self, params: VoiceParams) {
        *self.params.lock().unwrap_or_else(PoisonError::into_inner) = params;
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaking_time() {
        let output = ConsoleOutput::new("ARIA".to_string());
        assert_eq!(output.speaking_time("hi"), Duration::from_secs(2));
        assert_eq!(output.speaking_time(&"x".repeat(50)), Duration::from_secs(5));

        let fast = ConsoleOutput::with_pace("ARIA".to_string(), 0.01);
        assert_eq!(fast.speaking_time("hi"), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_console_stop_interrupts() {
        let output = Arc::new(ConsoleOutput::new("ARIA".to_string()));
        let speaking = {
            let output = Arc::clone(&output);
            tokio::spawn(async move { output.speak("a long sentence to say").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        output.stop();

        let result = tokio::time::timeout(Duration::from_secs(1), speaking)
            .await
            .expect("speak should return promptly after stop")
            .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn test_speaker_requires_key() {
        assert!(SpeakerOutput::from_config(&Config::default()).is_err());

        let mut config = Config::default();
        config.api_keys.openai = Some("sk-test".to_string());
        let output = SpeakerOutput::from_config(&config).unwrap();
        assert_eq!(output.voice_for(VoiceSelection::Secondary), "nova");
    }

    #[test]
    fn test_stop_flags_current_utterance() {
        let slot = Mutex::new(StopSlot::default());

        StopSlot::arm(&slot);
        let first = StopSlot::claim(&slot);
        StopSlot::stop(&slot);
        assert!(first.load(Ordering::Relaxed));

        StopSlot::arm(&slot);
        let second = StopSlot::claim(&slot);
        assert!(!second.load(Ordering::Relaxed));
    }

    #[test]
    fn test_stop_before_claim_applies_to_armed_utterance() {
        let slot = Mutex::new(StopSlot::default());

        StopSlot::arm(&slot);
        StopSlot::stop(&slot);
        assert!(StopSlot::claim(&slot).load(Ordering::Relaxed));

        // an unarmed speak after that starts clean
        assert!(!StopSlot::claim(&slot).load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_console_stop_before_speaking_starts() {
        let output = ConsoleOutput::new("ARIA".to_string());

        output.arm();
        output.stop();

        // a full-pace utterance would take 2s
        let result = tokio::time::timeout(Duration::from_millis(500), output.speak("hello"))
            .await
            .expect("stop issued before speak should still apply");
        assert!(result.is_ok());
    }
}

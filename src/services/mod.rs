//! External service capabilities
//!
//! The interaction controller talks to three collaborators through these
//! traits. Each call is awaited on its own task and resolves exactly once,
//! with either a payload or an [`InteractionError`].

mod completion;
mod speech_input;
mod speech_output;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::conversation::HistorySnapshot;
use crate::voice::VoiceParams;
use crate::{Config, InteractionError, Result};

pub use completion::{CloudCompletion, CompletionBackend, CompletionParams, FixedResponseStub};
pub use speech_input::{MicrophoneInput, ScriptedInput};
pub use speech_output::{ConsoleOutput, SpeakerOutput};

/// Converts microphone audio to text
#[async_trait]
pub trait SpeechInput: Send + Sync {
    /// Listen for one phrase and transcribe it
    ///
    /// `timeout` bounds the wait for speech to start; `phrase_limit` bounds
    /// the phrase itself.
    ///
    /// # Errors
    ///
    /// `TranscriptionTimeout`, `TranscriptionUnrecognized` or
    /// `TranscriptionServiceError`
    async fn listen(
        &self,
        timeout: Duration,
        phrase_limit: Duration,
    ) -> std::result::Result<String, InteractionError>;

    /// Service name for logging
    fn name(&self) -> &'static str;
}

/// Generates a reply from conversation history
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Request a reply for `history`
    ///
    /// # Errors
    ///
    /// `CompletionServiceError` on any failure
    async fn complete(
        &self,
        history: HistorySnapshot,
        params: &CompletionParams,
    ) -> std::result::Result<String, InteractionError>;

    /// Forget any service-side conversation state
    fn reset(&self) {}

    /// Service name for logging
    fn name(&self) -> &'static str;
}

/// Speaks text aloud
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Speak `text` with the currently configured voice
    ///
    /// # Errors
    ///
    /// `PlaybackServiceError` if synthesis or playback fails
    async fn speak(&self, text: &str) -> std::result::Result<(), InteractionError>;

    /// Start a new utterance ahead of the matching `speak` call
    ///
    /// The controller calls this synchronously when it dispatches speech, so
    /// a `stop` that lands before the speaking task first runs still applies
    /// to that utterance.
    fn arm(&self) {}

    /// Ask the current utterance to halt; best effort and non-blocking
    fn stop(&self);

    /// Change voice parameters for subsequent utterances
    fn configure(&self, params: VoiceParams);

    /// Service name for logging
    fn name(&self) -> &'static str;
}

/// The three collaborators the controller needs
#[derive(Clone)]
pub struct Services {
    pub input: Arc<dyn SpeechInput>,
    pub completion: Arc<dyn CompletionService>,
    pub output: Arc<dyn SpeechOutput>,
}

impl Services {
    /// Construct the services selected by `config`
    ///
    /// Demo mode uses canned phrases, canned replies and console "speech";
    /// otherwise the cloud STT, completion and TTS adapters are used.
    ///
    /// # Errors
    ///
    /// Returns error if a required API key is missing
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.demo {
            tracing::info!("using demo services");
            return Ok(Self {
                input: Arc::new(ScriptedInput::demo()),
                completion: Arc::new(CompletionBackend::Stub(FixedResponseStub::demo())),
                output: Arc::new(ConsoleOutput::new(config.assistant.name.clone())),
            });
        }

        Ok(Self {
            input: Arc::new(MicrophoneInput::from_config(config)?),
            completion: Arc::new(CompletionBackend::from_config(config)?),
            output: Arc::new(SpeakerOutput::from_config(config)?),
        })
    }
}

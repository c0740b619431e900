//! Error types for the ARIA assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while setting up or driving the assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Chat completion error
    #[error("completion error: {0}")]
    Completion(String),

    /// Voice mode lookup failed
    #[error(transparent)]
    VoiceMode(#[from] InteractionError),

    /// The controller task has shut down
    #[error("interaction controller is not running")]
    ControllerClosed,

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures that end an interaction cycle
///
/// The `Display` text is what the presentation layer shows the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InteractionError {
    /// No speech started before the listen timeout
    #[error("Listening timeout")]
    TranscriptionTimeout,

    /// Speech was captured but could not be understood
    #[error("Could not understand audio")]
    TranscriptionUnrecognized,

    /// The speech-to-text backend failed
    #[error("Could not request results; {0}")]
    TranscriptionServiceError(String),

    /// The completion backend failed
    #[error("AI Error: {0}")]
    CompletionServiceError(String),

    /// Speech synthesis or playback failed
    #[error("TTS Error: {0}")]
    PlaybackServiceError(String),

    /// Voice mode name is not in the mode table
    #[error("unknown voice mode: {0}")]
    UnknownVoiceMode(String),

    /// Result belongs to an abandoned cycle; never shown to the user
    #[error("stale result for cycle {received} (current cycle {current})")]
    StaleCallback {
        /// Cycle the result was tagged with
        received: u64,
        /// Cycle the controller is on
        current: u64,
    },
}

impl InteractionError {
    /// Whether this error should be surfaced to the user
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        !matches!(self, Self::StaleCallback { .. })
    }
}

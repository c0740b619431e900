//! ARIA - a voice assistant interaction controller
//!
//! This library provides:
//! - The interaction state machine and the task that drives it
//! - A bounded conversation history
//! - Speech input, completion and speech output service adapters
//! - Voice modes, audio capture/playback and the STT/TTS clients
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Presentation layer                   │
//! │      terminal REPL  │  events  │  state changes      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ ControllerHandle
//! ┌────────────────────▼────────────────────────────────┐
//! │               InteractionController                  │
//! │   Idle → Listening → Processing → Speaking → Idle    │
//! │          ConversationHistory  │  cycle ids           │
//! └────────────────────┬────────────────────────────────┘
//!                      │ one task per call, (cycle, result) back
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Services                          │
//! │  SpeechInput  │  CompletionService  │  SpeechOutput  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod config;
pub mod conversation;
pub mod error;
pub mod services;
pub mod voice;

pub use assistant::{
    ControllerEvent, ControllerHandle, CycleId, InteractionController, InteractionState,
};
pub use config::Config;
pub use conversation::{
    ConversationHistory, ConversationMessage, ConversationSummary, HistorySnapshot, Role,
};
pub use error::{Error, InteractionError, Result};
pub use services::{
    CloudCompletion, CompletionBackend, CompletionParams, CompletionService, FixedResponseStub,
    Services, SpeechInput, SpeechOutput,
};
pub use voice::{VoiceModes, VoiceParams};

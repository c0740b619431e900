//! Voice processing module
//!
//! Audio capture, utterance endpointing, playback, the STT/TTS HTTP clients
//! and the voice mode table.

mod capture;
mod mode;
mod playback;
mod stt;
mod tts;
mod utterance;

pub use capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
pub use mode::{VoiceModes, VoiceParams, VoiceSelection, apply_alien_effects};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, decode_mp3};
pub use stt::{DEEPGRAM_BASE_URL, OPENAI_BASE_URL, SpeechToText, SttProvider};
pub use tts::{ELEVENLABS_BASE_URL, TextToSpeech, TtsProvider};
pub use utterance::{Endpoint, SegmentState, UtteranceDetector, calculate_energy};

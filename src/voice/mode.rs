//! Voice modes
//!
//! Maps a mode name to playback parameters. The built-in table has `Male`,
//! `Female` and `Alien`; the config file may add more.

use serde::Deserialize;

use crate::InteractionError;

/// Speaking rate (words per minute) that maps to a TTS speed of 1.0
const BASE_RATE: u32 = 200;

/// Which of the configured TTS voices to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceSelection {
    #[default]
    Primary,
    Secondary,
}

/// Playback parameters for a voice mode
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VoiceParams {
    /// Speaking rate in words per minute
    pub rate: u32,

    /// Relative pitch (0.0 to 1.0)
    ///
    /// Listed by `aria voices` and logged by the console output. The cloud
    /// TTS APIs expose no pitch control, so speaker output ignores it.
    pub pitch: f32,

    /// Voice to synthesize with
    #[serde(default)]
    pub voice: VoiceSelection,

    /// Apply the robotic text transform before speaking
    #[serde(default)]
    pub mangle_text: bool,
}

impl VoiceParams {
    /// TTS speed multiplier derived from the rate
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn tts_speed(&self) -> f32 {
        (self.rate as f32 / BASE_RATE as f32).clamp(0.25, 4.0)
    }

    /// Prepare text for synthesis under this mode
    #[must_use]
    pub fn prepare_text(&self, text: &str) -> String {
        if self.mangle_text {
            apply_alien_effects(text)
        } else {
            text.to_string()
        }
    }
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            rate: BASE_RATE,
            pitch: 0.5,
            voice: VoiceSelection::Primary,
            mangle_text: false,
        }
    }
}

/// Named voice modes in display order
#[derive(Debug, Clone)]
pub struct VoiceModes {
    modes: Vec<(String, VoiceParams)>,
}

impl VoiceModes {
    /// Look up a mode by name (case-insensitive)
    ///
    /// # Errors
    ///
    /// Returns `UnknownVoiceMode` if no mode has that name
    pub fn get(&self, name: &str) -> Result<&VoiceParams, InteractionError> {
        self.find(name)
            .map(|(_, params)| params)
            .ok_or_else(|| InteractionError::UnknownVoiceMode(name.to_string()))
    }

    /// Canonical name of a mode (as configured), if it exists
    #[must_use]
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        self.find(name).map(|(n, _)| n.as_str())
    }

    /// Add a mode or replace one with the same name
    pub fn insert(&mut self, name: impl Into<String>, params: VoiceParams) {
        let name = name.into();
        if let Some(slot) = self
            .modes
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            slot.1 = params;
        } else {
            self.modes.push((name, params));
        }
    }

    /// Mode names in display order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modes.iter().map(|(n, _)| n.as_str())
    }

    /// Iterate over all modes
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VoiceParams)> {
        self.modes.iter().map(|(n, p)| (n.as_str(), p))
    }

    fn find(&self, name: &str) -> Option<&(String, VoiceParams)> {
        let name = name.trim();
        self.modes.iter().find(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

impl Default for VoiceModes {
    fn default() -> Self {
        Self {
            modes: vec![
                (
                    "Male".to_string(),
                    VoiceParams {
                        rate: 200,
                        pitch: 0.5,
                        voice: VoiceSelection::Primary,
                        mangle_text: false,
                    },
                ),
                (
                    "Female".to_string(),
                    VoiceParams {
                        rate: 180,
                        pitch: 0.8,
                        voice: VoiceSelection::Secondary,
                        mangle_text: false,
                    },
                ),
                (
                    "Alien".to_string(),
                    VoiceParams {
                        rate: 150,
                        pitch: 0.3,
                        voice: VoiceSelection::Primary,
                        mangle_text: true,
                    },
                ),
            ],
        }
    }
}

/// Robotic spacing: words longer than three characters get a `.` after the
/// second character
#[must_use]
pub fn apply_alien_effects(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            if word.chars().count() > 3 {
                // count > 3 guarantees a third char exists
                let split = word.char_indices().nth(2).map_or(word.len(), |(i, _)| i);
                format!("{}.{}", &word[..split], &word[split..])
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

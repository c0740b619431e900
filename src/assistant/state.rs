//! Interaction state and the events the controller publishes

use std::fmt;

use crate::conversation::ConversationMessage;

/// Where the assistant is in a listen, think, speak cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionState {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl InteractionState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
        }
    }

    /// Whether a cycle is in flight
    #[must_use]
    pub const fn is_busy(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for InteractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one interaction cycle
///
/// A new id is issued whenever a cycle starts or is abandoned, so results
/// tagged with an older id can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CycleId(pub(crate) u64);

impl CycleId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    pub(crate) const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for CycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Notifications for presentation layers
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// State changed; `error` is set when a cycle ended in failure
    StateChanged {
        state: InteractionState,
        error: Option<String>,
    },

    /// A message was added to the conversation
    MessageAppended(ConversationMessage),

    /// The conversation was reset to the system prompt
    HistoryCleared,

    /// A new voice mode is in effect
    VoiceModeChanged(String),
}

//! Interaction state machine
//!
//! Owns the interaction state, the current cycle id and the conversation.
//! Each input returns the [`Effect`]s the runtime has to carry out; nothing
//! here performs IO or awaits, so every transition can be driven directly
//! in tests.

use super::state::{ControllerEvent, CycleId, InteractionState};
use crate::InteractionError;
use crate::conversation::{
    ConversationHistory, ConversationMessage, ConversationSummary, HistorySnapshot,
};

/// Work the runtime must perform after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Start a speech input call for `cycle`
    Listen(CycleId),

    /// Start a completion call for `cycle` over `history`
    Complete {
        cycle: CycleId,
        history: HistorySnapshot,
    },

    /// Start speaking `text` for `cycle`
    Speak { cycle: CycleId, text: String },

    /// Ask the speech output to halt
    StopSpeaking,

    /// Tell the completion service the conversation restarted
    ResetCompletion,

    /// Publish an event to the presentation layer
    Emit(ControllerEvent),
}

/// The interaction controller's state, without the runtime
#[derive(Debug)]
pub struct InteractionMachine {
    state: InteractionState,
    cycle: CycleId,
    history: ConversationHistory,
}

impl InteractionMachine {
    #[must_use]
    pub fn new(history: ConversationHistory) -> Self {
        Self {
            state: InteractionState::Idle,
            cycle: CycleId::default(),
            history,
        }
    }

    #[must_use]
    pub const fn state(&self) -> InteractionState {
        self.state
    }

    /// Id of the current (or most recently abandoned) cycle
    #[must_use]
    pub const fn cycle(&self) -> CycleId {
        self.cycle
    }

    #[must_use]
    pub const fn history(&self) -> &ConversationHistory {
        &self.history
    }

    #[must_use]
    pub fn snapshot(&self) -> HistorySnapshot {
        self.history.snapshot()
    }

    #[must_use]
    pub fn summary(&self) -> ConversationSummary {
        self.history.summary()
    }

    /// Begin listening; `None` if a cycle is already in flight
    pub fn start_interaction(&mut self) -> Option<Vec<Effect>> {
        if self.state.is_busy() {
            tracing::debug!(state = %self.state, "start ignored while busy");
            return None;
        }

        let cycle = self.begin_cycle();
        let mut effects = self.transition(InteractionState::Listening, None);
        effects.push(Effect::Listen(cycle));
        Some(effects)
    }

    /// Begin a cycle from typed text, skipping `Listening`
    ///
    /// `None` if busy or `text` is blank.
    pub fn submit_text(&mut self, text: &str) -> Option<Vec<Effect>> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if self.state.is_busy() {
            tracing::debug!(state = %self.state, "typed input ignored while busy");
            return None;
        }

        let cycle = self.begin_cycle();
        Some(self.accept_user_text(cycle, text))
    }

    /// Speak `text` without touching the conversation
    ///
    /// `None` if busy or `text` is blank.
    pub fn say(&mut self, text: &str) -> Option<Vec<Effect>> {
        let text = text.trim();
        if text.is_empty() || self.state.is_busy() {
            return None;
        }

        let cycle = self.begin_cycle();
        let mut effects = self.transition(InteractionState::Speaking, None);
        effects.push(Effect::Speak {
            cycle,
            text: text.to_string(),
        });
        Some(effects)
    }

    /// Apply a speech input result
    ///
    /// # Errors
    ///
    /// `StaleCallback` if the result does not belong to the listening cycle;
    /// nothing changes in that case
    pub fn on_transcription(
        &mut self,
        cycle: CycleId,
        result: Result<String, InteractionError>,
    ) -> Result<Vec<Effect>, InteractionError> {
        self.check(cycle, InteractionState::Listening)?;

        Ok(match result {
            Ok(text) if text.trim().is_empty() => {
                self.fail(&InteractionError::TranscriptionUnrecognized)
            }
            Ok(text) => self.accept_user_text(cycle, text.trim()),
            Err(e) => self.fail(&e),
        })
    }

    /// Apply a completion result
    ///
    /// # Errors
    ///
    /// `StaleCallback` if the result does not belong to the processing cycle
    pub fn on_completion(
        &mut self,
        cycle: CycleId,
        result: Result<String, InteractionError>,
    ) -> Result<Vec<Effect>, InteractionError> {
        self.check(cycle, InteractionState::Processing)?;

        let reply = match result {
            Ok(reply) => reply,
            Err(e) => return Ok(self.fail(&e)),
        };

        let message = ConversationMessage::assistant(reply.clone());
        self.history.append(message.clone());
        self.history.trim_to_cap();

        let mut effects = vec![Effect::Emit(ControllerEvent::MessageAppended(message))];
        effects.extend(self.transition(InteractionState::Speaking, None));
        effects.push(Effect::Speak { cycle, text: reply });
        Ok(effects)
    }

    /// Apply a speech output result
    ///
    /// # Errors
    ///
    /// `StaleCallback` if the result does not belong to the speaking cycle
    pub fn on_playback(
        &mut self,
        cycle: CycleId,
        result: Result<(), InteractionError>,
    ) -> Result<Vec<Effect>, InteractionError> {
        self.check(cycle, InteractionState::Speaking)?;

        Ok(match result {
            Ok(()) => self.transition(InteractionState::Idle, None),
            Err(e) => self.fail(&e),
        })
    }

    /// Go from `Speaking` to `Idle` at once; `None` if not speaking
    ///
    /// The output's eventual result for the abandoned cycle is stale.
    pub fn stop_speaking(&mut self) -> Option<Vec<Effect>> {
        if self.state != InteractionState::Speaking {
            return None;
        }

        self.abandon();
        let mut effects = vec![Effect::StopSpeaking];
        effects.extend(self.transition(InteractionState::Idle, None));
        Some(effects)
    }

    /// Abandon a `Listening` or `Processing` cycle; `None` otherwise
    pub fn cancel(&mut self) -> Option<Vec<Effect>> {
        if !matches!(
            self.state,
            InteractionState::Listening | InteractionState::Processing
        ) {
            return None;
        }

        self.abandon();
        Some(self.transition(InteractionState::Idle, None))
    }

    /// Reset the conversation to the system prompt
    ///
    /// A cycle in flight is abandoned first, so its results cannot write
    /// into the fresh conversation.
    pub fn clear_history(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();

        if self.state.is_busy() {
            let was_speaking = self.state == InteractionState::Speaking;
            self.abandon();
            if was_speaking {
                effects.push(Effect::StopSpeaking);
            }
            effects.extend(self.transition(InteractionState::Idle, None));
        }

        self.history.clear();
        effects.push(Effect::ResetCompletion);
        effects.push(Effect::Emit(ControllerEvent::HistoryCleared));
        effects
    }

    /// Replace the pinned system prompt
    pub fn set_system_prompt(&mut self, prompt: &str) {
        self.history.set_system_prompt(prompt);
    }

    fn accept_user_text(&mut self, cycle: CycleId, text: &str) -> Vec<Effect> {
        let message = ConversationMessage::user(text);
        self.history.append(message.clone());

        let mut effects = vec![Effect::Emit(ControllerEvent::MessageAppended(message))];
        effects.extend(self.transition(InteractionState::Processing, None));
        effects.push(Effect::Complete {
            cycle,
            history: self.history.snapshot(),
        });
        effects
    }

    fn check(&self, cycle: CycleId, expected: InteractionState) -> Result<(), InteractionError> {
        if cycle == self.cycle && self.state == expected {
            return Ok(());
        }
        Err(InteractionError::StaleCallback {
            received: cycle.get(),
            current: self.cycle.get(),
        })
    }

    fn fail(&mut self, error: &InteractionError) -> Vec<Effect> {
        tracing::warn!(cycle = %self.cycle, error = %error, "interaction failed");
        self.transition(InteractionState::Idle, Some(error.to_string()))
    }

    fn begin_cycle(&mut self) -> CycleId {
        self.cycle = self.cycle.next();
        self.cycle
    }

    fn abandon(&mut self) {
        tracing::debug!(cycle = %self.cycle, state = %self.state, "abandoning cycle");
        self.cycle = self.cycle.next();
    }

    fn transition(&mut self, state: InteractionState, error: Option<String>) -> Vec<Effect> {
        tracing::debug!(from = %self.state, to = %state, cycle = %self.cycle, "state change");
        self.state = state;
        vec![Effect::Emit(ControllerEvent::StateChanged { state, error })]
    }
}

//! Interaction controller task
//!
//! A single task owns the [`InteractionMachine`]. Commands from the
//! presentation layer and results from service workers arrive on queues and
//! are applied one at a time, so every transition is atomic with respect to
//! every other trigger. Service calls run on their own tasks and report back
//! with the cycle id they were started for.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::machine::{Effect, InteractionMachine};
use super::state::{ControllerEvent, CycleId, InteractionState};
use crate::conversation::{ConversationHistory, ConversationSummary, HistorySnapshot};
use crate::services::{CompletionParams, Services};
use crate::voice::VoiceModes;
use crate::{Config, Error, InteractionError, Result};

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 64;

enum Command {
    Start(oneshot::Sender<bool>),
    SubmitText(String, oneshot::Sender<bool>),
    Say(String, oneshot::Sender<bool>),
    StopSpeaking(oneshot::Sender<bool>),
    Cancel(oneshot::Sender<bool>),
    ClearHistory(oneshot::Sender<()>),
    SetVoiceMode(String, oneshot::Sender<std::result::Result<String, InteractionError>>),
    VoiceMode(oneshot::Sender<String>),
    SetSystemPrompt(String, oneshot::Sender<()>),
    Summary(oneshot::Sender<ConversationSummary>),
    Snapshot(oneshot::Sender<HistorySnapshot>),
    Shutdown,
}

enum Outcome {
    Transcribed(std::result::Result<String, InteractionError>),
    Completed(std::result::Result<String, InteractionError>),
    Played(std::result::Result<(), InteractionError>),
}

struct WorkerResult {
    cycle: CycleId,
    outcome: Outcome,
}

/// Owns interaction state and conversation history
pub struct InteractionController {
    machine: InteractionMachine,
    services: Services,
    params: CompletionParams,
    listen_timeout: Duration,
    phrase_limit: Duration,
    voice_modes: VoiceModes,
    voice_mode: String,
    commands: mpsc::Receiver<Command>,
    results_tx: mpsc::UnboundedSender<WorkerResult>,
    results: mpsc::UnboundedReceiver<WorkerResult>,
    state_tx: watch::Sender<InteractionState>,
    events: broadcast::Sender<ControllerEvent>,
}

impl InteractionController {
    /// Create a controller and the handle used to drive it
    ///
    /// The speech output is configured with the default voice mode.
    ///
    /// # Errors
    ///
    /// Returns error if the default voice mode is not in the mode table
    pub fn new(config: &Config, services: Services) -> Result<(Self, ControllerHandle)> {
        let voice_modes = config.voice.modes.clone();
        let params = voice_modes.get(&config.voice.default_mode)?.clone();
        let voice_mode = voice_modes
            .canonical_name(&config.voice.default_mode)
            .unwrap_or(&config.voice.default_mode)
            .to_string();
        services.output.configure(params);

        let history = ConversationHistory::with_system_prompt(
            config.assistant.system_prompt.clone(),
            config.assistant.max_history_pairs,
        );

        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (results_tx, results) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(InteractionState::Idle);
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        let handle = ControllerHandle {
            commands: commands_tx,
            state: state_rx,
            events: events.clone(),
        };

        let controller = Self {
            machine: InteractionMachine::new(history),
            services,
            params: config.completion.params.clone(),
            listen_timeout: config.assistant.listen_timeout,
            phrase_limit: config.assistant.phrase_limit,
            voice_modes,
            voice_mode,
            commands,
            results_tx,
            results,
            state_tx,
            events,
        };

        Ok((controller, handle))
    }

    /// Create a controller and run it on a new task
    ///
    /// # Errors
    ///
    /// Returns error if the default voice mode is not in the mode table
    pub fn spawn(config: &Config, services: Services) -> Result<(ControllerHandle, JoinHandle<()>)> {
        let (controller, handle) = Self::new(config, services)?;
        Ok((handle, tokio::spawn(controller.run())))
    }

    /// Process commands and worker results until shut down
    ///
    /// Returns when [`ControllerHandle::shutdown`] is called or every handle
    /// has been dropped.
    pub async fn run(mut self) {
        tracing::info!(
            input = self.services.input.name(),
            completion = self.services.completion.name(),
            output = self.services.output.name(),
            voice_mode = %self.voice_mode,
            "interaction controller started"
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(result) = self.results.recv() => self.handle_result(result),
            }
        }

        if self.machine.state() == InteractionState::Speaking {
            self.services.output.stop();
        }
        tracing::info!("interaction controller stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let effects = self.machine.start_interaction();
                let _ = reply.send(self.apply_optional(effects));
            }
            Command::SubmitText(text, reply) => {
                let effects = self.machine.submit_text(&text);
                let _ = reply.send(self.apply_optional(effects));
            }
            Command::Say(text, reply) => {
                let effects = self.machine.say(&text);
                let _ = reply.send(self.apply_optional(effects));
            }
            Command::StopSpeaking(reply) => {
                let effects = self.machine.stop_speaking();
                let _ = reply.send(self.apply_optional(effects));
            }
            Command::Cancel(reply) => {
                let effects = self.machine.cancel();
                let _ = reply.send(self.apply_optional(effects));
            }
            Command::ClearHistory(reply) => {
                let effects = self.machine.clear_history();
                self.apply(effects);
                tracing::info!("conversation cleared");
                let _ = reply.send(());
            }
            Command::SetVoiceMode(name, reply) => {
                let _ = reply.send(self.set_voice_mode(&name));
            }
            Command::VoiceMode(reply) => {
                let _ = reply.send(self.voice_mode.clone());
            }
            Command::SetSystemPrompt(prompt, reply) => {
                self.machine.set_system_prompt(&prompt);
                tracing::debug!("system prompt replaced");
                let _ = reply.send(());
            }
            Command::Summary(reply) => {
                let _ = reply.send(self.machine.summary());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.machine.snapshot());
            }
            // handled by the run loop
            Command::Shutdown => {}
        }
    }

    fn handle_result(&mut self, result: WorkerResult) {
        let WorkerResult { cycle, outcome } = result;
        let applied = match outcome {
            Outcome::Transcribed(result) => self.machine.on_transcription(cycle, result),
            Outcome::Completed(result) => self.machine.on_completion(cycle, result),
            Outcome::Played(result) => self.machine.on_playback(cycle, result),
        };

        match applied {
            Ok(effects) => self.apply(effects),
            Err(e) => tracing::debug!(error = %e, "dropping stale result"),
        }
    }

    /// Selecting a mode only reconfigures the speech output
    fn set_voice_mode(&mut self, name: &str) -> std::result::Result<String, InteractionError> {
        let params = self.voice_modes.get(name)?.clone();
        let canonical = self
            .voice_modes
            .canonical_name(name)
            .unwrap_or(name)
            .to_string();

        self.services.output.configure(params);
        self.voice_mode.clone_from(&canonical);
        tracing::info!(mode = %canonical, "voice mode changed");
        self.publish(ControllerEvent::VoiceModeChanged(canonical.clone()));
        Ok(canonical)
    }

    fn apply_optional(&self, effects: Option<Vec<Effect>>) -> bool {
        effects.map(|effects| self.apply(effects)).is_some()
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&self, effect: Effect) {
        match effect {
            Effect::Listen(cycle) => {
                let input = Arc::clone(&self.services.input);
                let (timeout, phrase_limit) = (self.listen_timeout, self.phrase_limit);
                self.dispatch(cycle, async move {
                    Outcome::Transcribed(input.listen(timeout, phrase_limit).await)
                });
            }
            Effect::Complete { cycle, history } => {
                let completion = Arc::clone(&self.services.completion);
                let params = self.params.clone();
                self.dispatch(cycle, async move {
                    Outcome::Completed(completion.complete(history, &params).await)
                });
            }
            Effect::Speak { cycle, text } => {
                let output = Arc::clone(&self.services.output);
                output.arm();
                self.dispatch(cycle, async move { Outcome::Played(output.speak(&text).await) });
            }
            Effect::StopSpeaking => self.services.output.stop(),
            Effect::ResetCompletion => self.services.completion.reset(),
            Effect::Emit(event) => self.publish(event),
        }
    }

    /// Run a service call on its own task; its result comes back on the queue
    fn dispatch<F>(&self, cycle: CycleId, work: F)
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        let results = self.results_tx.clone();
        tokio::spawn(async move {
            let outcome = work.await;
            // controller gone: nobody left to apply it
            let _ = results.send(WorkerResult { cycle, outcome });
        });
    }

    fn publish(&self, event: ControllerEvent) {
        if let ControllerEvent::StateChanged { state, error } = &event {
            match error {
                Some(error) => tracing::info!(state = %state, error = %error, "state changed"),
                None => tracing::info!(state = %state, "state changed"),
            }
            self.state_tx.send_replace(*state);
        }
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Cloneable handle for driving an [`InteractionController`]
///
/// Every method returns [`Error::ControllerClosed`] once the controller
/// task has stopped.
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<InteractionState>,
    events: broadcast::Sender<ControllerEvent>,
}

impl ControllerHandle {
    /// Start listening for a phrase
    ///
    /// Returns `false` without side effects if a cycle is already in flight.
    ///
    /// # Errors
    ///
    /// Returns error if the controller has stopped
    pub async fn start_interaction(&self) -> Result<bool> {
        self.request(Command::Start).await
    }

    /// Start a cycle from typed text instead of speech
    ///
    /// Returns `false` if busy or `text` is blank.
    ///
    /// # Errors
    ///
    /// Returns error if the controller has stopped
    pub async fn submit_text(&self, text: impl Into<String>) -> Result<bool> {
        let text = text.into();
        self.request(|reply| Command::SubmitText(text, reply)).await
    }

    /// Speak `text` without recording it in the conversation
    ///
    /// Returns `false` if busy or `text` is blank.
    ///
    /// # Errors
    ///
    /// Returns error if the controller has stopped
    pub async fn say(&self, text: impl Into<String>) -> Result<bool> {
        let text = text.into();
        self.request(|reply| Command::Say(text, reply)).await
    }

    /// Stop speaking and return to idle at once
    ///
    /// Returns `false` if the assistant was not speaking.
    ///
    /// # Errors
    ///
    /// Returns error if the controller has stopped
    pub async fn stop_speaking(&self) -> Result<bool> {
        self.request(Command::StopSpeaking).await
    }

    /// Abandon a listening or processing cycle
    ///
    /// Returns `false` if neither was in progress.
    ///
    /// # Errors
    ///
    /// Returns error if the controller has stopped
    pub async fn cancel_interaction(&self) -> Result<bool> {
        self.request(Command::Cancel).await
    }

    /// Reset the conversation to the system prompt
    ///
    /// # Errors
    ///
    /// Returns error if the controller has stopped
    pub async fn clear_history(&self) -> Result<()> {
        self.request(Command::ClearHistory).await
    }

    /// Select a voice mode by name (case-insensitive)
    ///
    /// Returns the mode's canonical name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownVoiceMode` if no such mode exists, or error if the
    /// controller has stopped
    pub async fn set_voice_mode(&self, name: impl Into<String>) -> Result<String> {
        let name = name.into();
        let mode = self
            .request(|reply| Command::SetVoiceMode(name, reply))
            .await??;
        Ok(mode)
    }

    /// Name of the voice mode in effect
    ///
    /// # Errors
    ///
    /// Returns error if the controller has stopped
    pub async fn voice_mode(&self) -> Result<String> {
        self.request(Command::VoiceMode).await
    }

    /// Replace the system prompt
    ///
    /// # Errors
    ///
    /// Returns error if the controller has stopped
    pub async fn set_system_prompt(&self, prompt: impl Into<String>) -> Result<()> {
        let prompt = prompt.into();
        self.request(|reply| Command::SetSystemPrompt(prompt, reply)).await
    }

    /// Summarize the conversation
    ///
    /// # Errors
    ///
    /// Returns error if the controller has stopped
    pub async fn summary(&self) -> Result<ConversationSummary> {
        self.request(Command::Summary).await
    }

    /// Copy of the conversation history
    ///
    /// # Errors
    ///
    /// Returns error if the controller has stopped
    pub async fn snapshot(&self) -> Result<HistorySnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Current interaction state
    #[must_use]
    pub fn state(&self) -> InteractionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<InteractionState> {
        self.state.clone()
    }

    /// Wait until the controller reaches `target`
    ///
    /// # Errors
    ///
    /// Returns error if the controller stops first
    pub async fn wait_for_state(&self, target: InteractionState) -> Result<()> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| Error::ControllerClosed)
    }

    /// Subscribe to controller events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// Stop the controller task
    ///
    /// # Errors
    ///
    /// Returns error if the controller has already stopped
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| Error::ControllerClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| Error::ControllerClosed)?;
        response.await.map_err(|_| Error::ControllerClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{CompletionBackend, ConsoleOutput, FixedResponseStub, ScriptedInput};

    fn demo_services() -> Services {
        Services {
            input: Arc::new(ScriptedInput::new(vec!["hello".to_string()], Duration::ZERO)),
            completion: Arc::new(CompletionBackend::Stub(FixedResponseStub::new(
                vec!["hi there".to_string()],
                Duration::ZERO,
            ))),
            output: Arc::new(ConsoleOutput::with_pace("ARIA".to_string(), 0.001)),
        }
    }

    fn demo_config() -> Config {
        Config {
            demo: true,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_demo_cycle_runs_to_idle() {
        let (handle, task) = InteractionController::spawn(&demo_config(), demo_services()).unwrap();

        assert!(handle.start_interaction().await.unwrap());

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let summary = handle.summary().await.unwrap();
                if summary.last_assistant_message.is_some()
                    && handle.state() == InteractionState::Idle
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("cycle should finish");

        let history = handle.snapshot().await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].content, "hello");
        assert_eq!(history[2].content, "hi there");

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(
            handle.start_interaction().await,
            Err(Error::ControllerClosed)
        ));
    }

    #[tokio::test]
    async fn test_unknown_default_mode_is_rejected() {
        let mut config = demo_config();
        config.voice.default_mode = "Robot".to_string();
        assert!(InteractionController::new(&config, demo_services()).is_err());
    }

    #[tokio::test]
    async fn test_voice_mode_selection() {
        let (handle, _task) = InteractionController::spawn(&demo_config(), demo_services()).unwrap();
        let mut events = handle.subscribe();

        assert_eq!(handle.voice_mode().await.unwrap(), "Male");
        assert_eq!(handle.set_voice_mode("alien").await.unwrap(), "Alien");
        assert_eq!(
            events.recv().await.unwrap(),
            ControllerEvent::VoiceModeChanged("Alien".to_string())
        );

        let err = handle.set_voice_mode("Robot").await.unwrap_err();
        assert!(matches!(
            err,
            Error::VoiceMode(InteractionError::UnknownVoiceMode(_))
        ));
        assert_eq!(handle.voice_mode().await.unwrap(), "Alien");
        assert_eq!(handle.state(), InteractionState::Idle);
    }
}

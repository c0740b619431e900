//! Shared test utilities
//!
//! Fake services whose calls block until the test releases a result, so a
//! test can hold the controller in any state and deliver results late.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use aria_assistant::services::{CompletionParams, CompletionService, SpeechInput, SpeechOutput};
use aria_assistant::{
    Config, ControllerEvent, ControllerHandle, HistorySnapshot, InteractionController,
    InteractionError, InteractionState, Services, VoiceParams,
};

/// How long a test waits for the controller before failing
pub const WAIT: Duration = Duration::from_secs(2);

/// Queue of results handed out one per call
pub struct Gate<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<T>>,
    calls: AtomicUsize,
}

impl<T> Gate<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: tokio::sync::Mutex::new(rx),
            calls: AtomicUsize::new(0),
        }
    }

    /// Let the next (or current) call finish with `value`
    pub fn release(&self, value: T) {
        self.tx.send(value).expect("gate receiver dropped");
    }

    /// Number of calls started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn pass(&self) -> T {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rx
            .lock()
            .await
            .recv()
            .await
            .expect("gate sender dropped")
    }
}

pub struct FakeInput {
    pub gate: Gate<Result<String, InteractionError>>,
}

#[async_trait]
impl SpeechInput for FakeInput {
    async fn listen(
        &self,
        _timeout: Duration,
        _phrase_limit: Duration,
    ) -> Result<String, InteractionError> {
        self.gate.pass().await
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

pub struct FakeCompletion {
    pub gate: Gate<Result<String, InteractionError>>,
    pub requests: Mutex<Vec<HistorySnapshot>>,
    pub resets: AtomicUsize,
}

impl FakeCompletion {
    pub fn requests(&self) -> Vec<HistorySnapshot> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionService for FakeCompletion {
    async fn complete(
        &self,
        history: HistorySnapshot,
        _params: &CompletionParams,
    ) -> Result<String, InteractionError> {
        self.requests.lock().unwrap().push(history);
        self.gate.pass().await
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

pub struct FakeOutput {
    pub gate: Gate<Result<(), InteractionError>>,
    pub spoken: Mutex<Vec<String>>,
    pub configured: Mutex<Vec<VoiceParams>>,
    pub arms: AtomicUsize,
    pub stops: AtomicUsize,
}

impl FakeOutput {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }

    pub fn configured(&self) -> Vec<VoiceParams> {
        self.configured.lock().unwrap().clone()
    }

    pub fn arms(&self) -> usize {
        self.arms.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechOutput for FakeOutput {
    async fn speak(&self, text: &str) -> Result<(), InteractionError> {
        self.spoken.lock().unwrap().push(text.to_string());
        self.gate.pass().await
    }

    fn arm(&self) {
        self.arms.fetch_add(1, Ordering::SeqCst);
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn configure(&self, params: VoiceParams) {
        self.configured.lock().unwrap().push(params);
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// A running controller wired to fake services
pub struct Harness {
    pub handle: ControllerHandle,
    pub events: broadcast::Receiver<ControllerEvent>,
    pub input: Arc<FakeInput>,
    pub completion: Arc<FakeCompletion>,
    pub output: Arc<FakeOutput>,
    pub task: JoinHandle<()>,
}

/// Config for tests: demo mode, system prompt "sys", `max_pairs` exchanges
pub fn test_config(max_pairs: usize) -> Config {
    let mut config = Config {
        demo: true,
        ..Config::default()
    };
    config.assistant.system_prompt = "sys".to_string();
    config.assistant.max_history_pairs = max_pairs;
    config
}

pub fn harness(max_pairs: usize) -> Harness {
    let input = Arc::new(FakeInput { gate: Gate::new() });
    let completion = Arc::new(FakeCompletion {
        gate: Gate::new(),
        requests: Mutex::new(Vec::new()),
        resets: AtomicUsize::new(0),
    });
    let output = Arc::new(FakeOutput {
        gate: Gate::new(),
        spoken: Mutex::new(Vec::new()),
        configured: Mutex::new(Vec::new()),
        arms: AtomicUsize::new(0),
        stops: AtomicUsize::new(0),
    });

    let services = Services {
        input: input.clone(),
        completion: completion.clone(),
        output: output.clone(),
    };

    let (handle, task) = InteractionController::spawn(&test_config(max_pairs), services)
        .expect("failed to start controller");
    let events = handle.subscribe();

    Harness {
        handle,
        events,
        input,
        completion,
        output,
        task,
    }
}

/// Wait until the controller reports `state`
pub async fn wait_for(handle: &ControllerHandle, state: InteractionState) {
    tokio::time::timeout(WAIT, handle.wait_for_state(state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
        .expect("controller stopped");
}

/// Wait until `count` returns at least `n`
pub async fn wait_until(n: usize, count: impl Fn() -> usize) {
    tokio::time::timeout(WAIT, async {
        while count() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for service call");
}

/// Next state change event, skipping other events
pub async fn next_state_change(
    events: &mut broadcast::Receiver<ControllerEvent>,
) -> (InteractionState, Option<String>) {
    tokio::time::timeout(WAIT, async {
        loop {
            if let ControllerEvent::StateChanged { state, error } =
                events.recv().await.expect("event channel closed")
            {
                return (state, error);
            }
        }
    })
    .await
    .expect("timed out waiting for state change")
}

/// Give in-flight worker results time to reach the controller
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Contents of a history snapshot, in order
pub fn contents(history: &HistorySnapshot) -> Vec<&str> {
    history.iter().map(|m| m.content.as_str()).collect()
}

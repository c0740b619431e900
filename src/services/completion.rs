//! Chat completion backends

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::CompletionService;
use crate::conversation::HistorySnapshot;
use crate::{Config, Error, InteractionError, Result};

/// Model and sampling parameters sent with each request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            max_tokens: 500,
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Completion backend chosen at construction
pub enum CompletionBackend {
    /// OpenAI-compatible chat completions API
    Cloud(CloudCompletion),
    /// Canned replies, no network
    Stub(FixedResponseStub),
}

impl CompletionBackend {
    /// Build the backend selected by `config`
    ///
    /// # Errors
    ///
    /// Returns error if cloud mode is selected without an API key
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.demo {
            return Ok(Self::Stub(FixedResponseStub::demo()));
        }

        let api_key = config
            .api_keys
            .openai
            .clone()
            .ok_or_else(|| Error::Config("OpenAI API key required for completions".to_string()))?;

        Ok(Self::Cloud(CloudCompletion::new(
            api_key,
            config.completion.base_url.clone(),
        )?))
    }
}

#[async_trait]
impl CompletionService for CompletionBackend {
    async fn complete(
        &self,
        history: HistorySnapshot,
        params: &CompletionParams,
    ) -> std::result::Result<String, InteractionError> {
        match self {
            Self::Cloud(cloud) => cloud.complete(history, params).await,
            Self::Stub(stub) => stub.complete(history, params).await,
        }
    }

    fn reset(&self) {
        match self {
            Self::Cloud(cloud) => cloud.reset(),
            Self::Stub(stub) => stub.reset(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Cloud(cloud) => cloud.name(),
            Self::Stub(stub) => stub.name(),
        }
    }
}

/// OpenAI-compatible `/chat/completions` client
pub struct CloudCompletion {
    client: Client,
    api_key: String,
    base_url: String,
}

impl CloudCompletion {
    /// Create a client for `base_url` (e.g. `https://api.openai.com/v1`)
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, base_url: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for completions".to_string()));
        }

        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn request(&self, history: &HistorySnapshot, params: &CompletionParams) -> Result<String> {
        let request = ChatCompletionRequest {
            model: &params.model,
            messages: history
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
        };

        tracing::debug!(
            model = %params.model,
            messages = request.messages.len(),
            "sending completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "completion API error");
            return Err(Error::Completion(format!("API error {status}: {body}")));
        }

        let result: ChatCompletionResponse = response.json().await?;
        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if reply.is_empty() {
            return Err(Error::Completion("empty reply".to_string()));
        }

        tracing::info!(chars = reply.len(), "completion received");
        Ok(reply)
    }
}

#[async_trait]
impl CompletionService for CloudCompletion {
    async fn complete(
        &self,
        history: HistorySnapshot,
        params: &CompletionParams,
    ) -> std::result::Result<String, InteractionError> {
        self.request(&history, params).await.map_err(|e| {
            let message = match e {
                Error::Completion(message) => message,
                other => other.to_string(),
            };
            InteractionError::CompletionServiceError(message)
        })
    }

    fn name(&self) -> &'static str {
        "cloud"
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Canned demo replies
pub const DEMO_RESPONSES: &[&str] = &[
    "Hello! I'm ARIA, your futuristic voice assistant. This is a demo version!",
    "I'm working perfectly! The holographic interface is quite stunning, isn't it?",
    "In this demo, I can show you how the voice assistant interface works.",
    "The animated circle represents my consciousness. Pretty cool, right?",
    "This futuristic design showcases what's possible with modern UI technology.",
    "I would normally be powered by GPT-4, but this demo works offline!",
    "You can test different voice modes using the dropdown above.",
    "The conversation history keeps track of our entire discussion.",
    "Thank you for trying out this futuristic voice assistant demo!",
];

/// Replies from a fixed list in rotation, after a simulated delay
pub struct FixedResponseStub {
    responses: Vec<String>,
    next: AtomicUsize,
    delay: Duration,
}

impl FixedResponseStub {
    /// Rotate through `responses`, waiting `delay` before each reply
    #[must_use]
    pub fn new(responses: Vec<String>, delay: Duration) -> Self {
        Self {
            responses,
            next: AtomicUsize::new(0),
            delay,
        }
    }

    /// The built-in demo replies with a two second "thinking" delay
    #[must_use]
    pub fn demo() -> Self {
        Self::new(
            DEMO_RESPONSES.iter().map(ToString::to_string).collect(),
            Duration::from_secs(2),
        )
    }
}

#[async_trait]
impl CompletionService for FixedResponseStub {
    async fn complete(
        &self,
        _history: HistorySnapshot,
        _params: &CompletionParams,
    ) -> std::result::Result<String, InteractionError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.responses.is_empty() {
            return Err(InteractionError::CompletionServiceError(
                "no canned responses configured".to_string(),
            ));
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        Ok(self.responses[index].clone())
    }

    fn reset(&self) {
        self.next.store(0, Ordering::Relaxed);
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

//! Chat-completion service boundary.
//!
//! The engine depends only on [`CompletionService`]: one request in, one
//! free-text reply out. [`OpenAiCompletionClient`] speaks the OpenAI-compatible
//! `chat/completions` schema; [`ScriptedCompletion`] replays canned replies
//! for tests and offline runs.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use floodsafe_core::config::ChatConfig;
use floodsafe_core::types::{Message, Role};

use crate::error::ChatError;

// =============================================================================
// Request
// =============================================================================

/// One role/content pair in the wire order sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Everything the service receives for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System directive for this request.
    pub system: String,
    /// Every message exchanged before this submission, oldest first.
    pub history: Vec<Message>,
    /// The new user turn.
    pub prompt: String,
}

impl CompletionRequest {
    /// Directive, then history, then the new user turn.
    pub fn turns(&self) -> Vec<ChatTurn> {
        let mut turns = Vec::with_capacity(self.history.len() + 2);
        turns.push(ChatTurn {
            role: "system".to_string(),
            content: self.system.clone(),
        });
        turns.extend(self.history.iter().map(|m| ChatTurn {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }));
        turns.push(ChatTurn {
            role: Role::User.as_str().to_string(),
            content: self.prompt.clone(),
        });
        turns
    }
}

/// A service that turns a conversation into a single reply.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Return the raw reply text for `request`.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ChatError>;
}

// =============================================================================
// OpenAI-compatible client
// =============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatTurn>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

/// Client for OpenAI-compatible `chat/completions` endpoints.
pub struct OpenAiCompletionClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl OpenAiCompletionClient {
    pub fn new(config: &ChatConfig) -> Result<Self, ChatError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;

        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            tracing::warn!(
                env = %config.api_key_env,
                "No chat API key configured; requests will be sent unauthenticated"
            );
        }

        tracing::info!(
            endpoint = %config.endpoint,
            model = %config.model,
            "Chat completion client ready"
        );

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    /// Decode a response body, rejecting HTML error pages served with a 2xx.
    fn parse_body(body: &str) -> Result<String, ChatError> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(ChatError::MalformedPayload(format!(
                "expected JSON, got HTML: {}",
                preview
            )));
        }

        let parsed: ApiResponse = serde_json::from_str(body)
            .map_err(|e| ChatError::MalformedPayload(format!("invalid JSON: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::MalformedPayload("no choices returned".to_string()))?
            .message
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ChatError::MalformedPayload("reply has no content".to_string()))?;

        Ok(content)
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ChatError> {
        let body = ApiRequest {
            model: &self.model,
            messages: request.turns(),
            temperature: self.temperature,
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            turns = body.messages.len(),
            "Sending chat completion request"
        );

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ChatError::Transport(format!("request to {} timed out", self.endpoint))
            } else if e.is_connect() {
                ChatError::Transport(format!("failed to connect to {}: {}", self.endpoint, e))
            } else {
                ChatError::Transport(format!("request to {} failed: {}", self.endpoint, e))
            }
        })?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let preview: String = text.chars().take(500).collect();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body: preview,
            });
        }

        let content = Self::parse_body(&text)?;
        tracing::debug!(chars = content.len(), "Chat completion received");
        Ok(content)
    }
}

// =============================================================================
// Scripted service
// =============================================================================

enum Scripted {
    Reply(String),
    Fail(String),
}

/// Completion service that replays queued replies in order.
///
/// Every request is recorded. When the queue runs dry the service fails
/// with a transport error. A gated instance holds each request until
/// [`ScriptedCompletion::release`] is called.
#[derive(Default)]
pub struct ScriptedCompletion {
    queue: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<CompletionRequest>>,
    gate: Option<Semaphore>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service whose requests wait for [`ScriptedCompletion::release`].
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Queue a successful reply.
    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Scripted::Reply(text.into()));
        self
    }

    /// Queue a transport failure.
    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Scripted::Fail(message.into()));
        self
    }

    /// Queue a successful reply on a shared instance.
    pub fn push_reply(&self, text: impl Into<String>) {
        self.push(Scripted::Reply(text.into()));
    }

    /// Let one held request proceed.
    pub fn release(&self) {
        if let Some(ref gate) = self.gate {
            gate.add_permits(1);
        }
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, item: Scripted) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(item);
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ChatError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if let Some(ref gate) = self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| ChatError::Transport(e.to_string()))?;
            permit.forget();
        }

        let next = self
            .queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail(message)) => Err(ChatError::Transport(message)),
            None => Err(ChatError::Transport("no scripted reply left".to_string())),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

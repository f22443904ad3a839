//! Provider trait: the abstraction over text-generation backends.
//!
//! A Provider knows how to send a role-tagged message list to a model and get
//! the reply back, either whole or as a stream of text pieces. It can also
//! run a single-shot prompt without any history.
//!
//! Implementations: Ollama (native API), OpenAI-compatible endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::message::{ChatMessage, Role};

/// A chat request: model plus ordered messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model to use (e.g., "deepseek-r1:8b")
    pub model: String,

    /// System instruction followed by the conversation
    pub messages: Vec<ChatMessage>,

    /// Whether the reply should be streamed
    #[serde(default)]
    pub stream: bool,

    /// Ask reasoning models to think out loud; `Some(false)` suppresses it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think: Option<bool>,

    /// Sampling temperature; the backend default is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: false,
            think: None,
            temperature: None,
        }
    }
}

/// A complete (non-streaming) chat reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// The generated text
    pub content: String,

    /// Which model actually responded
    pub model: String,

    /// Token usage statistics, when the backend reports them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// A single-shot generation request: no roles, no history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,

    pub prompt: String,

    /// Optional system instruction for backends that accept one separately
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A single-shot generation reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,

    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single piece of a streaming reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// The core Provider trait.
///
/// The dispatcher calls `chat()`, `chat_stream()` or `generate()` without
/// knowing which backend is behind it.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "ollama").
    fn name(&self) -> &str;

    /// Send a chat request and wait for the whole reply.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, GenerationError>;

    /// Send a chat request and get the reply as a stream of pieces.
    ///
    /// Default implementation calls `chat()` and wraps the result as a single chunk.
    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamChunk, GenerationError>>,
        GenerationError,
    > {
        let response = self.chat(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(response.content),
                done: true,
                usage: response.usage,
            }))
            .await;
        Ok(rx)
    }

    /// Run a single prompt with no role history.
    ///
    /// Default implementation sends the prompt as one user message (after the
    /// system instruction, if any) through `chat()`.
    async fn generate(
        &self,
        request: GenerateRequest,
    ) -> Result<GenerateResponse, GenerationError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage {
            role: Role::User,
            content: request.prompt,
        });

        let response = self
            .chat(ChatRequest {
                model: request.model,
                messages,
                stream: false,
                think: request.think,
                temperature: request.temperature,
            })
            .await?;

        Ok(GenerateResponse {
            text: response.content,
            model: response.model,
            usage: response.usage,
        })
    }

    /// List available models for this provider.
    async fn list_models(&self) -> Result<Vec<String>, GenerationError> {
        Ok(Vec::new())
    }

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> Result<bool, GenerationError> {
        Ok(true)
    }
}

/// Drain a streaming reply, concatenating pieces in arrival order.
pub async fn collect_stream(
    mut rx: tokio::sync::mpsc::Receiver<Result<StreamChunk, GenerationError>>,
) -> Result<String, GenerationError> {
    let mut text = String::new();
    while let Some(chunk) = rx.recv().await {
        let chunk = chunk?;
        if let Some(piece) = chunk.content {
            text.push_str(&piece);
        }
        if chunk.done {
            break;
        }
    }
    Ok(text)
}

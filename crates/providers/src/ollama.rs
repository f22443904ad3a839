//! Ollama provider: native `/api/chat` and `/api/generate`.
//!
//! Supports:
//! - Chat (non-streaming JSON and streaming NDJSON)
//! - Single-shot generate
//! - `think` toggle for reasoning models such as deepseek-r1
//! - Model listing via `/api/tags`

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use meshbridge_core::error::GenerationError;
use meshbridge_core::message::ChatMessage;
use meshbridge_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::lines::LineBuffer;
use crate::{http_client, map_send_error};

/// A provider talking to a local or remote Ollama server.
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GenerationError> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: http_client(timeout)?,
        })
    }

    fn chat_body<'a>(request: &'a ChatRequest, stream: bool) -> ChatBody<'a> {
        ChatBody {
            model: &request.model,
            messages: &request.messages,
            stream,
            think: request.think,
            options: request.temperature.map(|temperature| Options { temperature }),
        }
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
        model: &str,
    ) -> Result<reqwest::Response, GenerationError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();
        if status == 200 {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&error_body)
            .map(|e| e.error)
            .unwrap_or(error_body);
        warn!(status, error = %message, "Ollama returned error");

        if status == 404 {
            return Err(GenerationError::ModelNotFound(model.to_string()));
        }
        Err(GenerationError::Api {
            status_code: status,
            message,
        })
    }
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, GenerationError> {
        debug!(model = %request.model, messages = request.messages.len(), "Sending chat request");

        let response = self
            .post("/api/chat", &Self::chat_body(&request, false), &request.model)
            .await?;

        let api: ChatApiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        Ok(ChatResponse {
            content: api.message.map(|m| m.content).unwrap_or_default(),
            usage: usage(api.prompt_eval_count, api.eval_count),
            model: api.model,
        })
    }

    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<Result<StreamChunk, GenerationError>>, GenerationError>
    {
        debug!(model = %request.model, "Sending streaming chat request");

        let response = self
            .post("/api/chat", &Self::chat_body(&request, true), &request.model)
            .await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Read the NDJSON body line by line
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(GenerationError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                lines.push(&bytes);

                while let Some(line) = lines.next_line() {
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    };
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    match parse_stream_line(line) {
                        Ok(chunk) => {
                            let done = chunk.done;
                            if tx.send(Ok(chunk)).await.is_err() || done {
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }

            // Trailing line without a newline
            if let Some(Ok(tail)) = lines.finish() {
                let tail = tail.trim();
                if !tail.is_empty() {
                    match parse_stream_line(tail) {
                        Ok(chunk) => {
                            let _ = tx.send(Ok(chunk)).await;
                        }
                        Err(e) => trace!(error = %e, "Ignoring unparseable trailing stream data"),
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, GenerationError> {
        debug!(model = %request.model, "Sending generate request");

        let body = GenerateBody {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            stream: false,
            think: request.think,
            options: request.temperature.map(|temperature| Options { temperature }),
        };

        let response = self.post("/api/generate", &body, &request.model).await?;

        let api: GenerateApiResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        Ok(GenerateResponse {
            text: api.response,
            usage: usage(api.prompt_eval_count, api.eval_count),
            model: api.model,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, GenerationError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(map_send_error)?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn health_check(&self) -> Result<bool, GenerationError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.client.get(&url).send().await.map_err(map_send_error)?;
        Ok(response.status().is_success())
    }
}

/// Parse one NDJSON line of a streaming chat reply.
fn parse_stream_line(line: &str) -> Result<StreamChunk, GenerationError> {
    let parsed: ChatApiResponse = serde_json::from_str(line)
        .map_err(|e| GenerationError::InvalidResponse(format!("Bad stream line: {e}")))?;

    if let Some(error) = parsed.error {
        return Err(GenerationError::StreamInterrupted(error));
    }

    Ok(StreamChunk {
        content: parsed.message.map(|m| m.content),
        done: parsed.done,
        usage: if parsed.done {
            usage(parsed.prompt_eval_count, parsed.eval_count)
        } else {
            None
        },
    })
}

fn usage(prompt: Option<u32>, completion: Option<u32>) -> Option<Usage> {
    match (prompt, completion) {
        (None, None) => None,
        (p, c) => {
            let prompt_tokens = p.unwrap_or(0);
            let completion_tokens = c.unwrap_or(0);
            Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            })
        }
    }
}

// --- Ollama API types (internal) ---

#[derive(Debug, Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Options>,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    think: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<Options>,
}

#[derive(Debug, Serialize)]
struct Options {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    message: Option<ApiMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

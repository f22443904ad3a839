//! The dispatch loop: one inbound packet at a time, start to finish.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use meshbridge_config::{AppConfig, ConfigError, GenerationMode};
use meshbridge_core::channel::ChannelSelector;
use meshbridge_core::error::{EnvelopeError, GenerationError, TransportError};
use meshbridge_core::event::{DomainEvent, EventBus};
use meshbridge_core::message::{ChatMessage, Turn};
use meshbridge_core::provider::{ChatRequest, GenerateRequest, Provider, collect_stream};
use meshbridge_core::transport::{InboundEnvelope, Transport};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::request::build_request;
use crate::segment::{Frame, segment};
use crate::session::SessionStore;

/// Longest message excerpt carried in events.
const PREVIEW_CHARS: usize = 40;

/// Fixed settings for a dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Channel(s) to answer on
    pub channel: ChannelSelector,

    /// Model name passed to the provider
    pub model: String,

    /// Prepended to every request as the system turn
    pub system_prompt: String,

    /// Multi-turn chat or single-prompt generate
    pub mode: GenerationMode,

    /// Request a streamed reply and join the pieces
    pub stream: bool,

    /// Ask reasoning models to emit their thinking
    pub think: bool,

    /// Sampling temperature, provider default when unset
    pub temperature: Option<f32>,

    /// Largest frame the transport accepts, in characters
    pub max_frame_len: NonZeroUsize,
}

impl DispatcherConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let max_frame_len = config.transport.frame_len().ok_or_else(|| {
            ConfigError::ValidationError("transport.max_frame_len must be greater than 0".into())
        })?;

        Ok(Self {
            channel: config.channel,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
            mode: config.generation.mode,
            stream: config.generation.stream,
            think: config.generation.think,
            temperature: config.generation.temperature,
            max_frame_len,
        })
    }
}

/// What happened to an inbound packet that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The reply was segmented and handed to the transport
    Replied {
        channel: u32,
        frames_sent: usize,
        frames_failed: usize,
    },
    /// Arrived on a channel we don't answer on
    Filtered { channel: u32 },
}

/// Why an inbound packet produced no reply.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Dropped undecodable packet: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("Transport failed: {0}")]
    Transport(#[from] TransportError),
}

impl DispatchError {
    /// Only a lost transport link stops the loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DispatchError::Transport(e) if e.is_fatal())
    }
}

/// Connects one transport to one provider through a session store.
///
/// The dispatcher owns its sessions; several dispatchers can run side by
/// side without sharing any state.
pub struct Dispatcher {
    provider: Arc<dyn Provider>,
    transport: Arc<dyn Transport>,
    sessions: SessionStore,
    config: DispatcherConfig,
    event_bus: Option<Arc<EventBus>>,
}

impl Dispatcher {
    pub fn new(
        provider: Arc<dyn Provider>,
        transport: Arc<dyn Transport>,
        sessions: SessionStore,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            provider,
            transport,
            sessions,
            config,
            event_bus: None,
        }
    }

    /// Publish domain events for every packet handled.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Consume inbound packets until the transport closes the stream.
    ///
    /// Per-packet failures are logged and skipped. Returns `Err` only when
    /// the transport reports that its link is gone.
    pub async fn run(
        &mut self,
        mut inbound: mpsc::Receiver<Result<InboundEnvelope, TransportError>>,
    ) -> Result<(), DispatchError> {
        info!(
            transport = self.transport.name(),
            provider = self.provider.name(),
            model = %self.config.model,
            "Listening on {}",
            self.config.channel
        );

        while let Some(item) = inbound.recv().await {
            let envelope = match item {
                Ok(envelope) => envelope,
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Transport link lost");
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(error = %e, "Dropping unreadable packet");
                    self.publish(DomainEvent::EnvelopeRejected {
                        reason: e.to_string(),
                        timestamp: Utc::now(),
                    });
                    continue;
                }
            };

            match self.handle(envelope).await {
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Transport link lost while replying");
                    return Err(e);
                }
                Err(e) => warn!(error = %e, "Skipping inbound message"),
            }
        }

        info!("Inbound stream closed, dispatcher stopping");
        Ok(())
    }

    /// Handle a single inbound packet.
    pub async fn handle(
        &mut self,
        envelope: InboundEnvelope,
    ) -> Result<DispatchOutcome, DispatchError> {
        let message = envelope.decode().inspect_err(|e| {
            self.publish(DomainEvent::EnvelopeRejected {
                reason: e.to_string(),
                timestamp: Utc::now(),
            });
        })?;

        info!(
            channel = message.channel,
            sender = %message.sender,
            "Incoming message: {}",
            message.text
        );

        if !self.config.channel.accepts(message.channel) {
            debug!(
                channel = message.channel,
                target = %self.config.channel,
                "Message ignored, not on the target channel"
            );
            self.publish(DomainEvent::MessageFiltered {
                channel: message.channel,
                sender_id: message.sender.to_string(),
                timestamp: Utc::now(),
            });
            return Ok(DispatchOutcome::Filtered {
                channel: message.channel,
            });
        }

        self.publish(DomainEvent::MessageReceived {
            channel: message.channel,
            sender_id: message.sender.to_string(),
            content_preview: message.text.chars().take(PREVIEW_CHARS).collect(),
            timestamp: Utc::now(),
        });

        let messages = build_request(
            &self.config.system_prompt,
            self.sessions
                .append_and_bound(&message.sender, Turn::user(message.text.as_str())),
        );

        let started = Instant::now();
        let reply = match self.generate(messages, &message.text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    sender = %message.sender,
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Generation failed, no reply sent"
                );
                self.publish(DomainEvent::GenerationFailed {
                    sender_id: message.sender.to_string(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(e.into());
            }
        };

        info!(
            sender = %message.sender,
            chars = reply.chars().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sending reply: {}",
            reply
        );

        let frames = segment(&reply, self.config.max_frame_len);
        self.sessions
            .append_and_bound(&message.sender, Turn::assistant(reply));

        let (frames_sent, frames_failed) = self.send_frames(&frames, message.channel).await?;

        self.publish(DomainEvent::ReplySent {
            channel: message.channel,
            sender_id: message.sender.to_string(),
            frames_sent,
            frames_failed,
            timestamp: Utc::now(),
        });

        Ok(DispatchOutcome::Replied {
            channel: message.channel,
            frames_sent,
            frames_failed,
        })
    }

    /// Call the provider in the configured mode.
    async fn generate(
        &self,
        messages: Vec<ChatMessage>,
        text: &str,
    ) -> Result<String, GenerationError> {
        let think = Some(self.config.think);

        let reply = match self.config.mode {
            GenerationMode::Chat => {
                let request = ChatRequest {
                    model: self.config.model.clone(),
                    messages,
                    stream: self.config.stream,
                    think,
                    temperature: self.config.temperature,
                };
                if self.config.stream {
                    collect_stream(self.provider.chat_stream(request).await?).await?
                } else {
                    self.provider.chat(request).await?.content
                }
            }
            GenerationMode::Generate => {
                self.provider
                    .generate(GenerateRequest {
                        model: self.config.model.clone(),
                        prompt: text.to_string(),
                        system: Some(self.config.system_prompt.clone()),
                        think,
                        temperature: self.config.temperature,
                    })
                    .await?
                    .text
            }
        };

        if reply.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }
        Ok(reply)
    }

    /// Send frames in order. A failed frame does not stop the rest unless the
    /// link itself is gone.
    async fn send_frames(
        &self,
        frames: &[Frame],
        channel: u32,
    ) -> Result<(usize, usize), TransportError> {
        let mut sent = 0;
        let mut failed = 0;

        for (index, frame) in frames.iter().enumerate() {
            match self.transport.send(frame.as_str(), channel).await {
                Ok(()) => sent += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(channel, frame = index, total = frames.len(), error = %e, "Frame send failed");
                    failed += 1;
                }
            }
        }

        Ok((sent, failed))
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

//! # meshbridge core
//!
//! Domain types, traits, and error definitions for the meshbridge relay.
//! This crate has **no framework dependencies**: it defines the domain model
//! that the transport, provider and relay crates implement against.
//!
//! ## Layout
//!
//! - [`message`]: turns, chat messages and sender identities
//! - [`channel`]: the channel selector used to filter inbound traffic
//! - [`transport`]: the radio transport trait and inbound envelope
//! - [`provider`]: the generation client trait
//! - [`event`]: domain events published by the dispatcher
//! - [`error`]: the tagged error taxonomy

pub mod channel;
pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use channel::ChannelSelector;
pub use error::{EnvelopeError, GenerationError, TransportError};
pub use event::{DomainEvent, EventBus};
pub use message::{ChatMessage, Role, SenderId, Turn};
pub use provider::{ChatRequest, ChatResponse, GenerateRequest, GenerateResponse, Provider, StreamChunk};
pub use transport::{InboundEnvelope, MessageKind, TextMessage, Transport};

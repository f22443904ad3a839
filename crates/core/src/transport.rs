//! Transport trait: the abstraction over the radio link.
//!
//! A Transport delivers inbound packets as [`InboundEnvelope`]s and sends
//! text frames back out on a channel. It knows nothing about sessions or
//! models; the relay decides what to send.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{EnvelopeError, TransportError};
use crate::message::SenderId;

/// Port number string the radio firmware uses for plain text messages.
pub const TEXT_MESSAGE_PORTNUM: &str = "TEXT_MESSAGE_APP";

/// What kind of application payload a packet carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    TextMessage,
    /// Position reports, telemetry, routing and anything else we ignore
    Other(String),
}

impl MessageKind {
    pub fn from_portnum(portnum: &str) -> Self {
        if portnum == TEXT_MESSAGE_PORTNUM {
            MessageKind::TextMessage
        } else {
            MessageKind::Other(portnum.to_string())
        }
    }
}

/// An inbound packet as handed over by the transport.
///
/// Every field is optional on the wire; [`InboundEnvelope::decode`] applies
/// the defaults (channel 0, sender `"unknown"`) and rejects the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundEnvelope {
    pub kind: Option<MessageKind>,
    pub payload: Option<Vec<u8>>,
    pub channel: Option<u32>,
    pub sender: Option<SenderId>,
}

impl InboundEnvelope {
    /// A text packet with every field present. The payload is not checked
    /// here; [`decode`](Self::decode) rejects bytes that are not UTF-8.
    pub fn text(payload: impl Into<Vec<u8>>, channel: u32, sender: &str) -> Self {
        Self {
            kind: Some(MessageKind::TextMessage),
            payload: Some(payload.into()),
            channel: Some(channel),
            sender: Some(SenderId::from(sender)),
        }
    }

    /// Decode into a [`TextMessage`], applying field defaults.
    pub fn decode(self) -> Result<TextMessage, EnvelopeError> {
        match self.kind {
            Some(MessageKind::TextMessage) => {}
            Some(MessageKind::Other(kind)) => return Err(EnvelopeError::NotTextMessage(kind)),
            None => return Err(EnvelopeError::NotTextMessage("<missing>".into())),
        }

        let payload = self.payload.ok_or(EnvelopeError::MissingPayload)?;
        let text =
            String::from_utf8(payload).map_err(|e| EnvelopeError::InvalidUtf8(e.to_string()))?;

        Ok(TextMessage {
            channel: self.channel.unwrap_or(0),
            sender: self.sender.unwrap_or_else(SenderId::unknown),
            text,
        })
    }
}

/// A decoded text message ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub channel: u32,
    pub sender: SenderId,
    pub text: String,
}

/// The core Transport trait.
///
/// Implementations own the link (serial port, TCP bridge, stdio pipe) and
/// the queue of packets that arrive while the relay is busy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable transport name (e.g., "stdio", "serial").
    fn name(&self) -> &str;

    /// Start receiving packets.
    ///
    /// The receiver yields envelopes in arrival order and closes when the
    /// link shuts down. An `Err` item whose error [`is_fatal`] means the link
    /// is gone.
    ///
    /// [`is_fatal`]: TransportError::is_fatal
    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<InboundEnvelope, TransportError>>, TransportError>;

    /// Send one text frame on a channel. Fire-and-forget: `Ok` means the
    /// frame was handed to the link, not that anyone received it.
    async fn send(&self, text: &str, channel: u32) -> Result<(), TransportError>;

    /// Stop the transport gracefully.
    async fn stop(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

//! Error types for the meshbridge domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum so callers can tell an
//! undecodable packet from a failed generation or a dead radio link.
//! The relay wraps all three in its own dispatch error.

use thiserror::Error;

// --- Bounded context errors ---

/// An inbound event could not be turned into a text message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("Not a text message (kind: {0})")]
    NotTextMessage(String),

    #[error("Text message has no payload")]
    MissingPayload,

    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// The generation client failed or returned something unusable.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Model returned an empty reply")]
    EmptyResponse,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// The radio transport failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to send frame on channel {channel}: {reason}")]
    SendFailed { channel: u32, reason: String },

    #[error("Transport connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid inbound payload: {0}")]
    InvalidPayload(String),

    #[error("Transport not started: {0}")]
    NotStarted(String),
}

impl TransportError {
    /// Whether the link itself is gone and nothing further can be sent.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::ConnectionLost(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_error_displays_correctly() {
        let err = GenerationError::Api {
            status_code: 404,
            message: "model 'deepseek-r1:8b' not found".into(),
        };
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("deepseek-r1"));
    }

    #[test]
    fn transport_send_failure_names_channel() {
        let err = TransportError::SendFailed {
            channel: 3,
            reason: "queue full".into(),
        };
        assert!(err.to_string().contains("channel 3"));
        assert!(err.to_string().contains("queue full"));
    }

    #[test]
    fn only_connection_loss_is_fatal() {
        assert!(TransportError::ConnectionLost("serial port closed".into()).is_fatal());
        assert!(!TransportError::SendFailed { channel: 0, reason: "busy".into() }.is_fatal());
        assert!(!TransportError::InvalidPayload("not json".into()).is_fatal());
    }
}

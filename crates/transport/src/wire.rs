//! JSON line format shared with the radio bridge process.
//!
//! Inbound, one packet per line. Both the flat form
//!
//! ```text
//! {"portnum": "TEXT_MESSAGE_APP", "payload": "hi", "channel": 1, "from": "!a1b2c3d4"}
//! ```
//!
//! and the nested form the radio library emits
//!
//! ```text
//! {"decoded": {"portnum": "TEXT_MESSAGE_APP", "payload": [104, 105]}, "channel": 1, "from": 2712847316}
//! ```
//!
//! are accepted. Outbound, one frame per line: `{"channel": 1, "text": "..."}`.

use meshbridge_core::error::TransportError;
use meshbridge_core::message::SenderId;
use meshbridge_core::transport::{InboundEnvelope, MessageKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct WirePacket {
    #[serde(default)]
    decoded: Option<WireDecoded>,
    #[serde(default)]
    portnum: Option<String>,
    #[serde(default)]
    payload: Option<WirePayload>,
    #[serde(default)]
    channel: Option<u32>,
    #[serde(default)]
    from: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireDecoded {
    #[serde(default)]
    portnum: Option<String>,
    #[serde(default)]
    payload: Option<WirePayload>,
}

/// Text payloads arrive either as a JSON string or as raw bytes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePayload {
    Text(String),
    Bytes(Vec<u8>),
}

impl WirePayload {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            WirePayload::Text(s) => s.into_bytes(),
            WirePayload::Bytes(b) => b,
        }
    }
}

/// A reply frame as written to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub channel: u32,
    pub text: String,
}

/// Parse one inbound line into an envelope.
///
/// Only the JSON structure is checked here; whether the packet is a usable
/// text message is decided by [`InboundEnvelope::decode`].
pub fn parse_line(line: &str) -> Result<InboundEnvelope, TransportError> {
    let packet: WirePacket = serde_json::from_str(line)
        .map_err(|e| TransportError::InvalidPayload(format!("{e}: {}", preview(line))))?;

    let (portnum, payload) = match packet.decoded {
        Some(decoded) => (decoded.portnum, decoded.payload),
        None => (packet.portnum, packet.payload),
    };

    Ok(InboundEnvelope {
        kind: portnum.as_deref().map(MessageKind::from_portnum),
        payload: payload.map(WirePayload::into_bytes),
        channel: packet.channel,
        sender: packet.from.and_then(sender_from_value),
    })
}

/// Node ids come as `"!a1b2c3d4"` strings or as bare node numbers.
fn sender_from_value(value: serde_json::Value) -> Option<SenderId> {
    match value {
        serde_json::Value::String(s) => Some(s.into()),
        serde_json::Value::Number(n) => Some(n.to_string().into()),
        _ => None,
    }
}

fn preview(line: &str) -> String {
    const MAX: usize = 60;
    if line.chars().count() > MAX {
        let cut: String = line.chars().take(MAX).collect();
        format!("{cut}...")
    } else {
        line.to_string()
    }
}

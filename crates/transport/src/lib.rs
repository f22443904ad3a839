//! Radio link transports for meshbridge.
//!
//! A transport turns whatever the radio side speaks into
//! [`InboundEnvelope`](meshbridge_core::transport::InboundEnvelope)s and
//! writes reply frames back out.
//!
//! Available transports:
//! - **Stdio**: line-delimited packets on stdin, frames on stdout. Pair it
//!   with a bridge process that owns the serial or TCP link to the radio.

pub mod stdio;
pub mod wire;

pub use stdio::StdioTransport;
pub use wire::{OutboundFrame, parse_line};

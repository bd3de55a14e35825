//! JSON frames exchanged over the socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame received from the server: `{op, d, s?, t?}`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct InboundFrame {
    /// Opcode.
    pub op: u8,
    /// Payload.
    #[serde(default)]
    pub d: Value,
    /// Sequence number (`seq` on the media channel).
    #[serde(default, alias = "seq")]
    pub s: Option<u64>,
    /// Event name, for dispatches.
    #[serde(default)]
    pub t: Option<String>,
}

impl InboundFrame {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A frame sent to the server: `{op, d}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutboundFrame {
    /// Opcode.
    pub op: u8,
    /// Payload.
    pub d: Value,
}

impl OutboundFrame {
    /// Build a frame.
    pub fn new(op: u8, d: Value) -> Self {
        Self { op, d }
    }

    /// Encode as JSON text.
    pub fn to_json(&self) -> String {
        // {op: u8, d: Value} cannot fail to serialize
        serde_json::to_string(self).unwrap_or_default()
    }
}

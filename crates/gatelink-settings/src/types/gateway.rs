//! Real-time session settings for both channel variants.

use serde::{Deserialize, Serialize};

/// Default wait before a cold connect, in milliseconds.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 5000;
/// Default cap on the socket handshake, in milliseconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 15_000;

/// Control-plane session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewaySettings {
    /// Socket URL, including version and encoding query parameters.
    pub url: String,
    /// Wait before a cold connect.
    pub settle_delay_ms: u64,
    /// Cap on the socket handshake.
    pub handshake_timeout_ms: u64,
    /// Capability flags sent with identify.
    pub intents: u64,
    /// Member count above which the server omits offline members.
    pub large_threshold: u32,
    /// Client name reported in the identify properties.
    pub client_name: String,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            url: "wss://gateway.discord.gg/?v=10&encoding=json".to_string(),
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            intents: 0,
            large_threshold: 50,
            client_name: "gatelink".to_string(),
        }
    }
}

/// Media-signaling session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MediaSettings {
    /// Signaling protocol version appended to the endpoint URL.
    pub version: u8,
    /// Wait before a cold connect.
    pub settle_delay_ms: u64,
    /// Cap on the socket handshake.
    pub handshake_timeout_ms: u64,
    /// Transport protocol announced in the select-protocol step.
    pub transport: String,
    /// Encryption mode announced in the select-protocol step.
    pub mode: String,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            version: 8,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            handshake_timeout_ms: DEFAULT_HANDSHAKE_TIMEOUT_MS,
            transport: "udp".to_string(),
            mode: "aead_xchacha20_poly1305_rtpsize".to_string(),
        }
    }
}

//! Request engine settings.

use serde::{Deserialize, Serialize};

/// Default per-attempt timeout in milliseconds.
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 5000;
/// Default bound on rate-limited attempts per call.
pub const DEFAULT_RETRY_COUNT: u32 = 5;

/// Settings consumed by the rate-limited request engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RestSettings {
    /// Base URL that routes are appended to.
    pub base_url: String,
    /// Value of the `Authorization` header, passed through verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    /// Timeout for a single attempt in milliseconds.
    pub connection_timeout_ms: u64,
    /// Maximum attempts when the server keeps answering 429.
    pub retry_count: u32,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            base_url: "https://discord.com/api/v10".to_string(),
            authorization: None,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            retry_count: DEFAULT_RETRY_COUNT,
            user_agent: concat!("gatelink (https://github.com/gatelink/gatelink, ", env!("CARGO_PKG_VERSION"), ")").to_string(),
        }
    }
}

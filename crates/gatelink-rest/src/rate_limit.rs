//! The 429 payload and the hook that reports it.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Body the server sends with a 429 response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPayload {
    /// Human-readable reason.
    #[serde(default)]
    pub message: String,
    /// Seconds to wait before retrying.
    pub retry_after: f64,
    /// Whether the limit applies to every route.
    #[serde(default)]
    pub global: bool,
}

impl RateLimitPayload {
    /// Parse a 429 body. Returns `None` for empty, malformed or nonsensical
    /// payloads (negative or non-finite `retry_after`).
    pub fn parse(body: &[u8]) -> Option<Self> {
        if body.is_empty() {
            return None;
        }
        let payload: Self = serde_json::from_slice(body).ok()?;
        (payload.retry_after.is_finite() && payload.retry_after >= 0.0).then_some(payload)
    }

    /// Wait in whole milliseconds, rounded up.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn retry_after_ms(&self) -> u64 {
        (self.retry_after * 1000.0).ceil() as u64
    }

    /// Wait as a [`Duration`].
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_after_ms())
    }
}

/// One observed rate limit, reported before the engine decides to wait or
/// give up.
#[derive(Clone, Debug)]
pub struct RateLimitEvent {
    /// The parsed payload.
    pub payload: RateLimitPayload,
    /// 1-based attempt that was rate limited.
    pub attempt: u32,
    /// Route of the rate-limited call.
    pub route: String,
}

/// Callback invoked synchronously for every 429.
pub type RateLimitObserver = Arc<dyn Fn(&RateLimitEvent) + Send + Sync>;

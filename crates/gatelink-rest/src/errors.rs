//! Request engine error types.

use serde_json::Value;

use crate::rate_limit::RateLimitPayload;
use crate::transport::TransportError;

/// Errors returned by [`RestClient::execute`](crate::RestClient::execute).
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// No usable HTTP response (timeout, connection, framing).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Non-success status other than a retryable 429.
    #[error("HTTP {status}")]
    Http {
        /// Response status code.
        status: u16,
        /// Parsed JSON body, or the raw text as a JSON string.
        body: Option<Value>,
    },

    /// Still rate limited after the last permitted attempt.
    #[error("rate limited after {attempts} attempts (retry after {}s)", payload.retry_after)]
    RateLimited {
        /// The last payload received.
        payload: RateLimitPayload,
        /// Attempts made.
        attempts: u32,
    },

    /// A 2xx body did not match the expected type.
    #[error("failed to decode {status} response: {source}")]
    Decode {
        /// Response status code.
        status: u16,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The request body could not be serialized.
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// A configured header value is not valid HTTP.
    #[error("invalid header {name}: {message}")]
    InvalidHeader {
        /// Header name.
        name: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}

impl RestError {
    /// HTTP status when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Decode { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::Transport(_) | Self::Encode(_) | Self::InvalidHeader { .. } => None,
        }
    }

    /// Error category string for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(e) => e.category(),
            Self::Http { status, .. } if *status < 500 => "client",
            Self::Http { .. } => "server",
            Self::RateLimited { .. } => "rate_limit",
            Self::Decode { .. } => "decode",
            Self::Encode(_) | Self::InvalidHeader { .. } => "request",
        }
    }
}

/// Convenience alias for request engine results.
pub type RestResult<T> = Result<T, RestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_category() {
        let err = RestError::Http {
            status: 404,
            body: None,
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.category(), "client");

        let err = RestError::Http {
            status: 502,
            body: None,
        };
        assert_eq!(err.category(), "server");

        let err = RestError::from(TransportError::Timeout { timeout_ms: 10 });
        assert_eq!(err.status(), None);
        assert_eq!(err.category(), "timeout");
    }

    #[test]
    fn rate_limited_display_includes_wait() {
        let err = RestError::RateLimited {
            payload: RateLimitPayload {
                message: String::new(),
                retry_after: 0.5,
                global: false,
            },
            attempts: 3,
        };
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.to_string(), "rate limited after 3 attempts (retry after 0.5s)");
    }
}

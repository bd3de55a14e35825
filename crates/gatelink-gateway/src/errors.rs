//! Session engine error types.

/// Errors surfaced by [`GatewaySession`](crate::GatewaySession).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// No established session to send on.
    #[error("session is not connected")]
    NotConnected,

    /// The socket could not be opened.
    #[error("failed to connect to {url}: {message}")]
    Connect {
        /// Target URL.
        url: String,
        /// Underlying error.
        message: String,
    },

    /// The socket handshake did not finish in time.
    #[error("handshake with {url} timed out after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Target URL.
        url: String,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The server closed with a code that forbids reconnecting.
    #[error("closed with fatal code {code}: {reason}")]
    FatalClose {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

impl GatewayError {
    /// Error category string for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotConnected => "state",
            Self::Connect { .. } | Self::HandshakeTimeout { .. } => "connect",
            Self::FatalClose { .. } => "close",
        }
    }
}

/// Convenience alias for session engine results.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = GatewayError::HandshakeTimeout {
            url: "wss://x".into(),
            timeout_ms: 15_000,
        };
        assert_eq!(err.to_string(), "handshake with wss://x timed out after 15000ms");
        assert_eq!(err.category(), "connect");
        assert_eq!(GatewayError::NotConnected.category(), "state");
    }
}

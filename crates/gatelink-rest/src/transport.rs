//! Transport request primitive.
//!
//! [`Transport::send`] performs exactly one HTTP round trip and resolves with
//! the status code and the complete body. The body is accumulated chunk by
//! chunk; a connection that ends before the declared `Content-Length` is a
//! [`TransportError::Protocol`], never a short successful body. Retries are
//! the caller's business.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::Method;
use reqwest::header::HeaderMap;
use tracing::trace;

/// Cap on the up-front body allocation taken from `Content-Length`.
const MAX_PREALLOCATE: usize = 1 << 20;

/// One outbound HTTP request.
#[derive(Clone, Debug)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute target URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Encoded request body, if any.
    pub body: Option<Bytes>,
    /// Cap on the whole round trip, body included.
    pub timeout: Duration,
}

/// A fully received HTTP response.
#[derive(Clone, Debug)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Complete response body.
    pub body: Bytes,
}

/// Transport-level failure (no usable HTTP response).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The round trip did not finish within the timeout.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The connection could not be established or was reset.
    #[error("connection error: {message}")]
    Connection {
        /// Error description.
        message: String,
    },

    /// The peer violated HTTP framing (including a truncated body).
    #[error("protocol error: {message}")]
    Protocol {
        /// Error description.
        message: String,
    },
}

impl TransportError {
    /// Error category string for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "timeout",
            Self::Connection { .. } => "connection",
            Self::Protocol { .. } => "protocol",
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_reqwest(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }
        } else if err.is_body() || err.is_decode() || err.is_builder() {
            Self::Protocol {
                message: error_chain(err),
            }
        } else {
            Self::Connection {
                message: error_chain(err),
            }
        }
    }
}

/// Render an error with its sources, since reqwest keeps the useful part
/// (reset, refused, incomplete message) in the chain.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// Performs single HTTP round trips.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and collect the full response.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest` connection pool.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a fresh client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport around an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let timeout = request.timeout;
        let is_head = request.method == Method::HEAD;

        let mut builder = self
            .client
            .request(request.method, &request.url)
            .headers(request.headers)
            .timeout(timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e, timeout))?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let expected = if is_head { None } else { response.content_length() };

        let capacity = expected
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(0)
            .min(MAX_PREALLOCATE);
        let mut body = BytesMut::with_capacity(capacity);
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| TransportError::from_reqwest(&e, timeout))?;
            trace!(len = chunk.len(), "received body chunk");
            body.extend_from_slice(&chunk);
        }

        if let Some(expected) = expected {
            let received = body.len() as u64;
            if received != expected {
                return Err(TransportError::Protocol {
                    message: format!("body ended after {received} of {expected} bytes"),
                });
            }
        }

        Ok(TransportResponse {
            status,
            headers,
            body: body.freeze(),
        })
    }
}

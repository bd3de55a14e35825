//! Rate-limited request engine.
//!
//! [`RestClient::execute`] wraps the [`Transport`] primitive with credential
//! headers, body encoding and 429 handling. A 429 with a usable payload is
//! reported to the observer and, while attempts remain, waited out for
//! exactly the server's `retry_after` before the same request is sent again.
//! Everything else (other statuses, transport failures) ends the call on the
//! first attempt.

use std::sync::Arc;
use std::time::Duration;

use gatelink_settings::RestSettings;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::body::RequestBody;
use crate::errors::{RestError, RestResult};
use crate::rate_limit::{RateLimitEvent, RateLimitObserver, RateLimitPayload};
use crate::transport::{ReqwestTransport, Transport, TransportRequest, TransportResponse};

const AUDIT_LOG_REASON: HeaderName = HeaderName::from_static("x-audit-log-reason");
const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Request engine configuration.
#[derive(Clone)]
pub struct RestOptions {
    /// Base URL that relative routes are appended to.
    pub base_url: String,
    /// `Authorization` header value, passed through verbatim.
    pub authorization: Option<String>,
    /// Timeout for each attempt.
    pub connection_timeout: Duration,
    /// Maximum attempts while the server answers 429.
    pub retry_count: u32,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Called for every 429 with a usable payload.
    pub rate_limit_observer: Option<RateLimitObserver>,
}

impl RestOptions {
    /// Build options from loaded settings.
    pub fn from_settings(settings: &RestSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            authorization: settings.authorization.clone(),
            connection_timeout: Duration::from_millis(settings.connection_timeout_ms),
            retry_count: settings.retry_count.max(1),
            user_agent: settings.user_agent.clone(),
            rate_limit_observer: None,
        }
    }

    /// Set the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the credential header value.
    #[must_use]
    pub fn with_authorization(mut self, authorization: impl Into<String>) -> Self {
        self.authorization = Some(authorization.into());
        self
    }

    /// Set the attempt bound (clamped to at least one).
    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count.max(1);
        self
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Install a rate-limit observer.
    #[must_use]
    pub fn with_observer(mut self, observer: impl Fn(&RateLimitEvent) + Send + Sync + 'static) -> Self {
        self.rate_limit_observer = Some(Arc::new(observer));
        self
    }
}

impl Default for RestOptions {
    fn default() -> Self {
        Self::from_settings(&RestSettings::default())
    }
}

impl std::fmt::Debug for RestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestOptions")
            .field("base_url", &self.base_url)
            .field("authorization", &self.authorization.as_ref().map(|_| "<redacted>"))
            .field("connection_timeout", &self.connection_timeout)
            .field("retry_count", &self.retry_count)
            .field("user_agent", &self.user_agent)
            .field("rate_limit_observer", &self.rate_limit_observer.is_some())
            .finish()
    }
}

/// Per-call extras.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    /// Reason recorded in the server's audit log.
    pub audit_reason: Option<String>,
}

/// The rate-limited request engine.
#[derive(Clone)]
pub struct RestClient {
    options: RestOptions,
    transport: Arc<dyn Transport>,
}

impl RestClient {
    /// Create a client on the default `reqwest` transport.
    pub fn new(options: RestOptions) -> Self {
        Self::with_transport(options, Arc::new(ReqwestTransport::new()))
    }

    /// Create a client on a custom transport.
    pub fn with_transport(options: RestOptions, transport: Arc<dyn Transport>) -> Self {
        Self { options, transport }
    }

    /// Current configuration.
    pub fn options(&self) -> &RestOptions {
        &self.options
    }

    /// Perform one logical call and parse a 2xx body as `T`.
    ///
    /// `route` is appended to the base URL unless it is already absolute.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        method: Method,
        route: &str,
        body: impl Into<RequestBody>,
    ) -> RestResult<T> {
        self.execute_with(method, route, body, &CallOptions::default())
            .await
    }

    /// [`execute`](Self::execute) with per-call extras.
    pub async fn execute_with<T: DeserializeOwned>(
        &self,
        method: Method,
        route: &str,
        body: impl Into<RequestBody>,
        call: &CallOptions,
    ) -> RestResult<T> {
        let body = body.into();
        let headers = self.headers(&body, call)?;
        let encoded = body.encode().map_err(RestError::Encode)?;
        let url = join_url(&self.options.base_url, route);
        let max_attempts = self.options.retry_count.max(1);

        let mut attempt = 1;
        loop {
            let request = TransportRequest {
                method: method.clone(),
                url: url.clone(),
                headers: headers.clone(),
                body: encoded.clone(),
                timeout: self.options.connection_timeout,
            };

            debug!(%method, route, attempt, "sending request");
            let response = self.transport.send(request).await.inspect_err(|e| {
                debug!(%method, route, attempt, category = e.category(), error = %e, "transport failure");
            })?;

            if (200..300).contains(&response.status) {
                return parse_success(&response);
            }

            if response.status != STATUS_TOO_MANY_REQUESTS {
                return Err(http_error(&response));
            }

            let Some(payload) = RateLimitPayload::parse(&response.body) else {
                warn!(route, attempt, "429 without a usable rate limit payload");
                return Err(http_error(&response));
            };

            if let Some(observer) = &self.options.rate_limit_observer {
                observer(&RateLimitEvent {
                    payload: payload.clone(),
                    attempt,
                    route: route.to_string(),
                });
            }

            if attempt >= max_attempts {
                warn!(route, attempts = attempt, global = payload.global, "rate limit retries exhausted");
                return Err(RestError::RateLimited {
                    payload,
                    attempts: attempt,
                });
            }

            let delay = payload.retry_delay();
            warn!(
                route,
                attempt,
                global = payload.global,
                delay_ms = payload.retry_after_ms(),
                "rate limited, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn headers(&self, body: &RequestBody, call: &CallOptions) -> RestResult<HeaderMap> {
        let mut headers = HeaderMap::new();

        let _ = headers.insert(USER_AGENT, header_value("User-Agent", &self.options.user_agent)?);

        if let Some(auth) = &self.options.authorization {
            let mut value = header_value("Authorization", auth)?;
            value.set_sensitive(true);
            let _ = headers.insert(AUTHORIZATION, value);
        }

        if let Some(content_type) = body.content_type() {
            let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }

        if let Some(reason) = &call.audit_reason {
            let encoded = utf8_percent_encode(reason, NON_ALPHANUMERIC).to_string();
            let _ = headers.insert(AUDIT_LOG_REASON, header_value("X-Audit-Log-Reason", &encoded)?);
        }

        Ok(headers)
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn header_value(name: &'static str, value: &str) -> RestResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| RestError::InvalidHeader {
        name,
        message: e.to_string(),
    })
}

/// Append `route` to `base`, unless `route` is already an absolute URL.
fn join_url(base: &str, route: &str) -> String {
    if route.starts_with("http://") || route.starts_with("https://") {
        return route.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        route.trim_start_matches('/')
    )
}

fn parse_success<T: DeserializeOwned>(response: &TransportResponse) -> RestResult<T> {
    let body: &[u8] = if response.body.is_empty() {
        b"null"
    } else {
        &response.body
    };
    serde_json::from_slice(body).map_err(|source| RestError::Decode {
        status: response.status,
        source,
    })
}

fn http_error(response: &TransportResponse) -> RestError {
    RestError::Http {
        status: response.status,
        body: error_body(&response.body),
    }
}

/// JSON error bodies are parsed; anything else is kept as text.
fn error_body(body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice(body)
        .ok()
        .or_else(|| Some(Value::String(String::from_utf8_lossy(body).into_owned())))
}

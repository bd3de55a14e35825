//! # gatelink-rest
//!
//! The REST half of the gatelink client:
//!
//! - [`transport`]: one HTTP round trip, full body collected, no retries
//! - [`client`]: the rate-limited request engine built on top of it
//! - [`rate_limit`]: the 429 payload and the observer hook
//! - [`body`]: request body encoding (JSON / form / none)
//!
//! Endpoint helpers live outside this crate; they hand [`RestClient::execute`]
//! an HTTP method, an opaque route string and a [`RequestBody`].

#![deny(unsafe_code)]

pub mod body;
pub mod client;
pub mod errors;
pub mod rate_limit;
pub mod transport;

pub use body::RequestBody;
pub use client::{CallOptions, RestClient, RestOptions};
pub use errors::{RestError, RestResult};
pub use rate_limit::{RateLimitEvent, RateLimitObserver, RateLimitPayload};
pub use reqwest::Method;
pub use transport::{ReqwestTransport, Transport, TransportError, TransportRequest, TransportResponse};

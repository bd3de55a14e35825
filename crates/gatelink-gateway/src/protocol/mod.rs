//! Channel vocabularies.
//!
//! A [`Protocol`] builds the outbound handshake and heartbeat frames for its
//! channel and turns inbound frames into [`Inbound`] instructions for the
//! driver. It holds no connection state.

pub mod control;
pub mod media;

use std::time::Duration;

use serde_json::Value;

use crate::close_code::CloseCodeSets;
use crate::frame::{InboundFrame, OutboundFrame};

/// Resume identity issued by the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResumeInfo {
    /// Token to present when resuming.
    pub token: String,
    /// Endpoint to resume against, when the server names one.
    pub url: Option<String>,
}

/// Session milestone reached by an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Milestone {
    /// An ordinary event.
    None,
    /// A new session is established.
    Ready,
    /// A previous session was resumed.
    Resumed,
}

/// What the driver should do with an inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// Handshake opener carrying the heartbeat interval.
    Hello {
        /// Interval between heartbeats.
        heartbeat_interval: Duration,
    },
    /// A named event for listeners.
    Event {
        /// Event name.
        name: String,
        /// Event payload.
        data: Value,
        /// Resume identity carried by the event.
        resume: Option<ResumeInfo>,
        /// Milestone reached, if any.
        milestone: Milestone,
        /// Frame to send back right away.
        reply: Option<OutboundFrame>,
    },
    /// The server acknowledged a heartbeat.
    HeartbeatAck,
    /// The server wants a heartbeat now.
    HeartbeatRequest,
    /// The server rejected the session.
    InvalidSession {
        /// Whether the session may be resumed.
        resumable: bool,
    },
    /// The server asked the client to reconnect.
    Reconnect,
    /// Nothing to do.
    Ignored,
}

impl Inbound {
    /// A plain event with no side effects.
    pub fn event(name: impl Into<String>, data: Value) -> Self {
        Self::Event {
            name: name.into(),
            data,
            resume: None,
            milestone: Milestone::None,
            reply: None,
        }
    }
}

/// One channel's wire vocabulary.
pub trait Protocol: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Close-code classification for this channel.
    fn close_codes(&self) -> &'static CloseCodeSets;

    /// Frame that starts a new session.
    fn identify(&self) -> OutboundFrame;

    /// Frame that continues a previous session.
    fn resume(&self, token: &str, sequence: Option<u64>) -> OutboundFrame;

    /// Heartbeat frame carrying the last sequence seen.
    fn heartbeat(&self, sequence: Option<u64>) -> OutboundFrame;

    /// Interpret an inbound frame.
    fn classify(&self, frame: &InboundFrame) -> Inbound;
}

/// Heartbeat interval from a hello payload, in (possibly fractional)
/// milliseconds. Zero, negative and missing values are rejected.
pub(crate) fn hello_interval(d: &Value) -> Option<Duration> {
    let ms = d.get("heartbeat_interval")?.as_f64()?;
    (ms.is_finite() && ms > 0.0).then(|| Duration::from_secs_f64(ms / 1000.0))
}

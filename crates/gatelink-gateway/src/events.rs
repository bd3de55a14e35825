//! Events published by a session.

use serde_json::Value;

use gatelink_core::Event;

use crate::close_code::CloseClass;
use crate::errors::GatewayError;
use crate::frame::InboundFrame;
use crate::state::SessionState;

/// Everything a [`GatewaySession`](crate::GatewaySession) reports.
///
/// Listen on [`SessionEvent::kind`] strings: `state`, `raw`, `ready`,
/// `resumed`, `warn`, `error`, `fatal`, `close`, or a server event name
/// (`MESSAGE_CREATE`, `SPEAKING`, ...).
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// The lifecycle state changed.
    State {
        /// Previous state.
        from: SessionState,
        /// New state.
        to: SessionState,
    },
    /// Every decoded inbound frame, before it is acted on.
    Raw(InboundFrame),
    /// A named server event.
    Dispatch {
        /// Event name as sent by the server.
        name: String,
        /// Event payload.
        data: Value,
    },
    /// A new session was established.
    Ready {
        /// Payload of the establishing event.
        data: Value,
    },
    /// A previous session was resumed.
    Resumed,
    /// Recoverable trouble the engine is handling itself.
    Warn {
        /// What happened.
        message: String,
    },
    /// A socket error. Recovery follows as an abnormal closure.
    Error {
        /// What happened.
        message: String,
    },
    /// The session stopped and will not reconnect.
    Fatal(SessionFailure),
    /// The server closed the connection.
    Close {
        /// Close code (1006 when the socket ended without one).
        code: u16,
        /// Close reason.
        reason: String,
        /// Recovery strategy chosen for `code`.
        class: CloseClass,
    },
}

/// Shareable description of a fatal failure.
#[derive(Clone, Debug)]
pub struct SessionFailure {
    /// Error category.
    pub category: &'static str,
    /// Close code, when the failure was a close.
    pub code: Option<u16>,
    /// Rendered error.
    pub message: String,
}

impl From<&GatewayError> for SessionFailure {
    fn from(err: &GatewayError) -> Self {
        Self {
            category: err.category(),
            code: match err {
                GatewayError::FatalClose { code, .. } => Some(*code),
                _ => None,
            },
            message: err.to_string(),
        }
    }
}

impl Event for SessionEvent {
    fn kind(&self) -> &str {
        match self {
            Self::State { .. } => "state",
            Self::Raw(_) => "raw",
            Self::Dispatch { name, .. } => name,
            Self::Ready { .. } => "ready",
            Self::Resumed => "resumed",
            Self::Warn { .. } => "warn",
            Self::Error { .. } => "error",
            Self::Fatal(_) => "fatal",
            Self::Close { .. } => "close",
        }
    }
}

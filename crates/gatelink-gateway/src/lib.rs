//! # gatelink-gateway
//!
//! A resumable, heartbeat-driven session over a WebSocket.
//!
//! One generic engine, [`GatewaySession`], owns the connection lifecycle:
//! handshake, heartbeat liveness, sequence tracking, close-code
//! classification and automatic reconnects (resumed where the server allows
//! it). The wire vocabulary is supplied by a [`Protocol`]:
//!
//! - [`ControlProtocol`]: the control-plane channel (dispatch events,
//!   presence, voice state)
//! - [`MediaProtocol`]: the media-signaling channel (select protocol,
//!   session description, speaking)
//!
//! Everything the session observes is published on its
//! [`EventBus`](gatelink_core::EventBus) as a [`SessionEvent`].

#![deny(unsafe_code)]

pub mod close_code;
mod driver;
pub mod errors;
pub mod events;
pub mod frame;
pub mod protocol;
pub mod session;
pub mod state;

pub use close_code::{CloseClass, CloseCodeSets};
pub use errors::{GatewayError, Result};
pub use events::{SessionEvent, SessionFailure};
pub use frame::{InboundFrame, OutboundFrame};
pub use protocol::control::ControlProtocol;
pub use protocol::media::{MediaCredentials, MediaProtocol, ProtocolSelection};
pub use protocol::{Inbound, Milestone, Protocol, ResumeInfo};
pub use session::{GatewaySession, SessionConfig};
pub use state::{ConnectMode, Handshake, HeartbeatAction, Session, SessionState};

//! Media-signaling channel (version 8).
//!
//! The session is only established once the server answers the
//! select-protocol step with a session description. The resume token of this
//! channel is the session id handed over by the control plane, so it is known
//! from the first ready onwards.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value, json};
use tracing::warn;

use gatelink_settings::MediaSettings;

use super::{Inbound, Milestone, Protocol, ResumeInfo, hello_interval};
use crate::close_code::CloseCodeSets;
use crate::frame::{InboundFrame, OutboundFrame};

/// Media-signaling opcodes.
pub mod op {
    /// Start a new session (send).
    pub const IDENTIFY: u8 = 0;
    /// Choose transport and encryption (send).
    pub const SELECT_PROTOCOL: u8 = 1;
    /// Transport parameters (receive).
    pub const READY: u8 = 2;
    /// Heartbeat (send).
    pub const HEARTBEAT: u8 = 3;
    /// Negotiated encryption key and mode (receive).
    pub const SESSION_DESCRIPTION: u8 = 4;
    /// Speaking state (send and receive).
    pub const SPEAKING: u8 = 5;
    /// Heartbeat acknowledged (receive).
    pub const HEARTBEAT_ACK: u8 = 6;
    /// Continue a previous session (send).
    pub const RESUME: u8 = 7;
    /// Handshake opener (receive).
    pub const HELLO: u8 = 8;
    /// Session resumed (receive).
    pub const RESUMED: u8 = 9;
    /// Other participants connected (receive).
    pub const CLIENTS_CONNECT: u8 = 11;
    /// A participant left (receive).
    pub const CLIENT_DISCONNECT: u8 = 13;
}

/// Credentials handed over by the control plane's voice events.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaCredentials {
    /// Guild (or channel) the media server serves.
    pub server_id: String,
    /// The connecting user.
    pub user_id: String,
    /// Session id from the voice state update.
    pub session_id: String,
    /// Token from the voice server update.
    pub token: String,
}

/// Transport choice announced in the select-protocol step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtocolSelection {
    /// Transport protocol name.
    pub protocol: String,
    /// External address of the media socket. Falls back to the server's
    /// address from ready when unset.
    pub address: Option<String>,
    /// External port of the media socket. Falls back like `address`.
    pub port: Option<u16>,
    /// Encryption mode.
    pub mode: String,
}

impl ProtocolSelection {
    /// Selection from settings, with the address left to discovery.
    pub fn from_settings(settings: &MediaSettings) -> Self {
        Self {
            protocol: settings.transport.clone(),
            address: None,
            port: None,
            mode: settings.mode.clone(),
        }
    }
}

/// Media-signaling vocabulary.
#[derive(Clone, Debug)]
pub struct MediaProtocol {
    credentials: MediaCredentials,
    selection: ProtocolSelection,
}

impl MediaProtocol {
    /// Protocol for one media session.
    pub fn new(credentials: MediaCredentials, selection: ProtocolSelection) -> Self {
        Self {
            credentials,
            selection,
        }
    }

    /// Credentials in use.
    pub fn credentials(&self) -> &MediaCredentials {
        &self.credentials
    }

    /// Speaking state frame.
    pub fn speaking(flags: u32, delay: u32, ssrc: u32) -> OutboundFrame {
        OutboundFrame::new(
            op::SPEAKING,
            json!({
                "speaking": flags,
                "delay": delay,
                "ssrc": ssrc,
            }),
        )
    }

    fn select_protocol(&self, ready: &Value) -> OutboundFrame {
        let address = self
            .selection
            .address
            .clone()
            .or_else(|| ready["ip"].as_str().map(str::to_string));
        let port = self
            .selection
            .port
            .map(u64::from)
            .or_else(|| ready["port"].as_u64());
        OutboundFrame::new(
            op::SELECT_PROTOCOL,
            json!({
                "protocol": self.selection.protocol,
                "data": {
                    "address": address,
                    "port": port,
                    "mode": self.selection.mode,
                },
            }),
        )
    }
}

fn event_name(opcode: u8) -> Option<&'static str> {
    Some(match opcode {
        op::READY => "READY",
        op::SESSION_DESCRIPTION => "SESSION_DESCRIPTION",
        op::SPEAKING => "SPEAKING",
        op::RESUMED => "RESUMED",
        op::CLIENTS_CONNECT => "CLIENTS_CONNECT",
        op::CLIENT_DISCONNECT => "CLIENT_DISCONNECT",
        _ => return None,
    })
}

/// Milliseconds since the epoch, used as the heartbeat nonce.
#[allow(clippy::cast_possible_truncation)]
fn nonce() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl Protocol for MediaProtocol {
    fn name(&self) -> &'static str {
        "media"
    }

    fn close_codes(&self) -> &'static CloseCodeSets {
        &CloseCodeSets::MEDIA
    }

    fn identify(&self) -> OutboundFrame {
        OutboundFrame::new(
            op::IDENTIFY,
            json!({
                "server_id": self.credentials.server_id,
                "user_id": self.credentials.user_id,
                "session_id": self.credentials.session_id,
                "token": self.credentials.token,
            }),
        )
    }

    fn resume(&self, token: &str, sequence: Option<u64>) -> OutboundFrame {
        let mut d = Map::new();
        let _ = d.insert("server_id".into(), json!(self.credentials.server_id));
        let _ = d.insert("session_id".into(), json!(token));
        let _ = d.insert("token".into(), json!(self.credentials.token));
        if let Some(seq) = sequence {
            let _ = d.insert("seq_ack".into(), json!(seq));
        }
        OutboundFrame::new(op::RESUME, Value::Object(d))
    }

    fn heartbeat(&self, sequence: Option<u64>) -> OutboundFrame {
        let mut d = Map::new();
        let _ = d.insert("t".into(), json!(nonce()));
        if let Some(seq) = sequence {
            let _ = d.insert("seq_ack".into(), json!(seq));
        }
        OutboundFrame::new(op::HEARTBEAT, Value::Object(d))
    }

    fn classify(&self, frame: &InboundFrame) -> Inbound {
        match frame.op {
            op::HELLO => match hello_interval(&frame.d) {
                Some(heartbeat_interval) => Inbound::Hello { heartbeat_interval },
                None => {
                    warn!(payload = %frame.d, "hello without a usable heartbeat interval");
                    Inbound::Ignored
                }
            },
            op::HEARTBEAT_ACK => Inbound::HeartbeatAck,
            op::READY => Inbound::Event {
                name: "READY".into(),
                data: frame.d.clone(),
                resume: Some(ResumeInfo {
                    token: self.credentials.session_id.clone(),
                    url: None,
                }),
                milestone: Milestone::None,
                reply: Some(self.select_protocol(&frame.d)),
            },
            op::SESSION_DESCRIPTION => Inbound::Event {
                name: "SESSION_DESCRIPTION".into(),
                data: frame.d.clone(),
                resume: None,
                milestone: Milestone::Ready,
                reply: None,
            },
            op::RESUMED => Inbound::Event {
                name: "RESUMED".into(),
                data: frame.d.clone(),
                resume: None,
                milestone: Milestone::Resumed,
                reply: None,
            },
            other => match event_name(other) {
                Some(name) => Inbound::event(name, frame.d.clone()),
                None => {
                    tracing::debug!(op = other, "ignoring media opcode");
                    Inbound::Ignored
                }
            },
        }
    }
}

//! Control-plane channel.

use serde_json::{Value, json};
use tracing::warn;

use gatelink_settings::GatewaySettings;

use super::{Inbound, Milestone, Protocol, ResumeInfo, hello_interval};
use crate::close_code::CloseCodeSets;
use crate::frame::{InboundFrame, OutboundFrame};

/// Control-plane opcodes.
pub mod op {
    /// Server event (receive).
    pub const DISPATCH: u8 = 0;
    /// Heartbeat (send), or a request for one (receive).
    pub const HEARTBEAT: u8 = 1;
    /// Start a new session (send).
    pub const IDENTIFY: u8 = 2;
    /// Update presence (send).
    pub const PRESENCE_UPDATE: u8 = 3;
    /// Join, move or leave a voice channel (send).
    pub const VOICE_STATE_UPDATE: u8 = 4;
    /// Continue a previous session (send).
    pub const RESUME: u8 = 6;
    /// Server asks for a reconnect (receive).
    pub const RECONNECT: u8 = 7;
    /// Request guild members (send).
    pub const REQUEST_GUILD_MEMBERS: u8 = 8;
    /// Session rejected (receive).
    pub const INVALID_SESSION: u8 = 9;
    /// Handshake opener (receive).
    pub const HELLO: u8 = 10;
    /// Heartbeat acknowledged (receive).
    pub const HEARTBEAT_ACK: u8 = 11;
}

/// Control-plane vocabulary.
#[derive(Clone, Debug)]
pub struct ControlProtocol {
    token: String,
    intents: u64,
    large_threshold: u32,
    client_name: String,
}

impl ControlProtocol {
    /// Protocol identifying with `token` and capability flags `intents`.
    pub fn new(token: impl Into<String>, intents: u64) -> Self {
        let defaults = GatewaySettings::default();
        Self {
            token: token.into(),
            intents,
            large_threshold: defaults.large_threshold,
            client_name: defaults.client_name,
        }
    }

    /// Protocol configured from settings.
    pub fn from_settings(token: impl Into<String>, settings: &GatewaySettings) -> Self {
        Self {
            token: token.into(),
            intents: settings.intents,
            large_threshold: settings.large_threshold,
            client_name: settings.client_name.clone(),
        }
    }

    /// Capability flags sent with identify.
    pub fn intents(&self) -> u64 {
        self.intents
    }

    /// Presence update frame.
    pub fn presence_update(status: &str, activities: Vec<Value>, afk: bool) -> OutboundFrame {
        OutboundFrame::new(
            op::PRESENCE_UPDATE,
            json!({
                "since": null,
                "activities": activities,
                "status": status,
                "afk": afk,
            }),
        )
    }

    /// Voice state update frame. `channel_id = None` leaves voice.
    pub fn voice_state_update(
        guild_id: &str,
        channel_id: Option<&str>,
        self_mute: bool,
        self_deaf: bool,
    ) -> OutboundFrame {
        OutboundFrame::new(
            op::VOICE_STATE_UPDATE,
            json!({
                "guild_id": guild_id,
                "channel_id": channel_id,
                "self_mute": self_mute,
                "self_deaf": self_deaf,
            }),
        )
    }

    /// Guild member request frame.
    pub fn request_guild_members(guild_id: &str, query: &str, limit: u32) -> OutboundFrame {
        OutboundFrame::new(
            op::REQUEST_GUILD_MEMBERS,
            json!({
                "guild_id": guild_id,
                "query": query,
                "limit": limit,
            }),
        )
    }

    fn dispatch(frame: &InboundFrame) -> Inbound {
        let Some(name) = frame.t.clone() else {
            warn!(op = frame.op, "dispatch without an event name");
            return Inbound::Ignored;
        };
        match name.as_str() {
            "READY" => {
                let resume = frame.d["session_id"].as_str().map(|token| ResumeInfo {
                    token: token.to_string(),
                    url: frame.d["resume_gateway_url"].as_str().map(str::to_string),
                });
                if resume.is_none() {
                    warn!("READY without a session id; the session cannot be resumed");
                }
                Inbound::Event {
                    name,
                    data: frame.d.clone(),
                    resume,
                    milestone: Milestone::Ready,
                    reply: None,
                }
            }
            "RESUMED" => Inbound::Event {
                name,
                data: frame.d.clone(),
                resume: None,
                milestone: Milestone::Resumed,
                reply: None,
            },
            _ => Inbound::event(name, frame.d.clone()),
        }
    }
}

impl Protocol for ControlProtocol {
    fn name(&self) -> &'static str {
        "control"
    }

    fn close_codes(&self) -> &'static CloseCodeSets {
        &CloseCodeSets::CONTROL
    }

    fn identify(&self) -> OutboundFrame {
        OutboundFrame::new(
            op::IDENTIFY,
            json!({
                "token": self.token,
                "intents": self.intents,
                "large_threshold": self.large_threshold,
                "properties": {
                    "os": std::env::consts::OS,
                    "browser": self.client_name,
                    "device": self.client_name,
                },
            }),
        )
    }

    fn resume(&self, token: &str, sequence: Option<u64>) -> OutboundFrame {
        OutboundFrame::new(
            op::RESUME,
            json!({
                "token": self.token,
                "session_id": token,
                "seq": sequence,
            }),
        )
    }

    fn heartbeat(&self, sequence: Option<u64>) -> OutboundFrame {
        OutboundFrame::new(op::HEARTBEAT, json!(sequence))
    }

    fn classify(&self, frame: &InboundFrame) -> Inbound {
        match frame.op {
            op::DISPATCH => Self::dispatch(frame),
            op::HEARTBEAT => Inbound::HeartbeatRequest,
            op::RECONNECT => Inbound::Reconnect,
            op::INVALID_SESSION => Inbound::InvalidSession {
                resumable: frame.d.as_bool().unwrap_or(false),
            },
            op::HELLO => match hello_interval(&frame.d) {
                Some(heartbeat_interval) => Inbound::Hello { heartbeat_interval },
                None => {
                    warn!(payload = %frame.d, "hello without a usable heartbeat interval");
                    Inbound::Ignored
                }
            },
            op::HEARTBEAT_ACK => Inbound::HeartbeatAck,
            other => {
                warn!(op = other, "unexpected control opcode");
                Inbound::Ignored
            }
        }
    }
}

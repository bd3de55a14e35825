//! The session record and its transitions.
//!
//! [`Session`] holds everything that survives a single socket: the resume
//! identity, the sequence high-water mark and the heartbeat bookkeeping.
//! Fields are only changed through the transition methods below, which the
//! driver calls with the record locked. None of them block or await.

use std::fmt;
use std::time::Duration;

use crate::protocol::ResumeInfo;

/// Connection lifecycle state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No driver, or the driver has stopped.
    #[default]
    Disconnected,
    /// Waiting to open the socket, or opening it.
    Connecting,
    /// Socket open, waiting for the server's hello.
    AwaitingHandshake,
    /// Identify or resume sent, waiting for the session to be established.
    Identifying,
    /// Session established.
    Connected,
}

impl SessionState {
    /// Lowercase name for logs and events.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AwaitingHandshake => "awaiting_handshake",
            Self::Identifying => "identifying",
            Self::Connected => "connected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How [`GatewaySession::connect`](crate::GatewaySession::connect) starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectMode {
    /// Forget any previous session, wait the settle delay, then identify.
    Fresh,
    /// Connect immediately and resume the previous session if one is known.
    Resume,
}

/// What to send after hello.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Handshake {
    /// Start a new session.
    Identify,
    /// Continue a previous session.
    Resume {
        /// Resume token issued with the previous ready.
        token: String,
        /// Last sequence seen.
        sequence: Option<u64>,
    },
}

/// Outcome of a heartbeat tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Send a heartbeat carrying this sequence.
    Send(Option<u64>),
    /// The previous heartbeat was never acknowledged.
    Unacknowledged,
}

/// The session record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    state: SessionState,
    resume_token: Option<String>,
    resume_url: Option<String>,
    last_sequence: Option<u64>,
    heartbeat_acknowledged: bool,
    heartbeat_interval: Option<Duration>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            resume_token: None,
            resume_url: None,
            last_sequence: None,
            heartbeat_acknowledged: true,
            heartbeat_interval: None,
        }
    }
}

impl Session {
    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Token that lets a dropped connection continue.
    pub fn resume_token(&self) -> Option<&str> {
        self.resume_token.as_deref()
    }

    /// Endpoint to use for resumed connections.
    pub fn resume_url(&self) -> Option<&str> {
        self.resume_url.as_deref()
    }

    /// Highest sequence seen in this session lineage.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Whether the last heartbeat was acknowledged.
    pub fn heartbeat_acknowledged(&self) -> bool {
        self.heartbeat_acknowledged
    }

    /// Interval the server asked for.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat_interval
    }

    /// Whether a new connection can resume instead of identifying.
    pub fn can_resume(&self) -> bool {
        self.resume_token.is_some()
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// A caller asked to connect.
    pub fn start(&mut self, mode: ConnectMode) {
        if mode == ConnectMode::Fresh {
            self.forget_resume();
        }
        self.clear_connection();
        self.state = SessionState::Connecting;
    }

    /// The socket handshake completed.
    pub fn socket_opened(&mut self) {
        self.state = SessionState::AwaitingHandshake;
    }

    /// Record an inbound sequence number. Older numbers are ignored.
    pub fn observe_sequence(&mut self, sequence: Option<u64>) {
        if let Some(s) = sequence {
            self.last_sequence = Some(self.last_sequence.map_or(s, |last| last.max(s)));
        }
    }

    /// Hello received. `resume` says whether this connection was opened to
    /// resume; it only does so when a token is known.
    pub fn on_hello(&mut self, interval: Duration, resume: bool) -> Handshake {
        self.heartbeat_interval = Some(interval);
        self.heartbeat_acknowledged = true;
        self.state = SessionState::Identifying;
        match (&self.resume_token, resume) {
            (Some(token), true) => Handshake::Resume {
                token: token.clone(),
                sequence: self.last_sequence,
            },
            _ => Handshake::Identify,
        }
    }

    /// Heartbeat timer fired.
    pub fn on_heartbeat_tick(&mut self) -> HeartbeatAction {
        if !self.heartbeat_acknowledged {
            return HeartbeatAction::Unacknowledged;
        }
        self.heartbeat_acknowledged = false;
        HeartbeatAction::Send(self.last_sequence)
    }

    /// The server acknowledged a heartbeat.
    pub fn on_heartbeat_ack(&mut self) {
        self.heartbeat_acknowledged = true;
    }

    /// The server issued a resume identity.
    pub fn capture_resume(&mut self, info: ResumeInfo) {
        self.resume_token = Some(info.token);
        if info.url.is_some() {
            self.resume_url = info.url;
        }
    }

    /// The session is fully established.
    pub fn established(&mut self) {
        self.state = SessionState::Connected;
    }

    /// The connection dropped and a new one will be opened. A non-resumable
    /// drop starts a new lineage.
    pub fn prepare_reconnect(&mut self, resumable: bool) {
        if !resumable {
            self.forget_resume();
        }
        self.clear_connection();
        self.state = SessionState::Connecting;
    }

    /// The driver stopped for good (fatal close or failed connect).
    pub fn stopped(&mut self) {
        self.clear_connection();
        self.state = SessionState::Disconnected;
    }

    /// Caller-initiated disconnect: drop everything.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn forget_resume(&mut self) {
        self.resume_token = None;
        self.resume_url = None;
        self.last_sequence = None;
    }

    fn clear_connection(&mut self) {
        self.heartbeat_acknowledged = true;
        self.heartbeat_interval = None;
    }
}

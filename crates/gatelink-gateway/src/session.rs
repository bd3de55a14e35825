//! The session handle.
//!
//! [`GatewaySession`] is what callers hold. It starts and stops the driver
//! task, queues outbound control frames onto it and exposes the session
//! record and event bus. The driver itself lives in `driver.rs`.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use gatelink_core::EventBus;
use gatelink_settings::{GatewaySettings, MediaSettings};

use crate::close_code::NORMAL_CLOSURE;
use crate::driver::{self, DriverHandle};
use crate::errors::{GatewayError, Result};
use crate::events::{SessionEvent, SessionFailure};
use crate::frame::OutboundFrame;
use crate::protocol::Protocol;
use crate::state::{ConnectMode, Session, SessionState};

/// Where and how a session connects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Socket URL for fresh connections.
    pub url: String,
    /// Wait before a fresh or cold connect.
    pub settle_delay: Duration,
    /// Cap on the socket handshake.
    pub handshake_timeout: Duration,
}

impl SessionConfig {
    /// Config for `url` with default timings.
    pub fn new(url: impl Into<String>) -> Self {
        let defaults = GatewaySettings::default();
        Self {
            url: url.into(),
            settle_delay: Duration::from_millis(defaults.settle_delay_ms),
            handshake_timeout: Duration::from_millis(defaults.handshake_timeout_ms),
        }
    }

    /// Control-plane config from settings.
    pub fn from_gateway(settings: &GatewaySettings) -> Self {
        Self {
            url: settings.url.clone(),
            settle_delay: Duration::from_millis(settings.settle_delay_ms),
            handshake_timeout: Duration::from_millis(settings.handshake_timeout_ms),
        }
    }

    /// Media-signaling config for the `endpoint` announced by the control
    /// plane (`host:port`, or a full URL).
    pub fn from_media(endpoint: &str, settings: &MediaSettings) -> Self {
        let base = if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
            endpoint.to_string()
        } else {
            format!("wss://{endpoint}")
        };
        let url = if base.contains('?') {
            base
        } else {
            format!("{}/?v={}", base.trim_end_matches('/'), settings.version)
        };
        Self {
            url,
            settle_delay: Duration::from_millis(settings.settle_delay_ms),
            handshake_timeout: Duration::from_millis(settings.handshake_timeout_ms),
        }
    }

    /// Set the settle delay.
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the handshake timeout.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// State shared between the handle and the driver task.
pub(crate) struct Shared<P> {
    pub(crate) protocol: P,
    pub(crate) config: SessionConfig,
    session: Mutex<Session>,
    events: EventBus<SessionEvent>,
}

impl<P: Protocol> Shared<P> {
    /// Apply a transition and publish the state change, if any. The record
    /// lock is released before listeners run.
    pub(crate) fn update<R>(&self, transition: impl FnOnce(&mut Session) -> R) -> R {
        let (from, to, result) = {
            let mut session = self.session.lock();
            let from = session.state();
            let result = transition(&mut session);
            (from, session.state(), result)
        };
        if from != to {
            debug!(session = self.protocol.name(), %from, %to, "state changed");
            self.emit(&SessionEvent::State { from, to });
        }
        result
    }

    pub(crate) fn snapshot(&self) -> Session {
        self.session.lock().clone()
    }

    pub(crate) fn emit(&self, event: &SessionEvent) {
        let _ = self.events.emit(event);
    }

    pub(crate) fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(session = self.protocol.name(), "{message}");
        self.emit(&SessionEvent::Warn { message });
    }

    /// Stop for good: log, mark disconnected, publish `fatal`.
    pub(crate) fn fail(&self, err: &GatewayError) {
        error!(session = self.protocol.name(), category = err.category(), error = %err, "session stopped");
        self.update(Session::stopped);
        self.emit(&SessionEvent::Fatal(SessionFailure::from(err)));
    }

    /// URL for the next connection.
    pub(crate) fn connect_url(&self, resume: bool) -> String {
        let session = self.session.lock();
        match (resume, session.resume_url()) {
            (true, Some(url)) => with_query_of(url, &self.config.url),
            _ => self.config.url.clone(),
        }
    }
}

/// Resume URLs come without the version and encoding parameters; borrow them
/// from the configured URL.
fn with_query_of(url: &str, configured: &str) -> String {
    if url.contains('?') {
        return url.to_string();
    }
    match configured.split_once('?') {
        Some((_, query)) => format!("{}/?{query}", url.trim_end_matches('/')),
        None => url.to_string(),
    }
}

/// A resumable real-time session speaking protocol `P`.
///
/// ```ignore
/// let session = GatewaySession::new(ControlProtocol::new(token, intents), SessionConfig::from_gateway(&settings.gateway));
/// let _ = session.events().on("MESSAGE_CREATE", |event| println!("{event:?}"));
/// let _ = session.connect(ConnectMode::Fresh);
/// ```
pub struct GatewaySession<P: Protocol> {
    shared: Arc<Shared<P>>,
    driver: Mutex<Option<DriverHandle>>,
}

impl<P: Protocol> GatewaySession<P> {
    /// Create a disconnected session.
    pub fn new(protocol: P, config: SessionConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                protocol,
                config,
                session: Mutex::new(Session::default()),
                events: EventBus::new(),
            }),
            driver: Mutex::new(None),
        }
    }

    /// Start the driver. Returns `false` (and does nothing) unless the
    /// session is [`SessionState::Disconnected`].
    ///
    /// A driver that stopped on a fatal failure is still winding down while
    /// `fatal` listeners run; calling `connect` from one of them replaces it.
    /// No lock is held while `state` listeners run, so they may query the
    /// session.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, mode: ConnectMode) -> bool {
        let started = self.shared.update(|s| {
            if s.state() == SessionState::Disconnected {
                s.start(mode);
                true
            } else {
                false
            }
        });
        if !started {
            warn!(session = self.shared.protocol.name(), "connect called while a connection is active, ignoring");
            return false;
        }
        info!(session = self.shared.protocol.name(), ?mode, url = %self.shared.config.url, "connecting");
        let handle = driver::spawn(Arc::clone(&self.shared), mode);
        let previous = self.driver.lock().replace(handle);
        if let Some(previous) = previous {
            previous.control.cancel.cancel();
        }
        true
    }

    /// Stop the driver, close the socket with `code` (default 1000) and
    /// reset the session record. Never followed by a reconnect.
    pub async fn disconnect(&self, code: Option<u16>) {
        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            let code = code.unwrap_or(NORMAL_CLOSURE);
            info!(session = self.shared.protocol.name(), code, "disconnecting");
            handle.control.close_code.store(code, Ordering::Relaxed);
            handle.control.cancel.cancel();
            if let Err(e) = handle.task.await {
                error!(session = self.shared.protocol.name(), error = %e, "driver task failed");
            }
        }
        self.shared.update(Session::reset);
    }

    /// Queue a control frame (presence, voice state, speaking) on the live
    /// connection.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        let commands = {
            let driver = self.driver.lock();
            match driver.as_ref() {
                Some(handle) if handle.is_running() && self.state() == SessionState::Connected => {
                    handle.commands.clone()
                }
                _ => return Err(GatewayError::NotConnected),
            }
        };
        commands
            .send(frame)
            .await
            .map_err(|_| GatewayError::NotConnected)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.snapshot().state()
    }

    /// Copy of the session record.
    pub fn snapshot(&self) -> Session {
        self.shared.snapshot()
    }

    /// Whether a driver task is running.
    pub fn is_running(&self) -> bool {
        self.driver.lock().as_ref().is_some_and(DriverHandle::is_running)
    }

    /// Event bus for this session.
    pub fn events(&self) -> &EventBus<SessionEvent> {
        &self.shared.events
    }

    /// The protocol in use.
    pub fn protocol(&self) -> &P {
        &self.shared.protocol
    }

    /// Connection settings.
    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }
}

impl<P: Protocol> Drop for GatewaySession<P> {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.get_mut().take() {
            handle.control.cancel.cancel();
        }
    }
}

impl<P: Protocol> std::fmt::Debug for GatewaySession<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession")
            .field("protocol", &self.shared.protocol.name())
            .field("config", &self.shared.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

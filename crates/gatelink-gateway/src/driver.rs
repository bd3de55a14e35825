//! The driver task.
//!
//! One task per running session owns the socket. Inbound frames, heartbeat
//! ticks, queued outbound frames and cancellation all go through a single
//! `select!` loop, so the session record only ever sees one change at a time.
//! Between connections the task waits out the settle delay (cold connects
//! only) and the socket handshake; both race against cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::close_code::{ABNORMAL_CLOSURE, CloseClass, NO_STATUS, NORMAL_CLOSURE, RECONNECT_CLOSURE};
use crate::errors::{GatewayError, Result};
use crate::events::SessionEvent;
use crate::frame::{InboundFrame, OutboundFrame};
use crate::protocol::{Inbound, Milestone, Protocol};
use crate::session::Shared;
use crate::state::{ConnectMode, Handshake, HeartbeatAction, Session};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const COMMAND_BUFFER: usize = 64;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Caller intent shared with the driver.
pub(crate) struct DriverControl {
    pub(crate) cancel: CancellationToken,
    /// Code to close with once cancelled.
    pub(crate) close_code: AtomicU16,
}

/// Handle kept by [`GatewaySession`](crate::GatewaySession).
pub(crate) struct DriverHandle {
    pub(crate) control: Arc<DriverControl>,
    pub(crate) commands: mpsc::Sender<OutboundFrame>,
    pub(crate) task: JoinHandle<()>,
}

impl DriverHandle {
    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

pub(crate) fn spawn<P: Protocol>(shared: Arc<Shared<P>>, mode: ConnectMode) -> DriverHandle {
    let control = Arc::new(DriverControl {
        cancel: CancellationToken::new(),
        close_code: AtomicU16::new(NORMAL_CLOSURE),
    });
    let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
    let task = tokio::spawn(run(shared, Arc::clone(&control), rx, mode));
    DriverHandle {
        control,
        commands,
        task,
    }
}

/// How a connection ended.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Reconnect { resumable: bool },
    Stop,
}

async fn run<P: Protocol>(
    shared: Arc<Shared<P>>,
    control: Arc<DriverControl>,
    mut commands: mpsc::Receiver<OutboundFrame>,
    mode: ConnectMode,
) {
    let name = shared.protocol.name();
    let mut settle = mode == ConnectMode::Fresh;
    let mut resume = mode == ConnectMode::Resume;

    loop {
        if settle && !shared.config.settle_delay.is_zero() {
            debug!(session = name, delay = ?shared.config.settle_delay, "waiting before connect");
            tokio::select! {
                biased;
                () = control.cancel.cancelled() => return,
                () = time::sleep(shared.config.settle_delay) => {}
            }
        }

        let url = shared.connect_url(resume);
        let ws = tokio::select! {
            biased;
            () = control.cancel.cancelled() => return,
            result = open(&url, shared.config.handshake_timeout) => match result {
                Ok(ws) => ws,
                Err(err) => {
                    shared.fail(&err);
                    return;
                }
            },
        };
        info!(session = name, %url, resume, "socket open");
        shared.update(Session::socket_opened);

        let (sink, stream) = ws.split();
        let connection = Connection {
            shared: shared.as_ref(),
            control: control.as_ref(),
            sink,
            heartbeat: None,
            resume,
            established: false,
        };

        match connection.run(stream, &mut commands).await {
            Outcome::Stop => return,
            Outcome::Reconnect { resumable } => {
                let can_resume = shared.update(|s| {
                    s.prepare_reconnect(resumable);
                    s.can_resume()
                });
                resume = resumable && can_resume;
                settle = !resumable;
                info!(session = name, resume, "reconnecting");
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
async fn open(url: &str, timeout: Duration) -> Result<WsStream> {
    match time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(e)) => Err(GatewayError::Connect {
            url: url.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Err(GatewayError::HandshakeTimeout {
            url: url.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// Resolves on the next heartbeat tick, or never while no interval is set.
async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            let _ = interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// One socket's worth of the session.
struct Connection<'a, P: Protocol> {
    shared: &'a Shared<P>,
    control: &'a DriverControl,
    sink: SplitSink<WsStream, Message>,
    heartbeat: Option<Interval>,
    /// This socket was opened to resume.
    resume: bool,
    /// Ready or resumed was reached; queued frames may flow.
    established: bool,
}

impl<P: Protocol> Connection<'_, P> {
    async fn run(
        mut self,
        mut stream: SplitStream<WsStream>,
        commands: &mut mpsc::Receiver<OutboundFrame>,
    ) -> Outcome {
        loop {
            tokio::select! {
                biased;
                () = self.control.cancel.cancelled() => {
                    let code = self.control.close_code.load(Ordering::Relaxed);
                    self.close(code).await;
                    return Outcome::Stop;
                }
                message = stream.next() => {
                    if let Some(outcome) = self.on_message(message).await {
                        return outcome;
                    }
                }
                () = next_tick(&mut self.heartbeat) => {
                    if let Some(outcome) = self.on_tick().await {
                        return outcome;
                    }
                }
                Some(frame) = commands.recv(), if self.established => {
                    if !self.send(&frame).await {
                        return self.closed(ABNORMAL_CLOSURE, "send failed".into());
                    }
                }
            }
        }
    }

    async fn on_message(
        &mut self,
        message: Option<std::result::Result<Message, tokio_tungstenite::tungstenite::Error>>,
    ) -> Option<Outcome> {
        match message {
            None => Some(self.closed(ABNORMAL_CLOSURE, String::new())),
            Some(Err(e)) => {
                warn!(session = self.shared.protocol.name(), error = %e, "socket error");
                self.shared.emit(&SessionEvent::Error {
                    message: e.to_string(),
                });
                Some(self.closed(ABNORMAL_CLOSURE, e.to_string()))
            }
            Some(Ok(Message::Text(text))) => self.on_text(text.as_str()).await,
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map_or((NO_STATUS, String::new()), |f| {
                    (u16::from(f.code), f.reason.as_str().to_owned())
                });
                Some(self.closed(code, reason))
            }
            Some(Ok(Message::Binary(bytes))) => {
                debug!(session = self.shared.protocol.name(), len = bytes.len(), "ignoring binary frame");
                None
            }
            Some(Ok(_)) => None,
        }
    }

    async fn on_text(&mut self, text: &str) -> Option<Outcome> {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.shared.warn(format!("undecodable frame: {e}"));
                return None;
            }
        };
        trace!(session = self.shared.protocol.name(), op = frame.op, s = ?frame.s, t = ?frame.t, "inbound frame");

        self.shared.update(|s| s.observe_sequence(frame.s));
        self.shared.emit(&SessionEvent::Raw(frame.clone()));

        match self.shared.protocol.classify(&frame) {
            Inbound::Hello { heartbeat_interval } => self.on_hello(heartbeat_interval).await,
            Inbound::Event {
                name,
                data,
                resume,
                milestone,
                reply,
            } => {
                if let Some(info) = resume {
                    self.shared.update(|s| s.capture_resume(info));
                }
                if milestone != Milestone::None {
                    self.shared.update(Session::established);
                    self.established = true;
                }
                self.shared.emit(&SessionEvent::Dispatch {
                    name,
                    data: data.clone(),
                });
                match milestone {
                    Milestone::Ready => {
                        info!(session = self.shared.protocol.name(), "session ready");
                        self.shared.emit(&SessionEvent::Ready { data });
                    }
                    Milestone::Resumed => {
                        info!(session = self.shared.protocol.name(), "session resumed");
                        self.shared.emit(&SessionEvent::Resumed);
                    }
                    Milestone::None => {}
                }
                if let Some(reply) = reply {
                    if !self.send(&reply).await {
                        return Some(self.closed(ABNORMAL_CLOSURE, "send failed".into()));
                    }
                }
                None
            }
            Inbound::HeartbeatAck => {
                self.shared.update(Session::on_heartbeat_ack);
                None
            }
            Inbound::HeartbeatRequest => {
                let sequence = self.shared.snapshot().last_sequence();
                let heartbeat = self.shared.protocol.heartbeat(sequence);
                if self.send(&heartbeat).await {
                    None
                } else {
                    Some(self.closed(ABNORMAL_CLOSURE, "send failed".into()))
                }
            }
            Inbound::InvalidSession { resumable } => {
                self.shared.warn(format!("session invalidated (resumable: {resumable})"));
                Some(self.reconnect(resumable).await)
            }
            Inbound::Reconnect => {
                self.shared.warn("server requested a reconnect");
                Some(self.reconnect(true).await)
            }
            Inbound::Ignored => None,
        }
    }

    async fn on_hello(&mut self, interval: Duration) -> Option<Outcome> {
        let resume = self.resume;
        let handshake = self.shared.update(|s| s.on_hello(interval, resume));
        let frame = match &handshake {
            Handshake::Identify => self.shared.protocol.identify(),
            Handshake::Resume { token, sequence } => self.shared.protocol.resume(token, *sequence),
        };
        debug!(
            session = self.shared.protocol.name(),
            interval = ?interval,
            resume = matches!(handshake, Handshake::Resume { .. }),
            "hello received"
        );
        if !self.send(&frame).await {
            return Some(self.closed(ABNORMAL_CLOSURE, "send failed".into()));
        }

        let mut heartbeat = time::interval_at(Instant::now() + interval, interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat = Some(heartbeat);
        None
    }

    async fn on_tick(&mut self) -> Option<Outcome> {
        match self.shared.update(Session::on_heartbeat_tick) {
            HeartbeatAction::Send(sequence) => {
                let frame = self.shared.protocol.heartbeat(sequence);
                trace!(session = self.shared.protocol.name(), ?sequence, "heartbeat");
                if self.send(&frame).await {
                    None
                } else {
                    Some(self.closed(ABNORMAL_CLOSURE, "send failed".into()))
                }
            }
            HeartbeatAction::Unacknowledged => {
                self.shared.warn("heartbeat not acknowledged, reconnecting");
                Some(self.reconnect(true).await)
            }
        }
    }

    /// Abandon this socket. A resumable reconnect closes with a non-1000 code
    /// so the server keeps the session.
    async fn reconnect(&mut self, resumable: bool) -> Outcome {
        let code = if resumable { RECONNECT_CLOSURE } else { NORMAL_CLOSURE };
        self.close(code).await;
        Outcome::Reconnect { resumable }
    }

    /// The server side ended the connection.
    fn closed(&mut self, code: u16, reason: String) -> Outcome {
        self.heartbeat = None;
        let class = self.shared.protocol.close_codes().classify(code);
        info!(session = self.shared.protocol.name(), code, %class, reason = %reason, "connection closed");
        self.shared.emit(&SessionEvent::Close {
            code,
            reason: reason.clone(),
            class,
        });
        match class {
            CloseClass::Fatal => {
                self.shared.fail(&GatewayError::FatalClose { code, reason });
                Outcome::Stop
            }
            CloseClass::NonResumable => Outcome::Reconnect { resumable: false },
            CloseClass::Resumable => Outcome::Reconnect { resumable: true },
        }
    }

    async fn send(&mut self, frame: &OutboundFrame) -> bool {
        match self.sink.send(Message::Text(frame.to_json().into())).await {
            Ok(()) => true,
            Err(e) => {
                debug!(session = self.shared.protocol.name(), op = frame.op, error = %e, "send failed");
                false
            }
        }
    }

    async fn close(&mut self, code: u16) {
        self.heartbeat = None;
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: String::new().into(),
        };
        debug!(session = self.shared.protocol.name(), code, "closing socket");
        let _ = time::timeout(CLOSE_TIMEOUT, self.sink.send(Message::Close(Some(frame)))).await;
    }
}

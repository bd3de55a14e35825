//! A scripted WebSocket server for driving sessions in tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gatelink_core::EventBus;
use gatelink_gateway::SessionEvent;
use gatelink_core::Event;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{Instant, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};

const STEP: Duration = Duration::from_secs(5);

/// Listens on a random local port.
pub struct MockServer {
    listener: TcpListener,
    /// Base URL with version and encoding parameters.
    pub url: String,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        Self {
            listener,
            url: format!("ws://{addr}/?v=10&encoding=json"),
        }
    }

    /// Accept the next client, failing the test after a few seconds.
    pub async fn accept(&self) -> Peer {
        self.try_accept(STEP).await.expect("client never connected")
    }

    /// Accept the next client if one connects within `wait`.
    pub async fn try_accept(&self, wait: Duration) -> Option<Peer> {
        let (socket, _) = timeout(wait, self.listener.accept()).await.ok()?.ok()?;
        let ws = accept_async(socket).await.unwrap();
        Some(Peer { ws })
    }
}

/// Server side of one connection.
pub struct Peer {
    ws: WebSocketStream<TcpStream>,
}

impl Peer {
    pub async fn send_json(&mut self, value: Value) {
        self.ws.send(Message::Text(value.to_string().into())).await.unwrap();
    }

    /// Send hello with `interval_ms` and return when it was sent.
    pub async fn hello(&mut self, op: u8, interval_ms: u64) -> Instant {
        self.send_json(serde_json::json!({"op": op, "d": {"heartbeat_interval": interval_ms}}))
            .await;
        Instant::now()
    }

    /// Next text frame from the client.
    pub async fn recv_json(&mut self) -> Value {
        loop {
            let message = timeout(STEP, self.ws.next())
                .await
                .expect("no frame from client")
                .expect("client went away")
                .unwrap();
            match message {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                Message::Close(frame) => panic!("client closed: {frame:?}"),
                _ => {}
            }
        }
    }

    /// Next frame with opcode `op`, skipping others (heartbeats and the like).
    pub async fn recv_op(&mut self, op: u64) -> Value {
        loop {
            let frame = self.recv_json().await;
            if frame["op"] == op {
                return frame;
            }
        }
    }

    /// Wait for the client's close frame and return its code. Text frames
    /// in between are skipped. `None` if the socket ended without one.
    pub async fn recv_close(&mut self) -> Option<u16> {
        loop {
            match timeout(STEP, self.ws.next()).await.expect("client never closed") {
                Some(Ok(Message::Close(frame))) => return frame.map(|f| u16::from(f.code)),
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return None,
            }
        }
    }

    /// Whether the client sends anything within `wait`.
    pub async fn is_silent_for(&mut self, wait: Duration) -> bool {
        timeout(wait, self.ws.next()).await.is_err()
    }

    pub async fn close(&mut self, code: u16) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: String::from("test").into(),
        };
        let _ = self.ws.close(Some(frame)).await;
    }
}

/// Record the kinds of every event published on `bus`.
pub fn record_kinds(bus: &EventBus<SessionEvent>) -> Arc<Mutex<Vec<String>>> {
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&kinds);
    let _ = bus.on_any(move |event| sink.lock().push(event.kind().to_string()));
    kinds
}

/// Poll `condition` until it holds, failing the test after a few seconds.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + STEP;
    while !condition() {
        assert!(Instant::now() < deadline, "condition never became true");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

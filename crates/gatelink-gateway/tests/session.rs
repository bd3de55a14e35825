//! End-to-end session behaviour against a local WebSocket server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use gatelink_gateway::protocol::control::op;
use gatelink_gateway::protocol::media;
use gatelink_gateway::{
    ConnectMode, ControlProtocol, GatewayError, GatewaySession, MediaCredentials, MediaProtocol,
    ProtocolSelection, SessionConfig, SessionEvent, SessionState,
};
use gatelink_settings::MediaSettings;
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;

use common::{MockServer, Peer, record_kinds, wait_for};

const LONG: Duration = Duration::from_secs(30);

fn control_session(server: &MockServer, settle: Duration) -> GatewaySession<ControlProtocol> {
    GatewaySession::new(
        ControlProtocol::new("Bot token", 513),
        SessionConfig::new(server.url.clone())
            .with_settle_delay(settle)
            .with_handshake_timeout(Duration::from_secs(5)),
    )
}

/// Hello, identify, ready. Leaves the session connected with resume token
/// `abc` and sequence 1.
async fn handshake(server: &MockServer, peer: &mut Peer, interval_ms: u64) {
    let _ = peer.hello(op::HELLO, interval_ms).await;
    let identify = peer.recv_json().await;
    assert_eq!(identify["op"], op::IDENTIFY);
    peer.send_json(json!({
        "op": 0, "s": 1, "t": "READY",
        "d": {"session_id": "abc", "resume_gateway_url": server.url},
    }))
    .await;
}

// ── Handshake ───────────────────────────────────────────────────────

#[tokio::test]
async fn identifies_after_hello_and_becomes_connected() {
    let server = MockServer::start().await;
    let session = control_session(&server, LONG);
    let kinds = record_kinds(session.events());

    assert!(session.connect(ConnectMode::Resume));
    let mut peer = server.accept().await;
    let _ = peer.hello(op::HELLO, 45_000).await;

    let identify = peer.recv_json().await;
    assert_eq!(identify["op"], op::IDENTIFY);
    assert_eq!(identify["d"]["token"], "Bot token");
    assert_eq!(identify["d"]["intents"], 513);

    peer.send_json(json!({"op": 0, "s": 1, "t": "READY", "d": {"session_id": "abc", "resume_gateway_url": server.url}}))
        .await;
    wait_for(|| session.state() == SessionState::Connected).await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.resume_token(), Some("abc"));
    assert_eq!(snapshot.last_sequence(), Some(1));
    let kinds = kinds.lock().clone();
    assert!(kinds.contains(&"READY".to_string()));
    assert!(kinds.contains(&"ready".to_string()));

    session.disconnect(None).await;
    assert_eq!(peer.recv_close().await, Some(1000));
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.snapshot().resume_token(), None);
}

#[tokio::test]
async fn dispatches_reach_listeners_in_order() {
    let server = MockServer::start().await;
    let session = control_session(&server, LONG);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _ = session.events().on("MESSAGE_CREATE", move |event| {
        if let SessionEvent::Dispatch { data, .. } = event {
            sink.lock().push(data["n"].as_u64().unwrap_or_default());
        }
    });

    assert!(session.connect(ConnectMode::Resume));
    let mut peer = server.accept().await;
    handshake(&server, &mut peer, 45_000).await;
    for n in 2..=6 {
        peer.send_json(json!({"op": 0, "s": n, "t": "MESSAGE_CREATE", "d": {"n": n}})).await;
    }

    wait_for(|| seen.lock().len() == 5).await;
    assert_eq!(*seen.lock(), vec![2, 3, 4, 5, 6]);
    assert_eq!(session.snapshot().last_sequence(), Some(6));
    session.disconnect(None).await;
}

// ── Heartbeat ───────────────────────────────────────────────────────

#[tokio::test]
async fn first_heartbeat_after_one_interval_with_latest_sequence() {
    let server = MockServer::start().await;
    let session = control_session(&server, LONG);

    assert!(session.connect(ConnectMode::Resume));
    let mut peer = server.accept().await;
    let hello_at = peer.hello(op::HELLO, 300).await;
    let _identify = peer.recv_op(u64::from(op::IDENTIFY)).await;
    peer.send_json(json!({"op": 0, "s": 5, "t": "GUILD_CREATE", "d": {}})).await;
    peer.send_json(json!({"op": 0, "s": 3, "t": "GUILD_CREATE", "d": {}})).await;

    let heartbeat = peer.recv_op(u64::from(op::HEARTBEAT)).await;
    let elapsed = hello_at.elapsed();
    assert!(elapsed >= Duration::from_millis(250), "heartbeat after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(900), "heartbeat after {elapsed:?}");
    assert_eq!(heartbeat["d"], 5);

    session.disconnect(None).await;
}

#[tokio::test]
async fn unacknowledged_heartbeat_resumes_without_duplicate() {
    let server = MockServer::start().await;
    let session = control_session(&server, LONG);
    let kinds = record_kinds(session.events());

    assert!(session.connect(ConnectMode::Resume));
    let mut peer = server.accept().await;
    handshake(&server, &mut peer, 200).await;
    peer.send_json(json!({"op": 0, "s": 9, "t": "TYPING_START", "d": {}})).await;

    let heartbeat = peer.recv_op(u64::from(op::HEARTBEAT)).await;
    assert_eq!(heartbeat["d"], 9);
    // never acknowledged: the next tick abandons the socket instead of
    // sending a second heartbeat
    assert_eq!(peer.recv_close().await, Some(4000));
    assert!(kinds.lock().contains(&"warn".to_string()));

    let mut peer = server.accept().await;
    let _ = peer.hello(op::HELLO, 45_000).await;
    let resume = peer.recv_json().await;
    assert_eq!(resume["op"], op::RESUME);
    assert_eq!(resume["d"]["session_id"], "abc");
    assert_eq!(resume["d"]["seq"], 9);

    peer.send_json(json!({"op": 0, "s": 10, "t": "RESUMED", "d": {}})).await;
    wait_for(|| session.state() == SessionState::Connected).await;
    assert!(kinds.lock().contains(&"resumed".to_string()));
    session.disconnect(None).await;
}

#[tokio::test]
async fn acknowledged_heartbeats_keep_the_connection() {
    let server = MockServer::start().await;
    let session = control_session(&server, LONG);

    assert!(session.connect(ConnectMode::Resume));
    let mut peer = server.accept().await;
    handshake(&server, &mut peer, 100).await;

    for _ in 0..3 {
        let _ = peer.recv_op(u64::from(op::HEARTBEAT)).await;
        peer.send_json(json!({"op": op::HEARTBEAT_ACK})).await;
    }
    assert_eq!(session.state(), SessionState::Connected);
    session.disconnect(None).await;
}

#[tokio::test]
async fn server_heartbeat_request_is_answered_immediately() {
    let server = MockServer::start().await;
    let session = control_session(&server, LONG);

    assert!(session.connect(ConnectMode::Resume));
    let mut peer = server.accept().await;
    handshake(&server, &mut peer, 45_000).await;

    let asked_at = Instant::now();
    peer.send_json(json!({"op": op::HEARTBEAT, "d": null})).await;
    let heartbeat = peer.recv_op(u64::from(op::HEARTBEAT)).await;
    assert!(asked_at.elapsed() < Duration::from_secs(1));
    assert_eq!(heartbeat["d"], 1);
    session.disconnect(None).await;
}

// ── Close codes ─────────────────────────────────────────────────────

#[tokio::test]
async fn resumable_close_resumes_immediately() {
    let server = MockServer::start().await;
    let session = control_session(&server, LONG);

    assert!(session.connect(ConnectMode::Resume));
    let mut peer = server.accept().await;
    handshake(&server, &mut peer, 45_000).await;
    peer.send_json(json!({"op": 0, "s": 7, "t": "GUILD_CREATE", "d": {}})).await;
    wait_for(|| session.snapshot().last_sequence() == Some(7)).await;
    peer.close(4008).await;

    // the long settle delay would fail this if the resume waited for it
    let mut peer = server.accept().await;
    let _ = peer.hello(op::HELLO, 45_000).await;
    let resume = peer.recv_json().await;
    assert_eq!(resume["op"], op::RESUME);
    assert_eq!(resume["d"]["seq"], 7);
    assert_eq!(session.snapshot().resume_token(), Some("abc"));
    session.disconnect(None).await;
}

#[tokio::test]
async fn fatal_close_never_reconnects() {
    let server = MockServer::start().await;
    let session = control_session(&server, Duration::ZERO);
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    let _ = session.events().on("fatal", move |event| {
        if let SessionEvent::Fatal(failure) = event {
            sink.lock().push(failure.code);
        }
    });

    assert!(session.connect(ConnectMode::Fresh));
    let mut peer = server.accept().await;
    handshake(&server, &mut peer, 45_000).await;
    peer.close(4004).await;

    wait_for(|| session.state() == SessionState::Disconnected).await;
    assert!(server.try_accept(Duration::from_millis(500)).await.is_none());
    assert_eq!(*failures.lock(), vec![Some(4004)]);
    assert!(!session.is_running());
}

#[tokio::test]
async fn fatal_listener_can_connect_again() {
    let server = MockServer::start().await;
    let session = Arc::new(control_session(&server, Duration::ZERO));
    let restarted = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&restarted);
    let weak = Arc::downgrade(&session);
    let _ = session.events().on("fatal", move |_| {
        if let Some(session) = weak.upgrade() {
            sink.lock().push(session.connect(ConnectMode::Fresh));
        }
    });

    assert!(session.connect(ConnectMode::Fresh));
    let mut peer = server.accept().await;
    handshake(&server, &mut peer, 45_000).await;
    peer.close(4004).await;

    let mut peer = server.accept().await;
    assert_eq!(*restarted.lock(), vec![true]);
    let _ = peer.hello(op::HELLO, 45_000).await;
    let identify = peer.recv_op(u64::from(op::IDENTIFY)).await;
    assert_eq!(identify["d"]["token"], "Bot token");
    assert!(session.is_running());

    session.disconnect(None).await;
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn non_resumable_close_identifies_from_scratch() {
    let server = MockServer::start().await;
    let session = control_session(&server, Duration::from_millis(100));

    assert!(session.connect(ConnectMode::Resume));
    let mut peer = server.accept().await;
    handshake(&server, &mut peer, 45_000).await;
    wait_for(|| session.state() == SessionState::Connected).await;
    peer.close(4007).await;

    let mut peer = server.accept().await;
    assert_eq!(session.snapshot().resume_token(), None);
    assert_eq!(session.snapshot().last_sequence(), None);
    let _ = peer.hello(op::HELLO, 45_000).await;
    let identify = peer.recv_json().await;
    assert_eq!(identify["op"], op::IDENTIFY);
    session.disconnect(None).await;
}

#[tokio::test]
async fn reconnect_request_resumes() {
    let server = MockServer::start().await;
    let session = control_session(&server, LONG);

    assert!(session.connect(ConnectMode::Resume));
    let mut peer = server.accept().await;
    handshake(&server, &mut peer, 45_000).await;
    peer.send_json(json!({"op": op::RECONNECT, "d": null})).await;
    assert_eq!(peer.recv_close().await, Some(4000));

    let mut peer = server.accept().await;
    let _ = peer.hello(op::HELLO, 45_000).await;
    assert_eq!(peer.recv_json().await["op"], op::RESUME);
    session.disconnect(None).await;
}

#[tokio::test]
async fn invalid_session_without_resume_identifies_again() {
    let server = MockServer::start().await;
    let session = control_session(&server, Duration::from_millis(50));

    assert!(session.connect(ConnectMode::Resume));
    let mut peer = server.accept().await;
    handshake(&server, &mut peer, 45_000).await;
    peer.send_json(json!({"op": op::INVALID_SESSION, "d": false})).await;
    assert_eq!(peer.recv_close().await, Some(1000));

    let mut peer = server.accept().await;
    let _ = peer.hello(op::HELLO, 45_000).await;
    assert_eq!(peer.recv_json().await["op"], op::IDENTIFY);
    session.disconnect(None).await;
}

#[tokio::test]
async fn socket_drop_without_close_frame_resumes() {
    let server = MockServer::start().await;
    let session = control_session(&server, LONG);
    let closes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&closes);
    let _ = session.events().on("close", move |event| {
        if let SessionEvent::Close { code, .. } = event {
            sink.lock().push(*code);
        }
    });

    assert!(session.connect(ConnectMode::Resume));
    let mut peer = server.accept().await;
    handshake(&server, &mut peer, 45_000).await;
    wait_for(|| session.state() == SessionState::Connected).await;
    drop(peer);

    let mut peer = server.accept().await;
    let _ = peer.hello(op::HELLO, 45_000).await;
    assert_eq!(peer.recv_json().await["op"], op::RESUME);
    assert_eq!(closes.lock().first().copied(), Some(1006));
    session.disconnect(None).await;
}

// ── Caller control ──────────────────────────────────────────────────

#[tokio::test]
async fn disconnect_during_settle_delay_never_opens_socket() {
    let server = MockServer::start().await;
    let session = control_session(&server, Duration::from_millis(300));

    assert!(session.connect(ConnectMode::Fresh));
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.disconnect(None).await;

    assert!(server.try_accept(Duration::from_millis(600)).await.is_none());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn disconnect_uses_requested_code_and_never_reconnects() {
    let server = MockServer::start().await;
    let session = control_session(&server, Duration::ZERO);

    assert!(session.connect(ConnectMode::Fresh));
    let mut peer = server.accept().await;
    handshake(&server, &mut peer, 45_000).await;
    wait_for(|| session.state() == SessionState::Connected).await;

    session.disconnect(Some(4000)).await;
    assert_eq!(peer.recv_close().await, Some(4000));
    assert!(server.try_accept(Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn send_queues_frames_on_live_connection() {
    let server = MockServer::start().await;
    let session = control_session(&server, LONG);

    assert!(session.connect(ConnectMode::Resume));
    let mut peer = server.accept().await;
    let _ = peer.hello(op::HELLO, 45_000).await;
    let _identify = peer.recv_json().await;

    let early = session
        .send(ControlProtocol::presence_update("idle", Vec::new(), false))
        .await;
    assert_matches!(early, Err(GatewayError::NotConnected));

    peer.send_json(json!({"op": 0, "s": 1, "t": "READY", "d": {"session_id": "abc"}})).await;
    wait_for(|| session.state() == SessionState::Connected).await;

    session
        .send(ControlProtocol::voice_state_update("g1", Some("c1"), false, true))
        .await
        .unwrap();
    let frame = peer.recv_op(u64::from(op::VOICE_STATE_UPDATE)).await;
    assert_eq!(frame["d"]["channel_id"], "c1");
    session.disconnect(None).await;
}

#[tokio::test]
async fn unreachable_server_is_fatal() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let session = GatewaySession::new(
        ControlProtocol::new("Bot token", 0),
        SessionConfig::new(format!("ws://{addr}/")).with_settle_delay(Duration::ZERO),
    );
    let kinds = record_kinds(session.events());

    assert!(session.connect(ConnectMode::Fresh));
    wait_for(|| !session.is_running()).await;
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(kinds.lock().contains(&"fatal".to_string()));

    // a stopped session can be started again
    assert!(session.connect(ConnectMode::Fresh));
    session.disconnect(None).await;
}

// ── Media ───────────────────────────────────────────────────────────

#[tokio::test]
async fn media_selects_protocol_before_connected() {
    let server = MockServer::start().await;
    let protocol = MediaProtocol::new(
        MediaCredentials {
            server_id: "guild".into(),
            user_id: "user".into(),
            session_id: "voice-session".into(),
            token: "voice-token".into(),
        },
        ProtocolSelection::from_settings(&MediaSettings::default()),
    );
    let session = GatewaySession::new(protocol, SessionConfig::new(server.url.clone()).with_settle_delay(Duration::ZERO));
    let kinds = record_kinds(session.events());

    assert!(session.connect(ConnectMode::Fresh));
    let mut peer = server.accept().await;
    let _ = peer.hello(media::op::HELLO, 13_750).await;

    let identify = peer.recv_json().await;
    assert_eq!(identify["op"], media::op::IDENTIFY);
    assert_eq!(identify["d"]["session_id"], "voice-session");

    peer.send_json(json!({"op": media::op::READY, "d": {"ssrc": 1, "ip": "127.0.0.1", "port": 5000, "modes": []}}))
        .await;
    let select = peer.recv_json().await;
    assert_eq!(select["op"], media::op::SELECT_PROTOCOL);
    assert_eq!(select["d"]["data"]["port"], 5000);
    assert_ne!(session.state(), SessionState::Connected);
    assert_eq!(session.snapshot().resume_token(), Some("voice-session"));

    peer.send_json(json!({"op": media::op::SESSION_DESCRIPTION, "seq": 2, "d": {"mode": "aead_xchacha20_poly1305_rtpsize", "secret_key": []}}))
        .await;
    wait_for(|| session.state() == SessionState::Connected).await;
    assert_eq!(session.snapshot().last_sequence(), Some(2));
    assert!(kinds.lock().contains(&"ready".to_string()));

    // 4006 is non-resumable on this channel
    peer.close(4006).await;
    let mut peer = server.accept().await;
    let _ = peer.hello(media::op::HELLO, 13_750).await;
    assert_eq!(peer.recv_json().await["op"], media::op::IDENTIFY);
    session.disconnect(None).await;
}

#[tokio::test]
async fn media_resumes_with_seq_ack() {
    let server = MockServer::start().await;
    let protocol = MediaProtocol::new(
        MediaCredentials {
            server_id: "guild".into(),
            user_id: "user".into(),
            session_id: "voice-session".into(),
            token: "voice-token".into(),
        },
        ProtocolSelection::from_settings(&MediaSettings::default()),
    );
    let session = GatewaySession::new(protocol, SessionConfig::new(server.url.clone()).with_settle_delay(LONG));

    assert!(session.connect(ConnectMode::Resume));
    let mut peer = server.accept().await;
    let _ = peer.hello(media::op::HELLO, 13_750).await;
    let _identify = peer.recv_json().await;
    peer.send_json(json!({"op": media::op::READY, "d": {"ip": "127.0.0.1", "port": 1}})).await;
    let _select = peer.recv_json().await;
    peer.send_json(json!({"op": media::op::SESSION_DESCRIPTION, "seq": 4, "d": {}})).await;
    wait_for(|| session.state() == SessionState::Connected).await;

    // 4015 (server crashed) is resumable
    peer.close(4015).await;
    let mut peer = server.accept().await;
    let _ = peer.hello(media::op::HELLO, 13_750).await;
    let resume = peer.recv_json().await;
    assert_eq!(resume["op"], media::op::RESUME);
    assert_eq!(resume["d"]["session_id"], "voice-session");
    assert_eq!(resume["d"]["seq_ack"], 4);

    peer.send_json(json!({"op": media::op::RESUMED, "d": null})).await;
    wait_for(|| session.state() == SessionState::Connected).await;
    session.disconnect(None).await;
}

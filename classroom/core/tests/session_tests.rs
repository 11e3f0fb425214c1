//! Session client integration tests
//!
//! These drive a `SessionClient` end to end through the in-process
//! transport, with the test playing the classroom backend.
//! Tests cover:
//! - Teacher command and decision response round trip
//! - Connection state sequence and stale-connection handling
//! - Reconnect loop: retry, exhaustion, cancellation
//! - Outbound validation and backpressure

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use classroom_core::transport::{InProcessAcceptor, InProcessPeer, OutboundFrame};
use classroom_core::{
    AnimationTrigger, BusEvent, CloseCode, ConnectionState, Emotion, EventBus, InProcessTransport,
    SessionClient, SessionConfig, SessionError, StudentState, TeacherAction, Topic,
};

// =============================================================================
// Helpers
// =============================================================================

const PRAISE_RESPONSE: &str = r#"{
    "animation": "happy",
    "reply_text": "Thank you, teacher!",
    "emotion": "happy",
    "confidence": 0.92,
    "student_state": "attentive",
    "decision_trace": {
        "intent": "praise_response",
        "rule_applied": "positive_reinforcement",
        "state_before": {"mood": "neutral", "attention_level": 0.6, "energy_level": 0.7, "current_activity": "listening"},
        "state_after": {"mood": "happy", "attention_level": 0.8, "energy_level": 0.8, "current_activity": "listening"}
    },
    "meta": {"timestamp": "2026-10-19T09:30:00Z", "source": "rule_engine", "latency_ms": 42, "decision_id": "d-001"}
}"#;

/// Forward every bus event into a channel
fn record(bus: &EventBus) -> mpsc::UnboundedReceiver<BusEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for topic in Topic::ALL {
        let tx = tx.clone();
        bus.subscribe(topic, move |event| {
            let _ = tx.send(event.clone());
            Ok(())
        });
    }
    rx
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<BusEvent>) -> BusEvent {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for bus event")
        .expect("bus recorder dropped")
}

async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<BusEvent>, mut matches: F) -> BusEvent
where
    F: FnMut(&BusEvent) -> bool,
{
    loop {
        let event = next_event(rx).await;
        if matches(&event) {
            return event;
        }
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<BusEvent>) -> Vec<BusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

struct Harness {
    client: SessionClient,
    acceptor: InProcessAcceptor,
    events: mpsc::UnboundedReceiver<BusEvent>,
    transport_attempts: Arc<std::sync::atomic::AtomicUsize>,
    refuse: Arc<std::sync::atomic::AtomicBool>,
}

fn harness(config: SessionConfig) -> Harness {
    harness_with_capacity(config, 100)
}

fn harness_with_capacity(config: SessionConfig, capacity: usize) -> Harness {
    let (transport, acceptor) = InProcessTransport::new_pair_with_capacity(capacity);
    let transport_attempts = transport.attempts_handle();
    let refuse = transport.refuse_handle();
    let bus = EventBus::new();
    let events = record(&bus);
    Harness {
        client: SessionClient::new(config, Arc::new(transport), bus),
        acceptor,
        events,
        transport_attempts,
        refuse,
    }
}

/// Connect and complete the handshake
async fn open_session(h: &mut Harness) -> InProcessPeer {
    h.client.connect().await.unwrap();
    let peer = h.acceptor.accept().await.unwrap();
    assert!(peer.open().await);
    wait_for(&mut h.events, |e| *e == BusEvent::ConnectionOpened).await;
    assert_eq!(h.client.state(), ConnectionState::Open);
    peer
}

fn frame_json(frame: OutboundFrame) -> serde_json::Value {
    match frame {
        OutboundFrame::Text(text) => serde_json::from_str(&text).unwrap(),
        OutboundFrame::Close(code) => panic!("expected text frame, got close {code}"),
    }
}

// =============================================================================
// Round trip
// =============================================================================

#[tokio::test]
async fn test_praise_command_and_decision_response() {
    let mut h = harness(SessionConfig::default());
    let mut peer = open_session(&mut h).await;

    assert_eq!(peer.url.path(), "/ws/v1/classroom/room_001");
    assert_eq!(peer.url.query(), Some("token=dev-unity-token"));

    h.client
        .send_teacher_command("student_001", TeacherAction::Praise, "Great job!")
        .unwrap();

    let sent = wait_for(&mut h.events, |e| matches!(e, BusEvent::CommandSent { .. })).await;
    assert_eq!(
        sent,
        BusEvent::CommandSent {
            student_id: "student_001".to_string(),
            action: TeacherAction::Praise,
        }
    );

    let frame = frame_json(peer.next_frame().await.unwrap());
    assert_eq!(
        frame,
        serde_json::json!({
            "type": "teacher_input",
            "data": {
                "source": "unity",
                "teacher_id": "unity_teacher",
                "student_id": "student_001",
                "teacher_action": "praise",
                "input_type": "text",
                "content": "Great job!"
            }
        })
    );

    assert!(peer.push_text(PRAISE_RESPONSE).await);
    let event = wait_for(&mut h.events, |e| matches!(e, BusEvent::DecisionResponse(_))).await;
    let BusEvent::DecisionResponse(response) = event else {
        unreachable!()
    };
    assert_eq!(response.reply_text, "Thank you, teacher!");
    assert_eq!(response.animation_trigger(), AnimationTrigger::Happy);
    assert_eq!(response.emotion_kind(), Emotion::Happy);
    assert_eq!(response.behavior_state(), StudentState::Attentive);
    assert_eq!(response.meta.latency_ms, 42);
    let trace = response.decision_trace.as_ref().unwrap();
    assert_eq!(trace.rule_applied, "positive_reinforcement");
}

#[tokio::test]
async fn test_student_action_frame_shape() {
    let mut h = harness(SessionConfig::default());
    let mut peer = open_session(&mut h).await;

    h.client
        .send_student_action("student_002", "raise_hand", "I know the answer")
        .unwrap();

    let frame = frame_json(peer.next_frame().await.unwrap());
    assert_eq!(frame["type"], "student_action");
    assert_eq!(frame["data"]["student_id"], "student_002");
    assert_eq!(frame["data"]["action_type"], "raise_hand");
    assert_eq!(frame["data"]["content"], "I know the answer");
    let timestamp = frame["data"]["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(timestamp).is_ok());
}

#[tokio::test]
async fn test_empty_teacher_content_gets_default_text() {
    let mut h = harness(SessionConfig::default());
    let mut peer = open_session(&mut h).await;

    h.client
        .send_teacher_command("student_003", TeacherAction::CommandSit, "")
        .unwrap();

    let frame = frame_json(peer.next_frame().await.unwrap());
    assert_eq!(frame["data"]["teacher_action"], "command_sit");
    assert_eq!(frame["data"]["content"], "Teacher triggered command_sit");
}

#[tokio::test]
async fn test_undecodable_frames_are_dropped() {
    let mut h = harness(SessionConfig::default());
    let peer = open_session(&mut h).await;

    assert!(peer.push_text("not json").await);
    assert!(peer.push_text("[1, 2, 3]").await);
    assert!(peer.push_text(r#"{"animation":"idle","reply_text":""}"#).await);
    assert!(peer.push_text(r#"{"animation":"wave","reply_text":"Hi","confidence":7.5}"#).await);
    assert!(peer.push_text(r#"{"animation":"wave","reply_text":"Hello!"}"#).await);

    let event = wait_for(&mut h.events, |e| matches!(e, BusEvent::DecisionResponse(_))).await;
    let BusEvent::DecisionResponse(response) = event else {
        unreachable!()
    };
    assert_eq!(response.reply_text, "Hello!");
    assert_eq!(response.emotion_kind(), Emotion::Neutral);
    assert_eq!(h.client.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_send_raw_validates_object() {
    let mut h = harness(SessionConfig::default());
    let mut peer = open_session(&mut h).await;

    let err = h.client.send_raw("[1, 2]").unwrap_err();
    assert!(matches!(err, SessionError::Protocol(_)));

    let raw = r#"{"type":"ping","data":{}}"#;
    h.client.send_raw(raw).unwrap();
    assert_eq!(
        peer.next_frame().await,
        Some(OutboundFrame::Text(raw.to_string()))
    );
}

// =============================================================================
// State sequence
// =============================================================================

#[tokio::test]
async fn test_state_sequence_open_then_normal_close() {
    let mut h = harness(SessionConfig::default());
    assert_eq!(h.client.state(), ConnectionState::Disconnected);

    h.client.connect().await.unwrap();
    assert_eq!(h.client.state(), ConnectionState::Connecting);

    // second connect while connecting is a no-op
    h.client.connect().await.unwrap();
    assert_eq!(h.transport_attempts.load(Ordering::SeqCst), 1);

    let peer = h.acceptor.accept().await.unwrap();
    assert!(peer.open().await);
    assert_eq!(next_event(&mut h.events).await, BusEvent::ConnectionOpened);
    assert!(h.client.is_connected());

    assert!(peer.close(CloseCode::NORMAL).await);
    assert_eq!(
        next_event(&mut h.events).await,
        BusEvent::ConnectionClosed {
            code: CloseCode::NORMAL
        }
    );
    assert_eq!(h.client.state(), ConnectionState::Disconnected);

    // normal close does not reconnect
    tokio::task::yield_now().await;
    assert!(drain(&mut h.events).is_empty());
    assert_eq!(h.client.reconnect_attempts(), 0);
}

#[tokio::test]
async fn test_send_rejected_until_open() {
    let mut h = harness(SessionConfig::default());

    let err = h
        .client
        .send_teacher_command("student_001", TeacherAction::Praise, "")
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::NotConnected {
            state: ConnectionState::Disconnected
        }
    ));

    h.client.connect().await.unwrap();
    let err = h
        .client
        .send_student_action("student_001", "raise_hand", "")
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::NotConnected {
            state: ConnectionState::Connecting
        }
    ));

    let mut peer = h.acceptor.accept().await.unwrap();
    assert!(peer.drain_frames().is_empty());
}

#[tokio::test]
async fn test_disconnect_closes_and_ignores_stale_events() {
    let mut h = harness(SessionConfig::default());
    let mut peer = open_session(&mut h).await;

    h.client.disconnect().await;
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
    assert!(!h.client.auto_reconnect());
    assert_eq!(
        next_event(&mut h.events).await,
        BusEvent::ConnectionClosed {
            code: CloseCode::NORMAL
        }
    );
    assert_eq!(
        peer.next_frame().await,
        Some(OutboundFrame::Close(CloseCode::NORMAL))
    );

    // The old connection keeps talking; nothing reaches the bus
    peer.push_text(PRAISE_RESPONSE).await;
    peer.close(CloseCode::ABNORMAL).await;
    tokio::task::yield_now().await;
    assert!(drain(&mut h.events).is_empty());
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_transport_error_keeps_state() {
    let mut h = harness(SessionConfig::default());
    let peer = open_session(&mut h).await;

    assert!(peer.error("frame checksum mismatch").await);
    assert_eq!(
        next_event(&mut h.events).await,
        BusEvent::ConnectionError {
            message: "frame checksum mismatch".to_string()
        }
    );
    assert_eq!(h.client.state(), ConnectionState::Open);
}

#[tokio::test]
async fn test_stream_end_is_abnormal_close() {
    let mut config = SessionConfig::default();
    config.auto_reconnect = false;
    let mut h = harness(config);
    let peer = open_session(&mut h).await;

    drop(peer);
    assert_eq!(
        next_event(&mut h.events).await,
        BusEvent::ConnectionClosed {
            code: CloseCode::ABNORMAL
        }
    );
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_full_outbound_queue_is_backpressure() {
    let mut h = harness_with_capacity(SessionConfig::default(), 1);
    let _peer = open_session(&mut h).await;

    h.client
        .send_student_action("student_001", "raise_hand", "")
        .unwrap();
    let err = h
        .client
        .send_student_action("student_001", "raise_hand", "")
        .unwrap_err();
    assert!(matches!(err, SessionError::Backpressure));
}

// =============================================================================
// Reconnection
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_abnormal_close_reconnects_and_resets_counter() {
    let mut h = harness(SessionConfig::default());
    let peer = open_session(&mut h).await;

    assert!(peer.close(CloseCode::ABNORMAL).await);
    assert_eq!(
        next_event(&mut h.events).await,
        BusEvent::ConnectionClosed {
            code: CloseCode::ABNORMAL
        }
    );
    assert_eq!(
        next_event(&mut h.events).await,
        BusEvent::Reconnecting { attempt: 1 }
    );
    assert_eq!(h.client.reconnect_attempts(), 1);

    let started = tokio::time::Instant::now();
    let peer = h.acceptor.accept().await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert_eq!(h.transport_attempts.load(Ordering::SeqCst), 2);

    assert!(peer.open().await);
    wait_for(&mut h.events, |e| *e == BusEvent::ConnectionOpened).await;
    assert_eq!(h.client.reconnect_attempts(), 0);
    assert!(h.client.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_token_rejected_close_is_retried() {
    let mut h = harness(SessionConfig::default());
    let peer = open_session(&mut h).await;

    assert!(peer.close(CloseCode::TOKEN_REJECTED).await);
    wait_for(&mut h.events, |e| {
        *e == BusEvent::ConnectionClosed {
            code: CloseCode::TOKEN_REJECTED,
        }
    })
    .await;
    assert_eq!(
        next_event(&mut h.events).await,
        BusEvent::Reconnecting { attempt: 1 }
    );
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_exhaustion_after_max_attempts() {
    let mut config = SessionConfig::default();
    config.max_reconnect_attempts = 3;
    let mut h = harness(config);
    h.refuse.store(true, Ordering::SeqCst);

    let err = h.client.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::Transport(_)));

    let exhausted = wait_for(&mut h.events, |e| {
        matches!(e, BusEvent::ReconnectExhausted { .. })
    })
    .await;
    assert_eq!(exhausted, BusEvent::ReconnectExhausted { attempts: 3 });

    assert_eq!(h.client.reconnect_attempts(), 3);
    assert_eq!(h.transport_attempts.load(Ordering::SeqCst), 4);
    assert_eq!(h.client.state(), ConnectionState::Disconnected);

    // nothing further is attempted
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport_attempts.load(Ordering::SeqCst), 4);
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_events_in_order() {
    let mut config = SessionConfig::default();
    config.max_reconnect_attempts = 2;
    let mut h = harness(config);
    h.refuse.store(true, Ordering::SeqCst);

    let _ = h.client.connect().await;

    let mut kinds = Vec::new();
    loop {
        let event = next_event(&mut h.events).await;
        let done = matches!(event, BusEvent::ReconnectExhausted { .. });
        kinds.push(match event {
            BusEvent::ConnectionError { .. } => "error".to_string(),
            BusEvent::Reconnecting { attempt } => format!("reconnecting-{attempt}"),
            BusEvent::ReconnectExhausted { attempts } => format!("exhausted-{attempts}"),
            other => format!("{:?}", other.topic()),
        });
        if done {
            break;
        }
    }

    assert_eq!(
        kinds,
        vec![
            "error",
            "reconnecting-1",
            "error",
            "reconnecting-2",
            "error",
            "exhausted-2"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_reconnect_loop() {
    let mut config = SessionConfig::default();
    config.max_reconnect_attempts = 0;
    let mut h = harness(config);
    h.refuse.store(true, Ordering::SeqCst);

    let _ = h.client.connect().await;
    wait_for(&mut h.events, |e| {
        *e == BusEvent::Reconnecting { attempt: 1 }
    })
    .await;

    h.client.disconnect().await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(h.transport_attempts.load(Ordering::SeqCst), 1);
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
    assert!(drain(&mut h.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_set_auto_reconnect_false_stops_retrying() {
    let mut h = harness(SessionConfig::default());
    h.refuse.store(true, Ordering::SeqCst);

    let _ = h.client.connect().await;
    wait_for(&mut h.events, |e| {
        *e == BusEvent::Reconnecting { attempt: 1 }
    })
    .await;

    h.client.set_auto_reconnect(false);
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.transport_attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_recovers_when_backend_returns() {
    let mut h = harness(SessionConfig::default());
    h.refuse.store(true, Ordering::SeqCst);

    let _ = h.client.connect().await;
    wait_for(&mut h.events, |e| {
        *e == BusEvent::Reconnecting { attempt: 2 }
    })
    .await;

    h.refuse.store(false, Ordering::SeqCst);
    let peer = h.acceptor.accept().await.unwrap();
    assert!(peer.open().await);
    wait_for(&mut h.events, |e| *e == BusEvent::ConnectionOpened).await;

    assert_eq!(h.client.reconnect_attempts(), 0);
    assert!(h.client.is_connected());

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport_attempts.load(Ordering::SeqCst), 3);
}

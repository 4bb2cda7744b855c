//! Integration tests for the connection lifecycle
//!
//! Every test runs a real client against the in-process mock server.

mod common;

use common::{init_tracing, raw_frame, recv_within, unused_addr, Behavior, MockWsServer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use streamsockets::states::{HasEndpoint, HasSink};
use streamsockets::{
    ConnectionBuilder, ConnectionError, ConnectionEvent, ConnectionHandle, ConnectionState,
    HandshakeError, Payload, SendError, TransportError,
};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Builder whose sink forwards every payload into a channel
fn recording(url: &str) -> (ConnectionBuilder<HasEndpoint, HasSink>, mpsc::UnboundedReceiver<Payload>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let bin_tx = tx.clone();
    let builder = streamsockets::builder().endpoint(url).handlers(
        move |text| {
            let _ = tx.send(Payload::Text(text));
        },
        move |data| {
            let _ = bin_tx.send(Payload::Binary(data));
        },
    );
    (builder, rx)
}

async fn next_payload(rx: &mut mpsc::UnboundedReceiver<Payload>) -> Option<Payload> {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .ok()
        .flatten()
}

async fn terminated(conn: &ConnectionHandle) -> ConnectionState {
    tokio::time::timeout(Duration::from_secs(3), conn.terminated())
        .await
        .expect("connection did not terminate")
}

/// Drain lifecycle events up to and including the terminal one
async fn events_until_terminal(conn: &ConnectionHandle) -> Vec<ConnectionEvent> {
    let events = conn.events();
    let mut seen = Vec::new();
    while let Some(event) = recv_within(&events).await {
        let terminal = event.is_terminal();
        seen.push(event);
        if terminal {
            break;
        }
    }
    seen
}

#[tokio::test]
async fn test_handshake_then_echo() {
    init_tracing();
    let mut server = MockWsServer::start(Behavior::Echo).await;
    let (builder, mut rx) = recording(&server.ws_url());
    let conn = builder.connect();

    conn.on_ready().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Open);

    let info = conn.handshake_info().unwrap();
    assert_eq!(info.status, 101);
    assert_eq!(info.protocol_version, "13");
    assert_eq!(info.subprotocol, None);

    conn.send_text("hello").unwrap();
    conn.send_binary(vec![1, 2, 3]).unwrap();

    assert_eq!(next_payload(&mut rx).await, Some(Payload::Text("hello".into())));
    assert_eq!(next_payload(&mut rx).await, Some(Payload::Binary(vec![1, 2, 3])));
    assert_eq!(server.next_received().await, Some(Message::Text("hello".into())));

    // A second on_ready sees the same outcome
    conn.on_ready().await.unwrap();
}

#[tokio::test]
async fn test_no_dispatch_before_open() {
    init_tracing();
    let server = MockWsServer::start(Behavior::Script(vec![Message::Text("early".into())])).await;

    let opened = Arc::new(AtomicBool::new(false));
    let dispatched_after_open = Arc::new(AtomicBool::new(false));
    let (tx, mut rx) = mpsc::unbounded_channel();

    let conn = {
        let opened_flag = Arc::clone(&opened);
        let opened_check = Arc::clone(&opened);
        let after = Arc::clone(&dispatched_after_open);
        streamsockets::builder()
            .endpoint(server.ws_url())
            .observer(move |event: &ConnectionEvent| {
                if let ConnectionEvent::Opened(_) = event {
                    opened_flag.store(true, Ordering::SeqCst);
                }
            })
            .handlers(
                move |text| {
                    after.store(opened_check.load(Ordering::SeqCst), Ordering::SeqCst);
                    let _ = tx.send(text);
                },
                |_| {},
            )
            .connect()
    };

    conn.on_ready().await.unwrap();
    assert_eq!(
        tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap(),
        Some("early".to_string())
    );
    assert!(dispatched_after_open.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_inbound_order_preserved() {
    init_tracing();
    let server = MockWsServer::start(Behavior::Script(vec![
        Message::Text("a".into()),
        Message::Text("b".into()),
        Message::Binary(vec![1]),
    ]))
    .await;
    let (builder, mut rx) = recording(&server.ws_url());
    let conn = builder.connect();
    conn.on_ready().await.unwrap();

    assert_eq!(next_payload(&mut rx).await, Some(Payload::Text("a".into())));
    assert_eq!(next_payload(&mut rx).await, Some(Payload::Text("b".into())));
    assert_eq!(next_payload(&mut rx).await, Some(Payload::Binary(vec![1])));
}

#[tokio::test]
async fn test_ping_answered_with_exactly_one_pong() {
    init_tracing();
    let mut server = MockWsServer::start(Behavior::Script(vec![Message::Ping(vec![0x01, 0x02])])).await;
    let (builder, _rx) = recording(&server.ws_url());
    let conn = builder.connect();
    conn.on_ready().await.unwrap();

    assert_eq!(server.next_received().await, Some(Message::Pong(vec![0x01, 0x02])));

    // Writes are serialized: a duplicate pong would arrive before this marker
    conn.send_text("marker").unwrap();
    assert_eq!(server.next_received().await, Some(Message::Text("marker".into())));
    assert_eq!(conn.metrics().pings_answered, 1);
}

#[tokio::test]
async fn test_peer_close_ends_closed() {
    init_tracing();
    let server = MockWsServer::start(Behavior::Script(vec![
        Message::Text("a".into()),
        Message::Close(Some(CloseFrame {
            code: CloseCode::Away,
            reason: "bye".into(),
        })),
    ]))
    .await;
    let (builder, mut rx) = recording(&server.ws_url());
    let conn = builder.connect();
    conn.on_ready().await.unwrap();

    assert_eq!(next_payload(&mut rx).await, Some(Payload::Text("a".into())));
    assert_eq!(terminated(&conn).await, ConnectionState::Closed);

    let events = events_until_terminal(&conn).await;
    assert_eq!(
        events.last(),
        Some(&ConnectionEvent::Closed {
            code: 1001,
            reason: "bye".into()
        })
    );
    assert_eq!(
        conn.send_text("late"),
        Err(SendError::Closed {
            state: ConnectionState::Closed
        })
    );
}

#[tokio::test]
async fn test_frames_after_close_not_dispatched() {
    init_tracing();
    let mut raw = raw_frame(0x1, b"a");
    raw.extend(raw_frame(0x8, &1000u16.to_be_bytes()));
    raw.extend(raw_frame(0x1, b"after"));
    let server = MockWsServer::start(Behavior::UpgradeThenRaw(raw)).await;

    let (builder, mut rx) = recording(&server.ws_url());
    let conn = builder.close_timeout(Duration::from_millis(200)).connect();
    conn.on_ready().await.unwrap();

    assert_eq!(next_payload(&mut rx).await, Some(Payload::Text("a".into())));
    assert_eq!(terminated(&conn).await, ConnectionState::Closed);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(rx.try_recv().is_err(), "frame dispatched after close");
}

#[tokio::test]
async fn test_rejected_upgrade() {
    init_tracing();
    let server = MockWsServer::start(Behavior::Raw(
        b"HTTP/1.1 403 Forbidden\r\nContent-Length: 6\r\n\r\nno way".to_vec(),
    ))
    .await;
    let (builder, _rx) = recording(&server.ws_url());
    let conn = builder.connect();

    match conn.on_ready().await {
        Err(HandshakeError::Rejected { status, reason }) => {
            assert_eq!(status, 403);
            assert!(!reason.is_empty());
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(terminated(&conn).await, ConnectionState::Failed);
}

#[tokio::test]
async fn test_malformed_upgrade_response() {
    init_tracing();
    let server = MockWsServer::start(Behavior::Raw(b"garbage\r\n\r\n".to_vec())).await;
    let (builder, _rx) = recording(&server.ws_url());
    let conn = builder.connect();

    assert!(matches!(
        conn.on_ready().await,
        Err(HandshakeError::Malformed(_))
    ));
    assert_eq!(conn.state(), ConnectionState::Failed);
    assert!(matches!(
        conn.failure(),
        Some(ConnectionError::Handshake(HandshakeError::Malformed(_)))
    ));
}

#[tokio::test]
async fn test_connection_refused() {
    init_tracing();
    let addr = unused_addr().await;
    let (builder, _rx) = recording(&format!("ws://{}", addr));
    let conn = builder.connect();

    assert!(matches!(
        conn.on_ready().await,
        Err(HandshakeError::Transport(_))
    ));
    assert!(matches!(
        conn.failure(),
        Some(ConnectionError::Transport(TransportError::Io(_)))
    ));

    let events = events_until_terminal(&conn).await;
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_handshake_timeout() {
    init_tracing();
    let server = MockWsServer::start(Behavior::Silent).await;
    let (builder, _rx) = recording(&server.ws_url());
    let conn = builder.handshake_timeout(Duration::from_millis(200)).connect();

    assert_eq!(
        conn.on_ready().await,
        Err(HandshakeError::Timeout(Duration::from_millis(200)))
    );
    assert_eq!(conn.state(), ConnectionState::Failed);
}

#[tokio::test]
async fn test_send_before_open() {
    init_tracing();
    let server = MockWsServer::start(Behavior::Silent).await;
    let (builder, _rx) = recording(&server.ws_url());
    let conn = builder.connect();

    assert!(matches!(
        conn.send_text("too early"),
        Err(SendError::NotOpen { .. })
    ));
    conn.close();
    assert_eq!(conn.on_ready().await, Err(HandshakeError::Aborted));
}

#[tokio::test]
async fn test_close_twice_is_idempotent() {
    init_tracing();
    let mut server = MockWsServer::start(Behavior::Echo).await;
    let (builder, _rx) = recording(&server.ws_url());
    let conn = builder.connect();
    conn.on_ready().await.unwrap();

    conn.close();
    conn.close();
    assert_eq!(terminated(&conn).await, ConnectionState::Closed);
    conn.close();
    assert_eq!(conn.state(), ConnectionState::Closed);

    assert!(matches!(server.next_received().await, Some(Message::Close(_))));

    let events = events_until_terminal(&conn).await;
    let closes: Vec<_> = events.iter().filter(|e| e.is_terminal()).collect();
    assert_eq!(
        closes,
        vec![&ConnectionEvent::Closed {
            code: 1000,
            reason: String::new()
        }]
    );
}

#[tokio::test]
async fn test_frames_sent_before_close_are_written_first() {
    init_tracing();
    let mut server = MockWsServer::start(Behavior::Echo).await;
    let (builder, _rx) = recording(&server.ws_url());
    let conn = builder.connect();
    conn.on_ready().await.unwrap();

    conn.send_text("first").unwrap();
    conn.send_binary(vec![7, 7]).unwrap();
    conn.close();
    assert_eq!(terminated(&conn).await, ConnectionState::Closed);

    assert_eq!(server.next_received().await, Some(Message::Text("first".into())));
    assert_eq!(server.next_received().await, Some(Message::Binary(vec![7, 7])));
    assert!(matches!(server.next_received().await, Some(Message::Close(_))));
    assert_eq!(conn.metrics().frames_sent, 3);
}

#[tokio::test]
async fn test_close_without_reply_times_out_to_closed() {
    init_tracing();
    let server = MockWsServer::start(Behavior::Hold).await;
    let (builder, _rx) = recording(&server.ws_url());
    let conn = builder.close_timeout(Duration::from_millis(200)).connect();
    conn.on_ready().await.unwrap();

    conn.close_with(4000, "done");
    assert_eq!(conn.state(), ConnectionState::Closing);
    assert!(matches!(
        conn.send_text("x"),
        Err(SendError::Closed {
            state: ConnectionState::Closing
        })
    ));

    assert_eq!(terminated(&conn).await, ConnectionState::Closed);
    let events = events_until_terminal(&conn).await;
    assert_eq!(
        events.last(),
        Some(&ConnectionEvent::Closed {
            code: 4000,
            reason: "done".into()
        })
    );
}

#[tokio::test]
async fn test_close_frame_via_send() {
    init_tracing();
    let server = MockWsServer::start(Behavior::Echo).await;
    let (builder, _rx) = recording(&server.ws_url());
    let conn = builder.connect();
    conn.on_ready().await.unwrap();

    conn.send(streamsockets::Frame::close(1000, "bye")).unwrap();
    assert_eq!(terminated(&conn).await, ConnectionState::Closed);
}

#[tokio::test]
async fn test_send_confirmed() {
    init_tracing();
    let server = MockWsServer::start(Behavior::Echo).await;
    let (builder, mut rx) = recording(&server.ws_url());
    let conn = builder.connect();
    conn.on_ready().await.unwrap();

    conn.send_confirmed(Payload::Text("confirmed".into())).await.unwrap();
    assert!(conn.metrics().frames_sent >= 1);
    assert_eq!(next_payload(&mut rx).await, Some(Payload::Text("confirmed".into())));

    conn.close();
    terminated(&conn).await;
    assert_eq!(
        conn.send_confirmed(Payload::Text("late".into())).await,
        Err(SendError::Closed {
            state: ConnectionState::Closed
        })
    );
}

#[tokio::test]
async fn test_stream_end_fails_connection() {
    init_tracing();
    let server = MockWsServer::start(Behavior::Echo).await;
    let (builder, _rx) = recording(&server.ws_url());
    let conn = builder.connect();
    conn.on_ready().await.unwrap();

    server.shutdown();
    assert_eq!(terminated(&conn).await, ConnectionState::Failed);
    assert!(matches!(
        conn.failure(),
        Some(ConnectionError::Transport(_))
    ));
}

#[tokio::test]
async fn test_keepalive_pongs_keep_connection_open() {
    init_tracing();
    let server = MockWsServer::start(Behavior::Echo).await;
    let (builder, _rx) = recording(&server.ws_url());
    let conn = builder
        .keepalive(Duration::from_millis(50))
        .pong_timeout(Duration::from_millis(500))
        .connect();
    conn.on_ready().await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(conn.state(), ConnectionState::Open);
    assert!(conn.metrics().pongs_received >= 1);
}

#[tokio::test]
async fn test_keepalive_timeout_fails_connection() {
    init_tracing();
    let server = MockWsServer::start(Behavior::Hold).await;
    let (builder, _rx) = recording(&server.ws_url());
    let conn = builder
        .keepalive(Duration::from_millis(50))
        .pong_timeout(Duration::from_millis(100))
        .connect();
    conn.on_ready().await.unwrap();

    assert_eq!(terminated(&conn).await, ConnectionState::Failed);
    assert_eq!(
        conn.failure(),
        Some(ConnectionError::Transport(TransportError::KeepaliveTimeout(
            Duration::from_millis(100)
        )))
    );
}

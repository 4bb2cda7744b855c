//! Common test utilities for StreamSockets integration tests
//!
//! A mock WebSocket server with scripted behaviours, plus helpers for
//! waiting on crossbeam receivers from async tests.
#![allow(dead_code)]

use crossbeam_channel::Receiver;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::Message;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Initialise tracing once per test binary (RUST_LOG controls the filter)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the mock server does with each accepted connection
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Complete the upgrade and echo text/binary messages back
    Echo,
    /// Complete the upgrade, send these messages, then keep reading
    Script(Vec<Message>),
    /// Answer the upgrade request with these raw bytes instead of a 101
    Raw(Vec<u8>),
    /// Complete the upgrade by hand, then write these raw frame bytes at once
    UpgradeThenRaw(Vec<u8>),
    /// Complete the upgrade, then neither read nor write
    Hold,
    /// Accept TCP but never answer the upgrade request
    Silent,
}

/// A mock WebSocket server for testing
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    received: mpsc::UnboundedReceiver<Message>,
}

impl MockWsServer {
    /// Create and start a new mock WebSocket server
    pub async fn start(behavior: Behavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let shutdown_clone = shutdown.clone();
        let (received_tx, received) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let shutdown = shutdown_clone.clone();
                                let behavior = behavior.clone();
                                let received_tx = received_tx.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, behavior, received_tx, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown,
            received,
        }
    }

    async fn handle_connection(
        mut stream: TcpStream,
        behavior: Behavior,
        received_tx: mpsc::UnboundedSender<Message>,
        shutdown: Arc<Notify>,
    ) {
        match behavior {
            Behavior::Raw(bytes) => {
                let _ = read_request(&mut stream).await;
                let _ = stream.write_all(&bytes).await;
                let _ = stream.flush().await;
                hold(stream, shutdown).await;
                return;
            }
            Behavior::UpgradeThenRaw(bytes) => {
                let request = read_request(&mut stream).await;
                let Some(key) = request_key(&request) else {
                    return;
                };
                let response = format!(
                    "HTTP/1.1 101 Switching Protocols\r\n\
                     Upgrade: websocket\r\n\
                     Connection: Upgrade\r\n\
                     Sec-WebSocket-Accept: {}\r\n\r\n",
                    derive_accept_key(key.as_bytes())
                );
                let mut out = response.into_bytes();
                out.extend_from_slice(&bytes);
                let _ = stream.write_all(&out).await;
                let _ = stream.flush().await;
                hold(stream, shutdown).await;
                return;
            }
            Behavior::Silent => {
                hold(stream, shutdown).await;
                return;
            }
            _ => {}
        }

        let ws_stream = match tokio_tungstenite::accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        if let Behavior::Hold = behavior {
            shutdown.notified().await;
            drop(ws_stream);
            return;
        }

        let (mut write, mut read) = ws_stream.split();

        if let Behavior::Script(messages) = &behavior {
            for msg in messages.clone() {
                if write.send(msg).await.is_err() {
                    return;
                }
            }
        }

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            let _ = received_tx.send(msg.clone());
                            if matches!(behavior, Behavior::Echo) && (msg.is_text() || msg.is_binary()) {
                                // Echo the message back
                                if write.send(msg).await.is_err() {
                                    break;
                                }
                            } else if msg.is_close() {
                                // Flush the codec's close reply
                                let _ = write.close().await;
                                break;
                            }
                        }
                        Some(Err(_)) | None => break,
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Next message the server read from the client
    pub async fn next_received(&mut self) -> Option<Message> {
        tokio::time::timeout(Duration::from_secs(2), self.received.recv())
            .await
            .ok()
            .flatten()
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn request_key(request: &str) -> Option<String> {
    request.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("sec-websocket-key")
            .then(|| value.trim().to_string())
    })
}

/// Keep the socket open until the peer leaves or the server shuts down
async fn hold(mut stream: TcpStream, shutdown: Arc<Notify>) {
    let mut sink = [0u8; 1024];
    loop {
        tokio::select! {
            read = stream.read(&mut sink) => match read {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            },
            _ = shutdown.notified() => break,
        }
    }
}

/// A raw unmasked server frame (payloads under 126 bytes)
pub fn raw_frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() < 126);
    let mut frame = vec![0x80 | opcode, payload.len() as u8];
    frame.extend_from_slice(payload);
    frame
}

/// Wait up to two seconds for the next item of a crossbeam receiver
pub async fn recv_within<T>(receiver: &Receiver<T>) -> Option<T> {
    for _ in 0..200 {
        if let Ok(item) = receiver.try_recv() {
            return Some(item);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}

/// An address nothing listens on
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

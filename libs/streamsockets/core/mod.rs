//! # Connection core
//!
//! Everything between "here is an endpoint" and "here are your messages":
//! the lifecycle state machine, the upgrade handshake, frame dispatch and
//! the driver task that owns the socket.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use streamsockets::{ConnectionEvent, Payload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let conn = streamsockets::builder()
//!         .endpoint("wss://stream.example.com/feed")
//!         .handlers(
//!             |text| println!("text: {}", text),
//!             |bytes| println!("binary: {} bytes", bytes.len()),
//!         )
//!         .keepalive(Duration::from_secs(5))
//!         .pong_timeout(Duration::from_secs(15))
//!         .connect();
//!
//!     conn.on_ready().await?;
//!     conn.send(Payload::Text(r#"{"op":"subscribe","topic":"trades"}"#.into()))?;
//!
//!     // Reconnection is the caller's business: wait for the end, then decide
//!     let state = conn.terminated().await;
//!     println!("connection ended: {}", state);
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod connection_state;
pub mod dispatcher;
pub mod handshake;
pub mod heartbeat;
pub mod pong_tracker;
pub mod ready;
pub mod session;
pub mod settings;
pub mod state_machine;

// Re-export main types
pub use builder::{states, ConnectionBuilder};
pub use client::{ConnectionHandle, Metrics};
pub use config::ConnectionConfig;
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
pub use handshake::{HandshakeCoordinator, HandshakeInfo};
pub use heartbeat::KeepaliveConfig;
pub use pong_tracker::PongTracker;
pub use settings::{ConnectionSettings, SettingsError};
pub use state_machine::ConnectionStateMachine;

/// Create a new connection builder
///
/// # Example
/// ```ignore
/// let conn = streamsockets::builder()
///     .endpoint("wss://api.example.com/ws")
///     .sink(MySink::new())
///     .subprotocol("v2.feed")
///     .observer(|event: &ConnectionEvent| tracing::info!("{:?}", event))
///     .connect();
/// ```
pub fn builder() -> ConnectionBuilder<states::NoEndpoint, states::NoSink> {
    ConnectionBuilder::new()
}

/// Open a connection with default settings
///
/// Returns immediately; await [`ConnectionHandle::on_ready`] to learn
/// whether the handshake succeeded. Must be called within a tokio runtime.
pub fn connect<T, B>(endpoint: impl Into<String>, on_text: T, on_binary: B) -> ConnectionHandle
where
    T: FnMut(String) + Send + 'static,
    B: FnMut(Vec<u8>) + Send + 'static,
{
    builder()
        .endpoint(endpoint)
        .handlers(on_text, on_binary)
        .connect()
}

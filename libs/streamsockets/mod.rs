//! # StreamSockets
//!
//! WebSocket streaming-client core for exchange adapters: one connection,
//! an explicit lifecycle, and nothing dispatched before the handshake is done.
//!
//! ## Features
//!
//! - **Explicit state machine**: Connecting → Handshaking → Open → Closing → Closed/Failed
//! - **Single driver task**: ordered dispatch, single writer, pongs answered before the next read
//! - **Typed errors**: handshake, protocol, transport and send failures, each reported once
//! - **Type-state builder**: Compile-time guarantees for required configuration
//! - **Multiplexing**: many topics over one connection, with re-subscription on a fresh handle
//!
//! Reconnection is deliberately left to the caller: observe the terminal
//! event, then `connect` again.

pub mod traits;
pub mod core;
pub mod subscription;

// Re-export all traits
pub use traits::*;

// Re-export core connection functionality
pub use crate::core::{
    builder, connect,
    builder::{states, ConnectionBuilder},
    client::{ConnectionHandle, Metrics},
    config::ConnectionConfig,
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState},
    handshake::HandshakeInfo,
    heartbeat::KeepaliveConfig,
    settings::{ConnectionSettings, SettingsError},
};

// Re-export subscription edge
pub use subscription::{JsonFieldTopic, Multiplexer, TopicResolver, TopicStream};

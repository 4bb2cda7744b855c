use crate::core::connection_state::ConnectionState;
use std::time::Duration;
use thiserror::Error;

/// Failure to promote the connection to an open WebSocket session
///
/// Surfaced once through `ConnectionHandle::on_ready`. Never retried
/// internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The upgrade request could not be built (bad endpoint, bad header)
    #[error("Invalid upgrade request: {0}")]
    InvalidRequest(String),

    /// The server answered the upgrade with a non-101 status
    #[error("Upgrade rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },

    /// The upgrade response was not a valid WebSocket upgrade
    #[error("Malformed upgrade response: {0}")]
    Malformed(String),

    /// Something other than the upgrade response arrived while handshaking
    #[error("Unexpected message during handshake: {0}")]
    UnexpectedMessage(String),

    /// No upgrade response within the configured timeout
    #[error("Handshake timed out after {0:?}")]
    Timeout(Duration),

    /// The transport failed before the handshake completed
    #[error("Transport failed during handshake: {0}")]
    Transport(String),

    /// The connection was closed locally before the handshake completed
    #[error("Connection closed before the handshake completed")]
    Aborted,
}

/// Malformed or unrecognized traffic after the handshake
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The codec produced a frame this client does not understand
    #[error("Unrecognized frame: {0}")]
    UnrecognizedFrame(String),

    /// An HTTP upgrade response arrived on an open connection
    #[error("Unexpected upgrade response (status {status}) on an open connection")]
    UnexpectedUpgrade { status: u16 },

    /// The codec rejected the byte stream
    #[error("Codec error: {0}")]
    Codec(String),
}

/// Loss of the underlying connectivity
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// I/O failure on the socket
    #[error("I/O error: {0}")]
    Io(String),

    /// The peer went away without a Close frame
    #[error("Stream ended without a close frame")]
    StreamEnded,

    /// A frame could not be written
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// A keepalive ping was not answered in time
    #[error("No pong received within {0:?}")]
    KeepaliveTimeout(Duration),
}

/// Error returned to callers of `send`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The connection has not finished its handshake yet
    #[error("Connection not open (state: {state})")]
    NotOpen { state: ConnectionState },

    /// The connection is closing or already terminal
    #[error("Connection closed (state: {state})")]
    Closed { state: ConnectionState },

    /// The frame was accepted but the write failed
    #[error("Send failed: {0}")]
    Transport(#[from] TransportError),
}

/// Terminal cause of a connection, as reported to lifecycle observers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Result type for streamsockets operations
pub type Result<T> = std::result::Result<T, ConnectionError>;

//! # StreamSockets Traits
//!
//! Protocol value types and the seams where adapter code plugs into the
//! connection core:
//!
//! - **Frame**: Text, Binary, Ping, Pong and Close frames
//! - **MessageSink**: Receives inbound text and binary payloads
//! - **ConnectionObserver**: Receives lifecycle events (open, close, failure)
//! - **HeaderProvider**: Supplies headers for the upgrade request
//! - **Errors**: Handshake, protocol, transport and send failures

pub mod error;
pub mod frame;
pub mod headers;
pub mod observer;
pub mod sink;

// Re-export commonly used types
pub use error::{
    ConnectionError, HandshakeError, ProtocolError, Result, SendError, TransportError,
};
pub use frame::{Frame, Payload, CLOSE_NORMAL, CLOSE_NO_STATUS};
pub use headers::{HeaderProvider, Headers, NoHeaders, StaticHeaders};
pub use observer::{ChannelObserver, ConnectionEvent, ConnectionObserver};
pub use sink::{FnSink, MessageSink, NoOpSink};

use crate::core::connection_state::ConnectionState;
use crate::core::handshake::HandshakeInfo;
use crate::error::ConnectionError;
use crossbeam_channel::Sender;

/// Lifecycle event emitted by a connection
///
/// Terminal events (`Closed`, `Failed`) are emitted exactly once per
/// connection and are always the last event observers receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The state machine moved from one state to another
    StateChanged {
        from: ConnectionState,
        to: ConnectionState,
    },
    /// The handshake completed
    Opened(HandshakeInfo),
    /// A pong arrived (solicited or not)
    PongReceived(Vec<u8>),
    /// Graceful close, with the close code and reason that ended it
    Closed { code: u16, reason: String },
    /// The connection failed; the cause is reported once
    Failed(ConnectionError),
}

impl ConnectionEvent {
    /// Check if this event ends the connection
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionEvent::Closed { .. } | ConnectionEvent::Failed(_))
    }
}

/// Receiver of lifecycle notifications
///
/// Higher layers use this to drive reconnection: on a terminal event they
/// call `connect` again and get a fresh handle. Observers are called from
/// whichever context caused the transition (the driver task or a caller of
/// `close`), so keep them short and non-blocking.
pub trait ConnectionObserver: Send + Sync + 'static {
    fn on_event(&self, event: &ConnectionEvent);
}

impl<F> ConnectionObserver for F
where
    F: Fn(&ConnectionEvent) + Send + Sync + 'static,
{
    fn on_event(&self, event: &ConnectionEvent) {
        self(event)
    }
}

/// Observer forwarding every event into a crossbeam channel
pub struct ChannelObserver {
    sender: Sender<ConnectionEvent>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<ConnectionEvent>) -> Self {
        Self { sender }
    }
}

impl ConnectionObserver for ChannelObserver {
    fn on_event(&self, event: &ConnectionEvent) {
        // Receiver dropped means nobody is listening anymore
        let _ = self.sender.send(event.clone());
    }
}

//! Connection State Machine
//!
//! The single authoritative answer to "is this connection usable". Every
//! transition goes through here so that readiness, observers and the
//! terminal cause stay consistent:
//!
//! - entering `Open` resolves the readiness slot with success
//! - entering `Failed` before `Open` rejects it with the handshake cause
//! - entering `Closed`/`Failed` emits exactly one terminal event
//!
//! Other components hold an `Arc` to the machine but only drive it through
//! these methods; nobody writes the state directly.

use crate::core::connection_state::{AtomicConnectionState, ConnectionState};
use crate::core::handshake::HandshakeInfo;
use crate::core::ready::ReadySignal;
use crate::error::{ConnectionError, HandshakeError};
use crate::observer::{ConnectionEvent, ConnectionObserver};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct ConnectionStateMachine {
    state: AtomicConnectionState,
    /// Held across a transition and its events so observers see them in order.
    /// Reentrant: observers may drive the machine from inside a callback.
    transitions: ReentrantMutex<()>,
    /// Wakes `terminated()` waiters; mirrors `state`
    state_tx: watch::Sender<ConnectionState>,
    ready: ReadySignal,
    observers: RwLock<Vec<Arc<dyn ConnectionObserver>>>,
    handshake: Mutex<Option<HandshakeInfo>>,
    failure: Mutex<Option<ConnectionError>>,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        Self {
            state: AtomicConnectionState::new(ConnectionState::Connecting),
            transitions: ReentrantMutex::new(()),
            state_tx,
            ready: ReadySignal::new(),
            observers: RwLock::new(Vec::new()),
            handshake: Mutex::new(None),
            failure: Mutex::new(None),
        }
    }

    /// Point-in-time read of the current state
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Register a lifecycle observer
    ///
    /// Observers only see events emitted after registration.
    pub fn observe(&self, observer: Arc<dyn ConnectionObserver>) {
        self.observers.write().push(observer);
    }

    /// Resolves once the connection is open, or with the reason it never got there
    pub async fn ready(&self) -> Result<(), HandshakeError> {
        self.ready.wait().await
    }

    /// Resolves with the terminal state once one is reached
    pub async fn terminated(&self) -> ConnectionState {
        let mut rx = self.state_tx.subscribe();
        let reached = match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        };
        reached
    }

    /// Negotiated handshake details, once open
    pub fn handshake_info(&self) -> Option<HandshakeInfo> {
        self.handshake.lock().clone()
    }

    /// Terminal failure cause, if the connection failed
    pub fn failure(&self) -> Option<ConnectionError> {
        self.failure.lock().clone()
    }

    /// Connecting → Handshaking (transport became active)
    pub fn begin_handshake(&self) -> bool {
        self.transition_from(ConnectionState::Connecting, ConnectionState::Handshaking)
    }

    /// Handshaking → Open; resolves readiness
    pub fn open(&self, info: HandshakeInfo) -> bool {
        let _guard = self.transitions.lock();
        if !self.transition_from(ConnectionState::Handshaking, ConnectionState::Open) {
            return false;
        }
        *self.handshake.lock() = Some(info.clone());
        info!("WebSocket connection open (protocol version {})", info.protocol_version);
        self.ready.resolve(Ok(()));
        self.emit(ConnectionEvent::Opened(info));
        true
    }

    /// Open → Closing
    pub fn begin_close(&self) -> bool {
        self.transition_from(ConnectionState::Open, ConnectionState::Closing)
    }

    /// Open/Closing → Closed, carrying the close code and reason to observers
    pub fn finish_close(&self, code: u16, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        let _guard = self.transitions.lock();
        let closed = match self.state.advance(ConnectionState::Closed) {
            Ok(from) => {
                self.publish(from, ConnectionState::Closed);
                true
            }
            Err(current) => {
                debug!("Close ignored in state {}", current);
                false
            }
        };
        if closed {
            info!("WebSocket connection closed (code {}, reason {:?})", code, reason);
            self.emit(ConnectionEvent::Closed { code, reason });
        }
        closed
    }

    /// Any non-terminal state → Failed
    ///
    /// Rejects readiness if the handshake had not completed. Returns false
    /// when the connection was already terminal; the original cause is kept.
    pub fn fail(&self, error: impl Into<ConnectionError>) -> bool {
        let error = error.into();
        let _guard = self.transitions.lock();
        let from = match self.state.advance(ConnectionState::Failed) {
            Ok(from) => from,
            Err(current) => {
                debug!("Failure ignored in terminal state {}: {}", current, error);
                return false;
            }
        };

        warn!("WebSocket connection failed: {}", error);
        *self.failure.lock() = Some(error.clone());
        self.publish(from, ConnectionState::Failed);

        let handshake_cause = match &error {
            ConnectionError::Handshake(e) => e.clone(),
            other => HandshakeError::Transport(other.to_string()),
        };
        // No-op when the handshake already succeeded
        self.ready.resolve(Err(handshake_cause));

        self.emit(ConnectionEvent::Failed(error));
        true
    }

    /// Forward a non-lifecycle observation (pongs) to observers
    pub fn notify(&self, event: ConnectionEvent) {
        self.emit(event);
    }

    fn transition_from(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let _guard = self.transitions.lock();
        match self.state.advance_from(from, to) {
            Ok(_) => {
                self.publish(from, to);
                true
            }
            Err(current) => {
                debug!("Refused transition {} -> {} (current: {})", from, to, current);
                false
            }
        }
    }

    fn publish(&self, from: ConnectionState, to: ConnectionState) {
        debug!("Connection state {} -> {}", from, to);
        self.state_tx.send_replace(to);
        self.emit(ConnectionEvent::StateChanged { from, to });
    }

    fn emit(&self, event: ConnectionEvent) {
        // Snapshot so observers may register further observers
        let observers: Vec<_> = self.observers.read().iter().cloned().collect();
        for observer in observers {
            observer.on_event(&event);
        }
    }
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

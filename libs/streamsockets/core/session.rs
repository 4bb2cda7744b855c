//! Per-connection protocol session
//!
//! Holds one dispatch table per lifecycle state and feeds every inbound item
//! through the table of the current state:
//!
//! ```text
//! Connecting  : anything            → Failed (unexpected message)
//! Handshaking : upgrade response    → HandshakeCoordinator → Open | Failed
//!               frame / garbage     → Failed (unexpected message / malformed)
//! Open        : frame               → FrameDispatcher
//!               upgrade / garbage   → Failed (protocol error)
//! Closing     : close               → finish closing
//!               anything else       → dropped
//! Closed/Failed                     → dropped, stop reading
//! ```
//!
//! The session does no I/O. The driver performs whatever the returned
//! [`Directive`] asks for, which keeps every rule here testable without a
//! socket.

use crate::core::connection_state::{AtomicMetrics, ConnectionState};
use crate::core::dispatcher::{Dispatch, FrameDispatcher};
use crate::core::handshake::HandshakeCoordinator;
use crate::core::state_machine::ConnectionStateMachine;
use crate::error::{ConnectionError, HandshakeError, ProtocolError};
use crate::frame::Frame;
use crate::headers::Headers;
use crate::observer::ConnectionEvent;
use crate::sink::MessageSink;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::handshake::client::{Request, Response};
use tracing::trace;

/// One item produced by the codec
#[derive(Debug)]
pub enum Inbound {
    /// HTTP answer to the upgrade request (any status)
    Upgrade(Response),
    /// A decoded WebSocket frame
    Frame(Frame),
    /// Bytes the codec could not turn into a response or a frame
    Malformed(String),
}

/// What the driver must do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Keep reading
    Continue,
    /// Write this frame before reading anything else
    Reply(Frame),
    /// A pong arrived; payload for keepalive bookkeeping
    Pong(Vec<u8>),
    /// Close requested by the peer (or answered by it); close the transport
    Close { code: u16, reason: String },
    /// The connection is terminal; stop reading
    Stop,
}

pub struct Session<S: MessageSink> {
    machine: Arc<ConnectionStateMachine>,
    handshake: HandshakeCoordinator,
    dispatcher: FrameDispatcher<S>,
}

impl<S: MessageSink> Session<S> {
    pub fn new(
        machine: Arc<ConnectionStateMachine>,
        handshake: HandshakeCoordinator,
        sink: S,
        metrics: Arc<AtomicMetrics>,
    ) -> Self {
        Self {
            machine,
            handshake,
            dispatcher: FrameDispatcher::new(sink, metrics),
        }
    }

    pub fn machine(&self) -> &Arc<ConnectionStateMachine> {
        &self.machine
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.machine.state()
    }

    /// Build the upgrade request; returns the host and port to connect to
    pub fn prepare(&mut self, headers: &Headers) -> Result<(String, u16), HandshakeError> {
        let prepared = self
            .handshake
            .prepare(headers)
            .and_then(|()| self.handshake.target());
        if let Err(e) = &prepared {
            self.machine.fail(e.clone());
        }
        prepared
    }

    /// Transport is connected: move to Handshaking and emit the request
    ///
    /// Returns `None` when the connection was closed in the meantime.
    pub fn on_transport_active(&mut self) -> Option<Request> {
        if !self.machine.begin_handshake() {
            return None;
        }
        let request = self.handshake.emit_request();
        if request.is_none() {
            self.machine.fail(HandshakeError::InvalidRequest(
                "upgrade request was not prepared".into(),
            ));
        }
        request
    }

    /// The handshake could not produce a response at all
    pub fn on_handshake_error(&mut self, error: HandshakeError) -> Directive {
        self.machine.fail(error);
        Directive::Stop
    }

    /// Feed one inbound item through the table of the current state
    pub fn on_inbound(&mut self, inbound: Inbound) -> Directive {
        match self.machine.state() {
            ConnectionState::Connecting => {
                self.machine.fail(HandshakeError::UnexpectedMessage(format!(
                    "{} before the upgrade request was sent",
                    describe(&inbound)
                )));
                Directive::Stop
            }
            ConnectionState::Handshaking => self.on_handshaking(inbound),
            ConnectionState::Open => self.on_open(inbound),
            ConnectionState::Closing => match inbound {
                Inbound::Frame(Frame::Close { code, reason }) => Directive::Close { code, reason },
                other => {
                    trace!("Dropping {} received while closing", describe(&other));
                    Directive::Continue
                }
            },
            ConnectionState::Closed | ConnectionState::Failed => Directive::Stop,
        }
    }

    /// Complete a close once the transport has been shut
    pub fn finish_close(&mut self, code: u16, reason: impl Into<String>) -> bool {
        self.machine.finish_close(code, reason)
    }

    /// Fail the connection with a terminal error
    pub fn fail(&mut self, error: impl Into<ConnectionError>) -> Directive {
        self.machine.fail(error);
        Directive::Stop
    }

    fn on_handshaking(&mut self, inbound: Inbound) -> Directive {
        let outcome = match inbound {
            Inbound::Upgrade(response) => self.handshake.finish(&response),
            Inbound::Frame(frame) => Err(HandshakeError::UnexpectedMessage(format!(
                "{} frame before the upgrade response",
                frame.kind()
            ))),
            Inbound::Malformed(detail) => Err(HandshakeError::Malformed(detail)),
        };

        match outcome {
            Ok(info) => {
                if self.machine.open(info) {
                    Directive::Continue
                } else {
                    Directive::Stop
                }
            }
            Err(e) => {
                self.machine.fail(e);
                Directive::Stop
            }
        }
    }

    fn on_open(&mut self, inbound: Inbound) -> Directive {
        let frame = match inbound {
            Inbound::Frame(frame) => frame,
            Inbound::Upgrade(response) => {
                return self.fail(ProtocolError::UnexpectedUpgrade {
                    status: response.status().as_u16(),
                });
            }
            Inbound::Malformed(detail) => return self.fail(ProtocolError::Codec(detail)),
        };

        match self.dispatcher.dispatch(frame) {
            Dispatch::Continue => Directive::Continue,
            Dispatch::Reply(reply) => Directive::Reply(reply),
            Dispatch::Pong(payload) => {
                self.machine
                    .notify(ConnectionEvent::PongReceived(payload.clone()));
                Directive::Pong(payload)
            }
            Dispatch::Close { code, reason } => {
                self.machine.begin_close();
                Directive::Close { code, reason }
            }
        }
    }
}

fn describe(inbound: &Inbound) -> String {
    match inbound {
        Inbound::Upgrade(response) => format!("upgrade response ({})", response.status()),
        Inbound::Frame(frame) => format!("{} frame", frame.kind()),
        Inbound::Malformed(detail) => format!("malformed data ({})", detail),
    }
}

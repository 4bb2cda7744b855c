//! Frame Dispatcher and Control-Frame Responder
//!
//! Dispatch table for an open connection:
//!
//! | Frame  | Action                                        |
//! |--------|-----------------------------------------------|
//! | Text   | sink `on_text`, payload untouched             |
//! | Binary | sink `on_binary`, buffer ownership handed over |
//! | Ping   | reply with a Pong echoing the payload         |
//! | Pong   | observed and logged, nothing else             |
//! | Close  | start closing, nothing dispatched afterwards  |

use crate::core::connection_state::AtomicMetrics;
use crate::frame::Frame;
use crate::sink::MessageSink;
use std::sync::Arc;
use tracing::{debug, trace};

/// What the driver must do after a frame was dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Frame consumed, keep reading
    Continue,
    /// Write this frame before reading the next one
    Reply(Frame),
    /// Pong observed, payload attached
    Pong(Vec<u8>),
    /// Peer asked to close
    Close { code: u16, reason: String },
}

/// Answer a ping with a pong carrying byte-identical payload
#[inline]
pub fn respond_to_ping(payload: Vec<u8>) -> Frame {
    Frame::Pong(payload)
}

pub struct FrameDispatcher<S: MessageSink> {
    sink: S,
    metrics: Arc<AtomicMetrics>,
}

impl<S: MessageSink> FrameDispatcher<S> {
    pub fn new(sink: S, metrics: Arc<AtomicMetrics>) -> Self {
        Self { sink, metrics }
    }

    /// Route one inbound frame of an open connection
    pub fn dispatch(&mut self, frame: Frame) -> Dispatch {
        self.metrics.increment_received();
        match frame {
            Frame::Text(text) => {
                self.sink.on_text(text);
                Dispatch::Continue
            }
            Frame::Binary(data) => {
                self.sink.on_binary(data);
                Dispatch::Continue
            }
            Frame::Ping(payload) => {
                debug!("WebSocket client received ping ({} bytes)", payload.len());
                Dispatch::Reply(respond_to_ping(payload))
            }
            Frame::Pong(payload) => {
                trace!("WebSocket client received pong");
                self.metrics.increment_pongs_received();
                Dispatch::Pong(payload)
            }
            Frame::Close { code, reason } => {
                debug!("WebSocket client received close (code {})", code);
                Dispatch::Close { code, reason }
            }
        }
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

use crate::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

/// Close code for a normal, intentional closure
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the peer sent a Close frame without a status
pub const CLOSE_NO_STATUS: u16 = 1005;

/// One discrete WebSocket protocol frame
///
/// Produced by the codec for every inbound unit and accepted by
/// `ConnectionHandle::send` for outbound traffic. Frames are plain owned
/// values; nothing in this crate mutates one after it was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close { code: u16, reason: String },
}

impl Frame {
    /// Build a Close frame
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Frame::Close {
            code,
            reason: reason.into(),
        }
    }

    /// Short name of the frame kind, used in logs and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Ping(_) => "ping",
            Frame::Pong(_) => "pong",
            Frame::Close { .. } => "close",
        }
    }

    /// Check if this is a data frame (text or binary)
    pub fn is_data(&self) -> bool {
        matches!(self, Frame::Text(_) | Frame::Binary(_))
    }

    /// Check if this is a control frame (ping, pong or close)
    pub fn is_control(&self) -> bool {
        !self.is_data()
    }
}

impl TryFrom<Message> for Frame {
    type Error = ProtocolError;

    fn try_from(message: Message) -> Result<Self, Self::Error> {
        match message {
            Message::Text(text) => Ok(Frame::Text(text)),
            Message::Binary(data) => Ok(Frame::Binary(data)),
            Message::Ping(data) => Ok(Frame::Ping(data)),
            Message::Pong(data) => Ok(Frame::Pong(data)),
            Message::Close(Some(close)) => Ok(Frame::Close {
                code: u16::from(close.code),
                reason: close.reason.into_owned(),
            }),
            Message::Close(None) => Ok(Frame::Close {
                code: CLOSE_NO_STATUS,
                reason: String::new(),
            }),
            Message::Frame(raw) => Err(ProtocolError::UnrecognizedFrame(format!(
                "raw frame with opcode {:?}",
                raw.header().opcode
            ))),
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(data) => Message::Binary(data),
            Frame::Ping(data) => Message::Ping(data),
            Frame::Pong(data) => Message::Pong(data),
            Frame::Close { code, reason } => Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            })),
        }
    }
}

/// Data payload delivered to topic streams
///
/// The multiplexer only ever sees data frames, so this is the text/binary
/// subset of [`Frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    /// Get the payload as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            Payload::Binary(_) => None,
        }
    }

    /// Get the payload as binary, if it is binary
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            Payload::Text(_) => None,
            Payload::Binary(b) => Some(b),
        }
    }
}

impl From<Payload> for Frame {
    fn from(payload: Payload) -> Self {
        match payload {
            Payload::Text(text) => Frame::Text(text),
            Payload::Binary(data) => Frame::Binary(data),
        }
    }
}

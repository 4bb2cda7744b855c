//! Handshake Coordinator
//!
//! Builds the upgrade request when the transport becomes active and judges
//! the first inbound response. The codec performs the byte-level exchange;
//! this module owns the decision of whether the result is an open session.

use crate::error::HandshakeError;
use crate::headers::Headers;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::{Request, Response};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::http::header::{
    CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::Error as WsError;

/// Details negotiated during the upgrade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeInfo {
    /// HTTP status of the upgrade response (always 101 once open)
    pub status: u16,
    /// `Sec-WebSocket-Version` the session runs on
    pub protocol_version: String,
    /// Subprotocol selected by the server, if any was requested
    pub subprotocol: Option<String>,
}

pub struct HandshakeCoordinator {
    endpoint: String,
    subprotocols: Vec<String>,
    request: Option<Request>,
    key: Option<String>,
    version: String,
    completed: bool,
}

impl HandshakeCoordinator {
    pub fn new(endpoint: impl Into<String>, subprotocols: Vec<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            subprotocols,
            request: None,
            key: None,
            version: "13".to_string(),
            completed: false,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Build the upgrade request with caller-supplied headers
    pub fn prepare(&mut self, headers: &Headers) -> Result<(), HandshakeError> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| HandshakeError::InvalidRequest(e.to_string()))?;

        for (key, value) in headers {
            let name = key
                .parse::<HeaderName>()
                .map_err(|_| HandshakeError::InvalidRequest(format!("invalid header name: {}", key)))?;
            let value = value.parse::<HeaderValue>().map_err(|_| {
                HandshakeError::InvalidRequest(format!("invalid value for header '{}'", key))
            })?;
            request.headers_mut().insert(name, value);
        }

        if !self.subprotocols.is_empty() {
            let offered = self.subprotocols.join(", ");
            let value = offered.parse::<HeaderValue>().map_err(|_| {
                HandshakeError::InvalidRequest(format!("invalid subprotocol list: {}", offered))
            })?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        let key = header_str(request.headers().get(SEC_WEBSOCKET_KEY))
            .ok_or_else(|| HandshakeError::InvalidRequest("missing Sec-WebSocket-Key".into()))?
            .to_string();
        if let Some(version) = header_str(request.headers().get(SEC_WEBSOCKET_VERSION)) {
            self.version = version.to_string();
        }

        self.key = Some(key);
        self.request = Some(request);
        Ok(())
    }

    /// Host and port the transport must connect to
    pub fn target(&self) -> Result<(String, u16), HandshakeError> {
        let request = self
            .request
            .as_ref()
            .ok_or_else(|| HandshakeError::InvalidRequest("request not prepared".into()))?;
        let uri = request.uri();
        let host = uri
            .host()
            .ok_or_else(|| HandshakeError::InvalidRequest(format!("no host in {}", uri)))?;
        let default_port = match uri.scheme_str() {
            Some("ws") => 80,
            Some("wss") => 443,
            other => {
                return Err(HandshakeError::InvalidRequest(format!(
                    "unsupported scheme: {:?}",
                    other
                )))
            }
        };
        // IPv6 literals come back bracketed
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        Ok((host, uri.port_u16().unwrap_or(default_port)))
    }

    /// Hand out the prepared request; only the first call returns it
    pub fn emit_request(&mut self) -> Option<Request> {
        self.request.take()
    }

    /// Judge the upgrade response
    ///
    /// Only one response is ever processed; a second call fails with
    /// `UnexpectedMessage`.
    pub fn finish(&mut self, response: &Response) -> Result<HandshakeInfo, HandshakeError> {
        if self.completed {
            return Err(HandshakeError::UnexpectedMessage(
                "second upgrade response".into(),
            ));
        }
        self.completed = true;

        let key = self.key.as_deref().ok_or_else(|| {
            HandshakeError::UnexpectedMessage("upgrade response before the request was sent".into())
        })?;

        let status = response.status();
        if status != StatusCode::SWITCHING_PROTOCOLS {
            return Err(HandshakeError::Rejected {
                status: status.as_u16(),
                reason: rejection_reason(response),
            });
        }

        let headers = response.headers();
        let upgrade_ok = header_str(headers.get(UPGRADE))
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        if !upgrade_ok {
            return Err(HandshakeError::Malformed(
                "missing 'Upgrade: websocket' header".into(),
            ));
        }

        let connection_ok = header_str(headers.get(CONNECTION))
            .map(|v| v.split(',').any(|token| token.trim().eq_ignore_ascii_case("upgrade")))
            .unwrap_or(false);
        if !connection_ok {
            return Err(HandshakeError::Malformed(
                "missing 'Connection: upgrade' header".into(),
            ));
        }

        let expected = derive_accept_key(key.as_bytes());
        if header_str(headers.get(SEC_WEBSOCKET_ACCEPT)) != Some(expected.as_str()) {
            return Err(HandshakeError::Malformed(
                "Sec-WebSocket-Accept does not match the request key".into(),
            ));
        }

        let subprotocol = header_str(headers.get(SEC_WEBSOCKET_PROTOCOL)).map(str::to_string);
        match &subprotocol {
            Some(selected) if !self.subprotocols.iter().any(|p| p == selected) => {
                return Err(HandshakeError::Malformed(format!(
                    "server selected unrequested subprotocol '{}'",
                    selected
                )));
            }
            None if !self.subprotocols.is_empty() => {
                return Err(HandshakeError::Malformed(
                    "server selected none of the requested subprotocols".into(),
                ));
            }
            _ => {}
        }

        Ok(HandshakeInfo {
            status: status.as_u16(),
            protocol_version: self.version.clone(),
            subprotocol,
        })
    }

    /// The key sent with the request, for building matching responses
    pub fn request_key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

/// Split a codec handshake error into "a response arrived" or a failure
///
/// The codec reports non-101 answers as an error carrying the response;
/// those still go through `finish` so the rejection is judged in one place.
pub(crate) fn classify_codec_error(error: WsError) -> Result<Response, HandshakeError> {
    match error {
        WsError::Http(response) => Ok(response),
        WsError::Io(e) => Err(HandshakeError::Transport(e.to_string())),
        WsError::ConnectionClosed | WsError::AlreadyClosed => {
            Err(HandshakeError::Transport("connection closed during upgrade".into()))
        }
        WsError::Tls(e) => Err(HandshakeError::Transport(e.to_string())),
        other => Err(HandshakeError::Malformed(other.to_string())),
    }
}

fn header_str(value: Option<&HeaderValue>) -> Option<&str> {
    value.and_then(|v| v.to_str().ok())
}

fn rejection_reason(response: &Response) -> String {
    response
        .body()
        .as_deref()
        .and_then(|body| std::str::from_utf8(body).ok())
        .map(str::trim)
        .filter(|body| !body.is_empty())
        .map(str::to_string)
        .or_else(|| response.status().canonical_reason().map(str::to_string))
        .unwrap_or_default()
}

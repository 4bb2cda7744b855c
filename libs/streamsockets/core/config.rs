use crate::core::heartbeat::KeepaliveConfig;
use crate::headers::HeaderProvider;
use crate::observer::ConnectionObserver;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

/// Default time allowed for the upgrade exchange
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time to wait for the peer's close reply after a local close
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for one connection
///
/// Built by the type-state builder; the message sink travels separately
/// because it is moved into the driver task.
pub struct ConnectionConfig {
    /// WebSocket URL (wss:// or ws://)
    pub(crate) endpoint: String,

    /// Optional provider of upgrade-request headers
    pub(crate) headers: Option<Arc<dyn HeaderProvider>>,

    /// Subprotocols offered in `Sec-WebSocket-Protocol`, in preference order
    pub(crate) subprotocols: Vec<String>,

    /// Upper bound for TCP connect plus upgrade exchange (`None` = no limit)
    pub(crate) handshake_timeout: Option<Duration>,

    /// How long a local close waits for the peer's close reply
    pub(crate) close_timeout: Duration,

    /// Optional client-initiated keepalive
    pub(crate) keepalive: Option<KeepaliveConfig>,

    /// Largest accepted message, in bytes (`None` = codec default)
    pub(crate) max_message_size: Option<usize>,

    /// Largest accepted frame, in bytes (`None` = codec default)
    pub(crate) max_frame_size: Option<usize>,

    /// Observers registered before the connection starts
    pub(crate) observers: Vec<Arc<dyn ConnectionObserver>>,
}

impl ConnectionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            headers: None,
            subprotocols: Vec::new(),
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            keepalive: None,
            max_message_size: None,
            max_frame_size: None,
            observers: Vec::new(),
        }
    }

    /// Get a reference to the endpoint
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn subprotocols(&self) -> &[String] {
        &self.subprotocols
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout
    }

    pub fn close_timeout(&self) -> Duration {
        self.close_timeout
    }

    pub fn keepalive(&self) -> Option<KeepaliveConfig> {
        self.keepalive
    }

    /// Check if a header provider is configured
    pub fn has_headers(&self) -> bool {
        self.headers.is_some()
    }

    /// Codec limits
    pub(crate) fn codec_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        if let Some(size) = self.max_message_size {
            config.max_message_size = Some(size);
        }
        if let Some(size) = self.max_frame_size {
            config.max_frame_size = Some(size);
        }
        config
    }
}

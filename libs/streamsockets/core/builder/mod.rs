pub mod states;

use crate::core::client::ConnectionHandle;
use crate::core::config::ConnectionConfig;
use crate::core::heartbeat::KeepaliveConfig;
use crate::core::settings::ConnectionSettings;
use crate::headers::HeaderProvider;
use crate::observer::ConnectionObserver;
use crate::sink::{FnSink, MessageSink, NoOpSink};
use states::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Type-state builder for a WebSocket connection
///
/// The type system enforces that the required fields (endpoint and message
/// sink) are set before `connect()` becomes available. Everything else has
/// a default.
pub struct ConnectionBuilder<E, K>
where
    E: EndpointState,
    K: SinkState,
{
    _state: TypeState<E, K>,
    endpoint: String,
    sink: Option<Box<dyn MessageSink>>,
    headers: Option<Arc<dyn HeaderProvider>>,
    subprotocols: Vec<String>,
    handshake_timeout: Option<Duration>,
    close_timeout: Option<Duration>,
    keepalive_interval: Option<Duration>,
    pong_timeout: Option<Duration>,
    max_message_size: Option<usize>,
    max_frame_size: Option<usize>,
    observers: Vec<Arc<dyn ConnectionObserver>>,
}

impl ConnectionBuilder<NoEndpoint, NoSink> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            endpoint: String::new(),
            sink: None,
            headers: None,
            subprotocols: Vec::new(),
            handshake_timeout: None,
            close_timeout: None,
            keepalive_interval: None,
            pong_timeout: None,
            max_message_size: None,
            max_frame_size: None,
            observers: Vec::new(),
        }
    }
}

impl Default for ConnectionBuilder<NoEndpoint, NoSink> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E, K> ConnectionBuilder<E, K>
where
    E: EndpointState,
    K: SinkState,
{
    fn retype<E2: EndpointState, K2: SinkState>(self) -> ConnectionBuilder<E2, K2> {
        ConnectionBuilder {
            _state: TypeState::new(),
            endpoint: self.endpoint,
            sink: self.sink,
            headers: self.headers,
            subprotocols: self.subprotocols,
            handshake_timeout: self.handshake_timeout,
            close_timeout: self.close_timeout,
            keepalive_interval: self.keepalive_interval,
            pong_timeout: self.pong_timeout,
            max_message_size: self.max_message_size,
            max_frame_size: self.max_frame_size,
            observers: self.observers,
        }
    }
}

// Endpoint setting
impl<K> ConnectionBuilder<NoEndpoint, K>
where
    K: SinkState,
{
    pub fn endpoint(self, endpoint: impl Into<String>) -> ConnectionBuilder<HasEndpoint, K> {
        let mut next = self.retype();
        next.endpoint = endpoint.into();
        next
    }
}

// Sink setting
impl<E> ConnectionBuilder<E, NoSink>
where
    E: EndpointState,
{
    /// Deliver inbound payloads to `sink`
    pub fn sink(self, sink: impl MessageSink) -> ConnectionBuilder<E, HasSink> {
        let mut next = self.retype();
        next.sink = Some(Box::new(sink));
        next
    }

    /// Deliver inbound payloads to a pair of closures
    pub fn handlers<T, B>(self, on_text: T, on_binary: B) -> ConnectionBuilder<E, HasSink>
    where
        T: FnMut(String) + Send + 'static,
        B: FnMut(Vec<u8>) + Send + 'static,
    {
        self.sink(FnSink::new(on_text, on_binary))
    }

    /// Discard inbound payloads (control-only connections, tests)
    pub fn discard_messages(self) -> ConnectionBuilder<E, HasSink> {
        self.sink(NoOpSink)
    }
}

// Optional configuration methods
impl<E, K> ConnectionBuilder<E, K>
where
    E: EndpointState,
    K: SinkState,
{
    pub fn headers(mut self, provider: impl HeaderProvider + 'static) -> Self {
        self.headers = Some(Arc::new(provider));
        self
    }

    /// Offer a subprotocol; may be called several times, in preference order
    pub fn subprotocol(mut self, protocol: impl Into<String>) -> Self {
        self.subprotocols.push(protocol.into());
        self
    }

    pub fn subprotocols<I, P>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.subprotocols.extend(protocols.into_iter().map(Into::into));
        self
    }

    /// Limit for TCP connect plus upgrade exchange (default 10s)
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// How long a local close waits for the peer's close reply (default 5s)
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = Some(timeout);
        self
    }

    /// Send a ping every `interval` while the connection is open
    ///
    /// Each ping carries an 8-byte sequence number.
    pub fn keepalive(mut self, interval: Duration) -> Self {
        self.keepalive_interval = Some(interval);
        self
    }

    /// Fail the connection when a keepalive ping stays unanswered this long
    ///
    /// Recommended value: 3x the keepalive interval (e.g., 15s for 5s pings).
    /// Only takes effect together with `keepalive()`.
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = Some(timeout);
        self
    }

    pub fn max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = Some(bytes);
        self
    }

    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = Some(bytes);
        self
    }

    /// Register a lifecycle observer before the connection starts
    ///
    /// Unlike `ConnectionHandle::observe`, an observer registered here sees
    /// every event including the first state change.
    pub fn observer(mut self, observer: impl ConnectionObserver) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    /// Apply the optional knobs of loaded settings (the endpoint is not touched)
    pub fn settings(mut self, settings: &ConnectionSettings) -> Self {
        self.subprotocols.extend(settings.subprotocols.iter().cloned());
        if let Some(secs) = settings.handshake_timeout_secs {
            self.handshake_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = settings.close_timeout_secs {
            self.close_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = settings.keepalive_interval_secs {
            self.keepalive_interval = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = settings.pong_timeout_secs {
            self.pong_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(bytes) = settings.max_message_size {
            self.max_message_size = Some(bytes);
        }
        if let Some(bytes) = settings.max_frame_size {
            self.max_frame_size = Some(bytes);
        }
        self
    }

    fn into_config(self) -> (ConnectionConfig, Box<dyn MessageSink>) {
        let keepalive = match (self.keepalive_interval, self.pong_timeout) {
            (Some(interval), pong_timeout) => Some(KeepaliveConfig {
                interval,
                pong_timeout,
            }),
            (None, Some(_)) => {
                warn!("pong_timeout set without keepalive interval; ignoring");
                None
            }
            (None, None) => None,
        };

        let mut config = ConnectionConfig::new(self.endpoint);
        config.headers = self.headers;
        config.subprotocols = self.subprotocols;
        if let Some(timeout) = self.handshake_timeout {
            config.handshake_timeout = Some(timeout);
        }
        if let Some(timeout) = self.close_timeout {
            config.close_timeout = timeout;
        }
        config.keepalive = keepalive;
        config.max_message_size = self.max_message_size;
        config.max_frame_size = self.max_frame_size;
        config.observers = self.observers;

        let sink = self.sink.unwrap_or_else(|| Box::new(NoOpSink));
        (config, sink)
    }
}

// Connect - only available when all required fields are set
impl ConnectionBuilder<HasEndpoint, HasSink> {
    /// Start connecting and return the handle immediately
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(self) -> ConnectionHandle {
        let (config, sink) = self.into_config();
        ConnectionHandle::spawn(config, sink)
    }
}

use crate::core::client::ConnectionHandle;
use crate::core::connection_state::ConnectionState;
use crate::error::{HandshakeError, SendError};
use crate::frame::{Frame, Payload};
use crate::sink::MessageSink;
use crate::subscription::topic::TopicResolver;
use crossbeam_channel::{unbounded, Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Receiving end of one topic
///
/// Ends (every receive returns an error) when the topic is unsubscribed or
/// subscribed again, or when the multiplexer is dropped.
#[derive(Debug, Clone)]
pub struct TopicStream {
    topic: String,
    receiver: Receiver<Payload>,
}

impl TopicStream {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Receive a payload (blocking)
    pub fn recv(&self) -> Result<Payload, RecvError> {
        self.receiver.recv()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Payload, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Try to receive a payload (non-blocking)
    pub fn try_recv(&self) -> Result<Payload, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn receiver(&self) -> &Receiver<Payload> {
        &self.receiver
    }
}

struct Subscription {
    sender: Sender<Payload>,
    subscribe_frame: Frame,
}

#[derive(Default)]
struct Registry {
    topics: HashMap<String, Subscription>,
    fallback: Option<Sender<Payload>>,
    connection: Option<ConnectionHandle>,
}

struct Inner {
    resolver: Box<dyn TopicResolver>,
    registry: RwLock<Registry>,
}

/// Many logical topics over one connection
///
/// The multiplexer is the connection's [`MessageSink`]: it resolves the topic
/// of every inbound payload and forwards it to that topic's stream. It also
/// remembers each topic's subscribe frame so that a fresh connection can be
/// re-subscribed with [`attach`](Self::attach).
///
/// Clones share the same registry.
///
/// # Example
///
/// ```ignore
/// let mux = Multiplexer::new(JsonFieldTopic::field("channel"));
/// let trades = mux.subscribe("trades", Frame::Text(r#"{"op":"sub","channel":"trades"}"#.into()))?;
///
/// let conn = streamsockets::builder()
///     .endpoint("wss://stream.example.com")
///     .sink(mux.clone())
///     .connect();
/// mux.attach(&conn).await?;
///
/// while let Ok(payload) = trades.recv() { /* ... */ }
/// ```
#[derive(Clone)]
pub struct Multiplexer {
    inner: Arc<Inner>,
}

impl Multiplexer {
    pub fn new(resolver: impl TopicResolver) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver: Box::new(resolver),
                registry: RwLock::new(Registry::default()),
            }),
        }
    }

    /// Sink to hand to the connection builder
    pub fn sink(&self) -> Self {
        self.clone()
    }

    /// Register a topic and return its stream
    ///
    /// The subscribe frame is sent right away when an attached connection is
    /// open, and replayed on every later `attach`. Subscribing to a topic
    /// again replaces its frame and ends the previous stream.
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        subscribe_frame: impl Into<Frame>,
    ) -> Result<TopicStream, SendError> {
        let topic = topic.into();
        let subscribe_frame = subscribe_frame.into();
        let (sender, receiver) = unbounded();

        let mut registry = self.inner.registry.write();
        if let Some(connection) = registry.connection.as_ref().filter(|c| c.is_open()) {
            connection.send(subscribe_frame.clone())?;
        }
        if registry
            .topics
            .insert(
                topic.clone(),
                Subscription {
                    sender,
                    subscribe_frame,
                },
            )
            .is_some()
        {
            debug!("Topic {} re-subscribed; previous stream ended", topic);
        }

        info!("Subscribed to topic {}", topic);
        Ok(TopicStream { topic, receiver })
    }

    /// Forget a topic; returns whether it was subscribed
    ///
    /// `unsubscribe_frame` is sent when an attached connection is open.
    pub fn unsubscribe(
        &self,
        topic: &str,
        unsubscribe_frame: Option<Frame>,
    ) -> Result<bool, SendError> {
        let mut registry = self.inner.registry.write();
        let removed = registry.topics.remove(topic).is_some();

        if let (Some(frame), Some(connection)) = (unsubscribe_frame, registry.connection.as_ref()) {
            if connection.is_open() {
                connection.send(frame)?;
            }
        }

        if removed {
            info!("Unsubscribed from topic {}", topic);
        }
        Ok(removed)
    }

    /// Send through the attached connection
    pub fn send(&self, frame: impl Into<Frame>) -> Result<(), SendError> {
        match &self.inner.registry.read().connection {
            Some(connection) => connection.send(frame),
            None => Err(SendError::NotOpen {
                state: ConnectionState::Connecting,
            }),
        }
    }

    /// Use `connection` for outbound traffic once it is ready
    ///
    /// Waits for the handshake, then replays every registered subscribe
    /// frame. A collaborator that reconnects attaches each fresh handle.
    pub async fn attach(&self, connection: &ConnectionHandle) -> Result<(), HandshakeError> {
        connection.on_ready().await?;

        let mut registry = self.inner.registry.write();
        let mut replayed = 0;
        for (topic, subscription) in &registry.topics {
            match connection.send(subscription.subscribe_frame.clone()) {
                Ok(()) => replayed += 1,
                Err(e) => warn!("Failed to replay subscription for {}: {}", topic, e),
            }
        }
        registry.connection = Some(connection.clone());

        info!(
            "Attached to {} ({} subscriptions replayed)",
            connection.endpoint(),
            replayed
        );
        Ok(())
    }

    /// Currently attached connection, if any
    pub fn connection(&self) -> Option<ConnectionHandle> {
        self.inner.registry.read().connection.clone()
    }

    /// Stream of payloads whose topic is unknown or unsubscribed
    ///
    /// Without a fallback such payloads are logged and dropped.
    pub fn fallback(&self) -> TopicStream {
        let (sender, receiver) = unbounded();
        self.inner.registry.write().fallback = Some(sender);
        TopicStream {
            topic: String::new(),
            receiver,
        }
    }

    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inner.registry.read().topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.inner.registry.read().topics.contains_key(topic)
    }

    fn route(&self, payload: Payload) {
        let topic = self.inner.resolver.resolve(&payload);

        let dead = {
            let registry = self.inner.registry.read();
            let subscription = topic.as_deref().and_then(|t| registry.topics.get(t));
            match (subscription, &registry.fallback) {
                (Some(subscription), _) => match subscription.sender.send(payload) {
                    Ok(()) => None,
                    Err(_) => Some(subscription.sender.clone()),
                },
                (None, Some(fallback)) => {
                    if fallback.send(payload).is_err() {
                        debug!("Fallback stream dropped");
                    }
                    None
                }
                (None, None) => {
                    warn!("No subscription for topic {:?}; dropping message", topic);
                    None
                }
            }
        };

        // Receiver gone: stop routing to a dead stream
        if let (Some(topic), Some(dead)) = (topic, dead) {
            self.prune(&topic, &dead);
        }
    }

    /// Remove `topic` only while it still points at the dead channel
    fn prune(&self, topic: &str, dead: &Sender<Payload>) {
        let mut registry = self.inner.registry.write();
        if registry
            .topics
            .get(topic)
            .map_or(false, |s| s.sender.same_channel(dead))
        {
            debug!("Stream for topic {} dropped, removing subscription", topic);
            registry.topics.remove(topic);
        }
    }
}

impl MessageSink for Multiplexer {
    fn on_text(&mut self, text: String) {
        self.route(Payload::Text(text));
    }

    fn on_binary(&mut self, data: Vec<u8>) {
        self.route(Payload::Binary(data));
    }
}

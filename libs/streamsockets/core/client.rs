use crate::core::config::ConnectionConfig;
use crate::core::connection_state::{AtomicMetrics, ConnectionState};
use crate::core::handshake::{classify_codec_error, HandshakeCoordinator, HandshakeInfo};
use crate::core::heartbeat::{Keepalive, KeepaliveTick};
use crate::core::session::{Directive, Inbound, Session};
use crate::core::state_machine::ConnectionStateMachine;
use crate::error::{ConnectionError, HandshakeError, SendError, TransportError};
use crate::frame::{Frame, CLOSE_NORMAL};
use crate::headers::Headers;
use crate::observer::{ChannelObserver, ConnectionEvent, ConnectionObserver};
use crate::sink::MessageSink;
use crossbeam_channel::{unbounded, Receiver};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_tungstenite::tungstenite::error::ProtocolError as WsProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{client_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Internal command messages for the driver task
#[derive(Debug)]
enum Outbound {
    /// Write a frame; `ack` receives the write result when present
    Frame {
        frame: Frame,
        ack: Option<oneshot::Sender<Result<(), SendError>>>,
    },
    /// Start the closing handshake (state is already `Closing`)
    Close { code: u16, reason: String },
}

/// Connection metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub pings_answered: u64,
    pub pongs_received: u64,
    pub connection_state: ConnectionState,
}

struct Shared {
    endpoint: String,
    machine: Arc<ConnectionStateMachine>,
    metrics: Arc<AtomicMetrics>,
    outbound: mpsc::UnboundedSender<Outbound>,
    /// Wakes the driver when the connection is abandoned before `Open`
    abort: Arc<Notify>,
    events: Receiver<ConnectionEvent>,
}

/// Handle to one WebSocket connection
///
/// Returned immediately by `connect`; the handshake runs in a background
/// task. Cloning the handle is cheap and every clone controls the same
/// connection. A handle never reconnects: once the state is `Closed` or
/// `Failed` the owner builds a new connection.
///
/// # Example
///
/// ```rust,ignore
/// let conn = streamsockets::connect(
///     "wss://stream.example.com/feed",
///     |text| println!("text: {}", text),
///     |bytes| println!("{} bytes", bytes.len()),
/// );
///
/// conn.on_ready().await?;
/// conn.send(Payload::Text(r#"{"op":"subscribe"}"#.into()))?;
/// ```
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
}

impl ConnectionHandle {
    /// Start a connection: spawns the driver task on the current tokio runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub(crate) fn spawn<S: MessageSink>(config: ConnectionConfig, sink: S) -> Self {
        let machine = Arc::new(ConnectionStateMachine::new());
        let metrics = Arc::new(AtomicMetrics::new());

        let (event_tx, events) = unbounded();
        machine.observe(Arc::new(ChannelObserver::new(event_tx)));
        for observer in &config.observers {
            machine.observe(Arc::clone(observer));
        }

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let abort = Arc::new(Notify::new());

        let handshake = HandshakeCoordinator::new(config.endpoint.clone(), config.subprotocols.clone());
        let session = Session::new(Arc::clone(&machine), handshake, sink, Arc::clone(&metrics));

        info!("Connecting to {}", config.endpoint);
        let endpoint = config.endpoint.clone();
        tokio::spawn(run_connection(
            config,
            session,
            Arc::clone(&metrics),
            outbound_rx,
            Arc::clone(&abort),
        ));

        Self {
            shared: Arc::new(Shared {
                endpoint,
                machine,
                metrics,
                outbound,
                abort,
                events,
            }),
        }
    }

    /// Resolves once the connection is open, or with the handshake failure
    ///
    /// Every caller observes the same outcome, including callers that ask
    /// after the fact.
    pub async fn on_ready(&self) -> Result<(), HandshakeError> {
        self.shared.machine.ready().await
    }

    /// Queue a frame for sending
    ///
    /// Only accepted while `Open`. Frames queued by one caller go out in the
    /// order they were queued. A Close frame starts the closing handshake
    /// instead, exactly like [`close_with`](Self::close_with).
    pub fn send(&self, frame: impl Into<Frame>) -> Result<(), SendError> {
        match frame.into() {
            Frame::Close { code, reason } => {
                self.close_with(code, reason);
                Ok(())
            }
            frame => self.enqueue(frame, None),
        }
    }

    /// Queue a frame and wait until it was written (or failed to be)
    pub async fn send_confirmed(&self, frame: impl Into<Frame>) -> Result<(), SendError> {
        let frame = match frame.into() {
            Frame::Close { code, reason } => {
                self.close_with(code, reason);
                return Ok(());
            }
            frame => frame,
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        self.enqueue(frame, Some(ack_tx))?;
        match ack_rx.await {
            Ok(result) => result,
            Err(_) => Err(SendError::Closed {
                state: self.state(),
            }),
        }
    }

    pub fn send_text(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.send(Frame::Text(text.into()))
    }

    pub fn send_binary(&self, data: impl Into<Vec<u8>>) -> Result<(), SendError> {
        self.send(Frame::Binary(data.into()))
    }

    /// Close with code 1000
    pub fn close(&self) {
        self.close_with(CLOSE_NORMAL, "");
    }

    /// Close the connection
    ///
    /// Idempotent. Before the handshake completes the connection fails with
    /// [`HandshakeError::Aborted`]; once open it goes through `Closing` and
    /// ends `Closed` with `code` after the peer answers or the close timeout
    /// runs out.
    pub fn close_with(&self, code: u16, reason: impl Into<String>) {
        let reason = reason.into();
        let machine = &self.shared.machine;
        loop {
            match machine.state() {
                ConnectionState::Connecting | ConnectionState::Handshaking => {
                    if machine.fail(HandshakeError::Aborted) {
                        debug!("Connection to {} aborted before open", self.shared.endpoint);
                        self.shared.abort.notify_one();
                        return;
                    }
                }
                ConnectionState::Open => {
                    if machine.begin_close() {
                        let request = Outbound::Close {
                            code,
                            reason: reason.clone(),
                        };
                        if self.shared.outbound.send(request).is_err() {
                            // Driver already gone; nothing left to negotiate
                            machine.finish_close(code, reason);
                        }
                        return;
                    }
                }
                ConnectionState::Closing | ConnectionState::Closed | ConnectionState::Failed => {
                    return;
                }
            }
        }
    }

    /// Get current connection state
    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.shared.machine.state()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Resolves with `Closed` or `Failed` once the connection is over
    pub async fn terminated(&self) -> ConnectionState {
        self.shared.machine.terminated().await
    }

    /// Receiver of lifecycle events
    ///
    /// All clones of the receiver share one queue; each event is delivered
    /// to exactly one of them.
    pub fn events(&self) -> Receiver<ConnectionEvent> {
        self.shared.events.clone()
    }

    /// Register a lifecycle observer; it sees events from now on
    pub fn observe(&self, observer: impl ConnectionObserver) {
        self.shared.machine.observe(Arc::new(observer));
    }

    /// Negotiated details, once open
    pub fn handshake_info(&self) -> Option<HandshakeInfo> {
        self.shared.machine.handshake_info()
    }

    /// Terminal failure cause, if the connection failed
    pub fn failure(&self) -> Option<ConnectionError> {
        self.shared.machine.failure()
    }

    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Get current metrics
    pub fn metrics(&self) -> Metrics {
        let metrics = &self.shared.metrics;
        Metrics {
            frames_sent: metrics.frames_sent(),
            frames_received: metrics.frames_received(),
            pings_answered: metrics.pings_answered(),
            pongs_received: metrics.pongs_received(),
            connection_state: self.state(),
        }
    }

    fn enqueue(
        &self,
        frame: Frame,
        ack: Option<oneshot::Sender<Result<(), SendError>>>,
    ) -> Result<(), SendError> {
        let state = self.state();
        match state {
            ConnectionState::Open => {}
            ConnectionState::Connecting | ConnectionState::Handshaking => {
                return Err(SendError::NotOpen { state });
            }
            ConnectionState::Closing | ConnectionState::Closed | ConnectionState::Failed => {
                return Err(SendError::Closed { state });
            }
        }

        self.shared
            .outbound
            .send(Outbound::Frame { frame, ack })
            .map_err(|_| SendError::Closed {
                state: self.state(),
            })
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

/// Driver task: handshake, then the read/write loop, then cleanup
async fn run_connection<S: MessageSink>(
    config: ConnectionConfig,
    mut session: Session<S>,
    metrics: Arc<AtomicMetrics>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    abort: Arc<Notify>,
) {
    let established = tokio::select! {
        biased;
        _ = abort.notified() => None,
        ws = with_timeout(config.handshake_timeout, establish(&config, &mut session)) => match ws {
            Ok(ws) => ws,
            Err(timeout) => {
                session.on_handshake_error(HandshakeError::Timeout(timeout));
                None
            }
        },
    };

    if let Some(ws) = established {
        info!("Connected to {}", config.endpoint);
        let (mut write, mut read) = ws.split();
        message_loop(
            &mut write,
            &mut read,
            &config,
            &mut session,
            &metrics,
            &mut outbound_rx,
        )
        .await;
    }

    // Anything still queued can no longer be written
    outbound_rx.close();
    let state = session.state();
    while let Ok(command) = outbound_rx.try_recv() {
        if let Outbound::Frame { ack: Some(ack), .. } = command {
            let _ = ack.send(Err(SendError::Closed { state }));
        }
    }

    debug!("Connection task for {} exiting ({})", config.endpoint, state);
}

async fn with_timeout<F: Future>(limit: Option<Duration>, future: F) -> Result<F::Output, Duration> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, future).await.map_err(|_| limit),
        None => Ok(future.await),
    }
}

/// TCP connect plus upgrade exchange; `Some` only when the session is open
async fn establish<S: MessageSink>(
    config: &ConnectionConfig,
    session: &mut Session<S>,
) -> Option<WsStream> {
    let headers = match &config.headers {
        Some(provider) => provider.get_headers().await,
        None => Headers::new(),
    };

    let (host, port) = session.prepare(&headers).ok()?;

    let tcp = match TcpStream::connect((host.as_str(), port)).await {
        Ok(tcp) => tcp,
        Err(e) => {
            error!("Failed to connect to {}:{}: {}", host, port, e);
            session.fail(TransportError::Io(e.to_string()));
            return None;
        }
    };
    if let Err(e) = tcp.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }

    let request = session.on_transport_active()?;
    debug!("Transport active, sending upgrade request");

    let (ws, response) =
        match client_async_tls_with_config(request, tcp, Some(config.codec_config()), None).await {
            Ok((ws, response)) => (Some(ws), response),
            Err(e) => match classify_codec_error(e) {
                Ok(response) => (None, response),
                Err(handshake_error) => {
                    session.on_handshake_error(handshake_error);
                    return None;
                }
            },
        };

    session.on_inbound(Inbound::Upgrade(response));
    if session.state() == ConnectionState::Open {
        ws
    } else {
        None
    }
}

/// What woke the message loop
enum Wake {
    Read(Option<Result<Message, WsError>>),
    Command(Option<Outbound>),
    Keepalive(KeepaliveTick),
}

/// Main message processing loop for an open connection
async fn message_loop<S: MessageSink>(
    write: &mut WsWrite,
    read: &mut WsRead,
    config: &ConnectionConfig,
    session: &mut Session<S>,
    metrics: &AtomicMetrics,
    outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>,
) {
    let mut keepalive = config.keepalive.map(Keepalive::new);

    loop {
        let wake = tokio::select! {
            msg = read.next() => Wake::Read(msg),
            cmd = outbound_rx.recv() => Wake::Command(cmd),
            tick = async {
                match keepalive.as_mut() {
                    Some(keepalive) => keepalive.tick().await,
                    None => std::future::pending().await,
                }
            } => Wake::Keepalive(tick),
        };

        match wake {
            Wake::Read(msg) => {
                let directive = match msg {
                    Some(Ok(msg)) => match Frame::try_from(msg) {
                        Ok(frame) => session.on_inbound(Inbound::Frame(frame)),
                        Err(e) => session.fail(e),
                    },
                    Some(Err(e)) => match inbound_from_error(e) {
                        Ok(inbound) => session.on_inbound(inbound),
                        Err(transport) => session.fail(transport),
                    },
                    None => {
                        warn!("WebSocket stream closed");
                        session.fail(TransportError::StreamEnded)
                    }
                };

                match directive {
                    Directive::Continue => {}
                    Directive::Reply(reply) => {
                        let is_pong = matches!(reply, Frame::Pong(_));
                        if let Err(e) = write_frame(write, reply, metrics).await {
                            session.fail(e);
                            return;
                        }
                        if is_pong {
                            metrics.increment_pings_answered();
                        }
                    }
                    Directive::Pong(payload) => {
                        if let Some(keepalive) = &keepalive {
                            keepalive.on_pong(&payload);
                        }
                    }
                    Directive::Close { code, reason } => {
                        // Codec already queued the close reply; flush it out
                        if let Err(e) = write.close().await {
                            debug!("Error flushing close reply: {}", e);
                        }
                        session.finish_close(code, reason);
                        return;
                    }
                    Directive::Stop => return,
                }
            }

            Wake::Command(Some(Outbound::Frame { frame, ack })) => {
                // A Closing set by close_with is always queued behind this frame
                if session.state().is_terminal() {
                    if let Some(ack) = ack {
                        let _ = ack.send(Err(SendError::Closed {
                            state: session.state(),
                        }));
                    }
                    continue;
                }
                match write_frame(write, frame, metrics).await {
                    Ok(()) => {
                        if let Some(ack) = ack {
                            let _ = ack.send(Ok(()));
                        }
                    }
                    Err(e) => {
                        if let Some(ack) = ack {
                            let _ = ack.send(Err(SendError::Transport(e.clone())));
                        }
                        session.fail(e);
                        return;
                    }
                }
            }

            Wake::Command(Some(Outbound::Close { code, reason })) => {
                info!("Closing connection to {} (code {})", config.endpoint, code);
                close_gracefully(write, read, session, metrics, config.close_timeout, code, reason)
                    .await;
                return;
            }

            Wake::Command(None) => {
                // Every handle dropped; nobody can use the connection anymore
                debug!("All connection handles dropped, closing");
                session.machine().begin_close();
                close_gracefully(
                    write,
                    read,
                    session,
                    metrics,
                    config.close_timeout,
                    CLOSE_NORMAL,
                    String::new(),
                )
                .await;
                return;
            }

            Wake::Keepalive(KeepaliveTick::Ping(ping)) => {
                if let Err(e) = write_frame(write, ping, metrics).await {
                    session.fail(e);
                    return;
                }
            }

            Wake::Keepalive(KeepaliveTick::Expired(timeout)) => {
                session.fail(TransportError::KeepaliveTimeout(timeout));
                let _ = write.close().await;
                return;
            }
        }
    }
}

/// Send our Close, then wait for the peer's answer
///
/// Inbound data is no longer dispatched. The connection ends `Closed` with
/// the locally requested code whether the peer answers, drops the stream or
/// stays silent past `timeout`.
async fn close_gracefully<S: MessageSink>(
    write: &mut WsWrite,
    read: &mut WsRead,
    session: &mut Session<S>,
    metrics: &AtomicMetrics,
    timeout: Duration,
    code: u16,
    reason: String,
) {
    if let Err(e) = write_frame(write, Frame::close(code, reason.clone()), metrics).await {
        debug!("Failed to send close frame: {}", e);
        session.finish_close(code, reason);
        return;
    }

    let answered = tokio::time::timeout(timeout, async {
        while let Some(msg) = read.next().await {
            let Ok(msg) = msg else {
                return false;
            };
            let Ok(frame) = Frame::try_from(msg) else {
                continue;
            };
            if let Directive::Close { .. } = session.on_inbound(Inbound::Frame(frame)) {
                return true;
            }
        }
        false
    })
    .await;

    match answered {
        Ok(true) => debug!("Peer acknowledged close"),
        Ok(false) => debug!("Stream ended while closing"),
        Err(_) => warn!("No close reply within {:?}", timeout),
    }
    session.finish_close(code, reason);
}

async fn write_frame(
    write: &mut WsWrite,
    frame: Frame,
    metrics: &AtomicMetrics,
) -> Result<(), TransportError> {
    write.send(Message::from(frame)).await.map_err(|e| {
        error!("WebSocket write failed: {}", e);
        TransportError::WriteFailed(e.to_string())
    })?;
    metrics.increment_sent();
    Ok(())
}

/// Sort a codec error on an open connection into protocol vs transport
fn inbound_from_error(error: WsError) -> Result<Inbound, TransportError> {
    match error {
        WsError::Http(response) => Ok(Inbound::Upgrade(response)),
        WsError::Io(e) => Err(TransportError::Io(e.to_string())),
        WsError::ConnectionClosed
        | WsError::AlreadyClosed
        | WsError::Protocol(WsProtocolError::ResetWithoutClosingHandshake) => {
            Err(TransportError::StreamEnded)
        }
        other => Ok(Inbound::Malformed(other.to_string())),
    }
}

//! Message sinks
//!
//! A sink receives the payloads of inbound data frames. Each connection owns
//! exactly one sink and calls it from its single driver task, so the two
//! callbacks are never invoked concurrently for the same connection and
//! always in wire order.
//!
//! ```text
//! WebSocket → Codec → Dispatcher ─┬─ Text   → on_text(String)
//!                                 └─ Binary → on_binary(Vec<u8>)
//! ```

/// Receiver for inbound text and binary payloads
///
/// # Important
/// Callbacks run on the connection's driver task. Long blocking work delays
/// every following frame on that connection (including automatic pong
/// replies), so hand heavy processing off to a channel or thread.
///
/// # Example
///
/// ```ignore
/// struct Recorder {
///     seen: Vec<String>,
/// }
///
/// impl MessageSink for Recorder {
///     fn on_text(&mut self, text: String) {
///         self.seen.push(text);
///     }
///
///     fn on_binary(&mut self, _data: Vec<u8>) {}
/// }
/// ```
pub trait MessageSink: Send + 'static {
    /// Called once per inbound text frame, payload untouched
    fn on_text(&mut self, text: String);

    /// Called once per inbound binary frame
    ///
    /// The buffer is handed over to the sink; the connection keeps no alias
    /// to it.
    fn on_binary(&mut self, data: Vec<u8>);
}

/// Sink built from two independent closures
pub struct FnSink<T, B> {
    on_text: T,
    on_binary: B,
}

impl<T, B> FnSink<T, B>
where
    T: FnMut(String) + Send + 'static,
    B: FnMut(Vec<u8>) + Send + 'static,
{
    pub fn new(on_text: T, on_binary: B) -> Self {
        Self { on_text, on_binary }
    }
}

impl<T, B> MessageSink for FnSink<T, B>
where
    T: FnMut(String) + Send + 'static,
    B: FnMut(Vec<u8>) + Send + 'static,
{
    fn on_text(&mut self, text: String) {
        (self.on_text)(text)
    }

    fn on_binary(&mut self, data: Vec<u8>) {
        (self.on_binary)(data)
    }
}

/// A sink that discards everything
pub struct NoOpSink;

impl MessageSink for NoOpSink {
    fn on_text(&mut self, _text: String) {}

    fn on_binary(&mut self, _data: Vec<u8>) {}
}

impl MessageSink for Box<dyn MessageSink> {
    fn on_text(&mut self, text: String) {
        (**self).on_text(text)
    }

    fn on_binary(&mut self, data: Vec<u8>) {
        (**self).on_binary(data)
    }
}

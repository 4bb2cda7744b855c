//! Topic resolution
//!
//! The connection core never knows which logical channel a message belongs
//! to. A [`TopicResolver`] supplies that knowledge at the multiplexer edge:
//!
//! ```text
//! on_text / on_binary → Payload → TopicResolver → topic → TopicStream
//!                                       ↓ None
//!                                 fallback stream (or dropped)
//! ```

use crate::frame::Payload;
use serde_json::Value;

/// Extracts the topic an inbound payload belongs to
///
/// Runs on the connection's driver task for every data frame, so keep it
/// cheap.
///
/// # Example
///
/// ```ignore
/// struct PrefixTopic;
///
/// impl TopicResolver for PrefixTopic {
///     fn resolve(&self, payload: &Payload) -> Option<String> {
///         let text = payload.as_text()?;
///         text.split_once(':').map(|(topic, _)| topic.to_string())
///     }
/// }
/// ```
pub trait TopicResolver: Send + Sync + 'static {
    fn resolve(&self, payload: &Payload) -> Option<String>;
}

impl<F> TopicResolver for F
where
    F: Fn(&Payload) -> Option<String> + Send + Sync + 'static,
{
    fn resolve(&self, payload: &Payload) -> Option<String> {
        self(payload)
    }
}

/// Resolves the topic from a field of a JSON message
///
/// Text payloads are parsed as JSON; binary payloads too when they hold
/// UTF-8 JSON. String values are used as-is, numbers and booleans in
/// their JSON spelling. Anything else resolves to no topic.
#[derive(Debug, Clone)]
pub struct JsonFieldTopic {
    pointer: String,
}

impl JsonFieldTopic {
    /// Top-level field, e.g. `"channel"`
    pub fn field(name: &str) -> Self {
        Self {
            pointer: format!("/{}", escape_pointer_token(name)),
        }
    }

    /// RFC 6901 JSON pointer, e.g. `"/arg/channel"`
    pub fn pointer(pointer: impl Into<String>) -> Self {
        Self {
            pointer: pointer.into(),
        }
    }

    fn topic_of(&self, value: &Value) -> Option<String> {
        match value.pointer(&self.pointer)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl TopicResolver for JsonFieldTopic {
    fn resolve(&self, payload: &Payload) -> Option<String> {
        let value: Value = match payload {
            Payload::Text(text) => serde_json::from_str(text).ok()?,
            Payload::Binary(data) => serde_json::from_slice(data).ok()?,
        };
        self.topic_of(&value)
    }
}

fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

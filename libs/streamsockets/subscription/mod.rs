//! # Subscription multiplexing
//!
//! Edge between one connection and the many logical topics carried over it.
//! The connection core only knows "a text or binary message arrived"; this
//! module maps those messages onto per-topic streams and keeps the subscribe
//! frames needed to re-subscribe a fresh connection.

pub mod multiplexer;
pub mod topic;

pub use multiplexer::{Multiplexer, TopicStream};
pub use topic::{JsonFieldTopic, TopicResolver};

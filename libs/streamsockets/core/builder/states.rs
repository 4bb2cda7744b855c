/// Type-state markers for the builder pattern
///
/// These types track which required fields have been set in the builder at
/// compile-time, so `connect()` only exists once an endpoint and a message
/// sink are configured.

use std::marker::PhantomData;

/// Marker trait for endpoint state
pub trait EndpointState {}

/// Endpoint has not been set
pub struct NoEndpoint;
impl EndpointState for NoEndpoint {}

/// Endpoint has been set
pub struct HasEndpoint;
impl EndpointState for HasEndpoint {}

/// Marker trait for sink state
pub trait SinkState {}

/// Sink has not been set
pub struct NoSink;
impl SinkState for NoSink {}

/// Sink has been set
pub struct HasSink;
impl SinkState for HasSink {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<E, S> {
    _endpoint: PhantomData<E>,
    _sink: PhantomData<S>,
}

impl<E, S> TypeState<E, S> {
    pub(crate) fn new() -> Self {
        Self {
            _endpoint: PhantomData,
            _sink: PhantomData,
        }
    }
}

impl<E, S> Default for TypeState<E, S> {
    fn default() -> Self {
        Self::new()
    }
}

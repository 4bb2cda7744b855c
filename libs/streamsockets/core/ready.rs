//! Single-fire readiness slot
//!
//! Resolved exactly once with the handshake outcome. Any number of callers
//! may wait on it, before or after resolution; late callers get the stored
//! outcome immediately.

use crate::error::HandshakeError;
use tokio::sync::watch;

type Outcome = Option<Result<(), HandshakeError>>;

pub struct ReadySignal {
    slot: watch::Sender<Outcome>,
}

impl ReadySignal {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Store the outcome if none is stored yet
    ///
    /// Returns false when the slot was already resolved; the first outcome
    /// wins and later ones are discarded.
    pub fn resolve(&self, outcome: Result<(), HandshakeError>) -> bool {
        let mut outcome = Some(outcome);
        self.slot.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = outcome.take();
            true
        })
    }

    /// Peek at the outcome without waiting
    pub fn outcome(&self) -> Outcome {
        self.slot.borrow().clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Wait for the outcome
    pub async fn wait(&self) -> Result<(), HandshakeError> {
        let mut rx = self.slot.subscribe();
        let outcome = match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(resolved) => resolved.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(HandshakeError::Aborted))
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

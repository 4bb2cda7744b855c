//! Lock-free connection state and metrics
//!
//! The state is stored in an `AtomicU8` so that `state()` snapshots are a
//! single atomic load, and every transition is a compare-exchange checked
//! against the transition table below.
//!
//! ```text
//! Connecting → Handshaking → Open → Closing → Closed
//!      │            │          │       │
//!      └────────────┴──────────┴───────┴────→ Failed
//!                              └────────────→ Closed
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Lifecycle state of a single connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Handshaking = 1,
    Open = 2,
    Closing = 3,
    Closed = 4,
    Failed = 5,
}

impl ConnectionState {
    #[inline]
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Handshaking,
            2 => ConnectionState::Open,
            3 => ConnectionState::Closing,
            4 => ConnectionState::Closed,
            _ => ConnectionState::Failed,
        }
    }

    /// Closed or Failed; no transition leaves a terminal state
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }

    /// Check whether `next` is reachable from `self` in one step
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Connecting, Handshaking) => true,
            (Handshaking, Open) => true,
            (Open, Closing) | (Open, Closed) => true,
            (Closing, Closed) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Handshaking => "handshaking",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Atomic wrapper around [`ConnectionState`]
pub struct AtomicConnectionState {
    inner: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            inner: AtomicU8::new(state as u8),
        }
    }

    /// Point-in-time read
    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.inner.load(Ordering::Acquire))
    }

    /// Single compare-exchange, no transition check
    pub fn compare_exchange(
        &self,
        current: ConnectionState,
        new: ConnectionState,
    ) -> Result<ConnectionState, ConnectionState> {
        self.inner
            .compare_exchange(current as u8, new as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(ConnectionState::from_u8)
            .map_err(ConnectionState::from_u8)
    }

    /// Move to `next` if the transition table allows it from the current state
    ///
    /// Returns the previous state on success, or the current state when the
    /// transition is not allowed. Racing callers see exactly one winner.
    pub fn advance(&self, next: ConnectionState) -> Result<ConnectionState, ConnectionState> {
        let mut current = self.get();
        loop {
            if !current.can_transition_to(next) {
                return Err(current);
            }
            match self.compare_exchange(current, next) {
                Ok(previous) => return Ok(previous),
                Err(actual) => current = actual,
            }
        }
    }

    /// Advance only if the current state is exactly `from`
    pub fn advance_from(
        &self,
        from: ConnectionState,
        next: ConnectionState,
    ) -> Result<ConnectionState, ConnectionState> {
        if !from.can_transition_to(next) {
            return Err(self.get());
        }
        self.compare_exchange(from, next)
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.get() == ConnectionState::Open
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.get().is_terminal()
    }
}

/// Per-connection counters
#[derive(Default)]
pub struct AtomicMetrics {
    frames_received: AtomicU64,
    frames_sent: AtomicU64,
    pings_answered: AtomicU64,
    pongs_received: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_pings_answered(&self) {
        self.pings_answered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_pongs_received(&self) {
        self.pongs_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn pings_answered(&self) -> u64 {
        self.pings_answered.load(Ordering::Relaxed)
    }

    pub fn pongs_received(&self) -> u64 {
        self.pongs_received.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    #[test]
    fn test_happy_path_transitions() {
        let state = AtomicConnectionState::new(Connecting);
        assert_eq!(state.advance(Handshaking), Ok(Connecting));
        assert_eq!(state.advance(Open), Ok(Handshaking));
        assert_eq!(state.advance(Closing), Ok(Open));
        assert_eq!(state.advance(Closed), Ok(Closing));
        assert!(state.is_terminal());
    }

    #[test]
    fn test_illegal_transitions_are_refused() {
        let state = AtomicConnectionState::new(Connecting);
        assert_eq!(state.advance(Open), Err(Connecting));
        assert_eq!(state.advance(Closed), Err(Connecting));
        assert_eq!(state.get(), Connecting);
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        for terminal in [Closed, Failed] {
            for next in [Connecting, Handshaking, Open, Closing, Closed, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_failed_reachable_from_every_live_state() {
        for from in [Connecting, Handshaking, Open, Closing] {
            assert!(from.can_transition_to(Failed), "{} -> failed", from);
        }
    }

    #[test]
    fn test_advance_from_requires_exact_state() {
        let state = AtomicConnectionState::new(Open);
        assert_eq!(state.advance_from(Closing, Closed), Err(Open));
        assert_eq!(state.advance_from(Open, Closing), Ok(Open));
    }
}

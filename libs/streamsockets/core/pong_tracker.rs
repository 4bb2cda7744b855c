//! PONG Response Tracker
//!
//! Tracks keepalive pings by sequence number so a connection whose peer has
//! stopped answering can be detected. Only a pong that echoes the payload of
//! an outstanding ping acknowledges it; unsolicited pongs are ignored here.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Lock-free tracker for keepalive ping/pong pairs
///
/// Timestamps are stored as milliseconds since an internal epoch, offset
/// by one so that zero can mean "never".
pub struct PongTracker {
    epoch: Instant,
    /// Sequence number of the last ping sent (0 = none yet)
    last_ping_seq: AtomicU64,
    /// When the oldest unacknowledged ping was sent (ms since epoch + 1, 0 = none)
    outstanding_since_ms: AtomicU64,
    /// Highest sequence number acknowledged by a matching pong
    acked_seq: AtomicU64,
    last_pong_ms: AtomicU64,
    timeout: Duration,
}

impl PongTracker {
    /// Create a tracker; `timeout` is how long a ping may stay unanswered
    pub fn new(timeout: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            last_ping_seq: AtomicU64::new(0),
            outstanding_since_ms: AtomicU64::new(0),
            acked_seq: AtomicU64::new(0),
            last_pong_ms: AtomicU64::new(0),
            timeout,
        }
    }

    #[inline]
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64 + 1
    }

    /// Record that ping `seq` was just written
    pub fn record_ping_sent(&self, seq: u64) {
        self.last_ping_seq.store(seq, Ordering::Release);
        // Keep the timestamp of the oldest unanswered ping
        let _ = self.outstanding_since_ms.compare_exchange(
            0,
            self.now_ms(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Record an inbound pong; returns true if it acknowledged a keepalive ping
    pub fn record_pong(&self, payload: &[u8]) -> bool {
        self.last_pong_ms.store(self.now_ms(), Ordering::Release);

        let Some(seq) = decode_sequence(payload) else {
            return false;
        };
        let sent = self.last_ping_seq.load(Ordering::Acquire);
        if seq == 0 || seq > sent {
            return false;
        }

        self.acked_seq.fetch_max(seq, Ordering::AcqRel);
        if seq == sent {
            self.outstanding_since_ms.store(0, Ordering::Release);
        }
        true
    }

    /// Check if the connection appears healthy
    ///
    /// Unhealthy only when a ping has been unanswered for longer than the
    /// timeout.
    pub fn is_healthy(&self) -> bool {
        let since = self.outstanding_since_ms.load(Ordering::Acquire);
        if since == 0 {
            return true;
        }
        if self.acked_seq.load(Ordering::Acquire) >= self.last_ping_seq.load(Ordering::Acquire) {
            return true;
        }
        self.now_ms().saturating_sub(since) < self.timeout.as_millis() as u64
    }

    /// Get time since the last pong of any kind, if one was ever received
    pub fn time_since_last_pong(&self) -> Option<Duration> {
        let pong_ms = self.last_pong_ms.load(Ordering::Acquire);
        if pong_ms == 0 {
            return None;
        }
        Some(Duration::from_millis(self.now_ms().saturating_sub(pong_ms)))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Keepalive pings carry their sequence number as 8 big-endian bytes
pub fn encode_sequence(seq: u64) -> Vec<u8> {
    seq.to_be_bytes().to_vec()
}

pub fn decode_sequence(payload: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = payload.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

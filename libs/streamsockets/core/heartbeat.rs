//! Client-initiated keepalive
//!
//! # Architecture
//!
//! The keepalive lives inside the driver's `select!` loop rather than in a
//! task of its own, so its pings go through the same single writer as every
//! other frame:
//!
//! ```text
//! ┌──────────── driver task ─────────────┐
//! │ select! {                            │
//! │   frame   = read.next()   → dispatch │
//! │   command = outbound.recv → write    │
//! │   tick    = keepalive     → Ping(n)  │──> WebSocket
//! │ }                                    │
//! └──────────────────────────────────────┘
//! ```
//!
//! Each ping carries its sequence number; the [`PongTracker`] acknowledges it
//! when the echoing pong comes back. If a pong timeout is configured and a
//! ping stays unanswered for longer, the tick reports the connection dead.

use crate::core::pong_tracker::{encode_sequence, PongTracker};
use crate::frame::Frame;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Keepalive settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveConfig {
    /// Time between pings
    pub interval: Duration,
    /// How long a ping may stay unanswered; `None` sends pings without checking
    pub pong_timeout: Option<Duration>,
}

/// Outcome of one keepalive tick
#[derive(Debug, PartialEq, Eq)]
pub enum KeepaliveTick {
    /// Send this ping
    Ping(Frame),
    /// A ping went unanswered past the timeout
    Expired(Duration),
}

pub struct Keepalive {
    ticker: Interval,
    tracker: Option<PongTracker>,
    sequence: u64,
}

impl Keepalive {
    pub fn new(config: KeepaliveConfig) -> Self {
        // First ping one interval after open, not immediately
        let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
        // If we miss ticks due to slow processing, skip them rather than bursting
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!("Keepalive started with interval: {:?}", config.interval);

        Self {
            ticker,
            tracker: config.pong_timeout.map(PongTracker::new),
            sequence: 0,
        }
    }

    /// Wait for the next tick
    pub async fn tick(&mut self) -> KeepaliveTick {
        self.ticker.tick().await;

        if let Some(tracker) = &self.tracker {
            if !tracker.is_healthy() {
                warn!("Keepalive ping unanswered for more than {:?}", tracker.timeout());
                return KeepaliveTick::Expired(tracker.timeout());
            }
        }

        self.sequence += 1;
        if let Some(tracker) = &self.tracker {
            tracker.record_ping_sent(self.sequence);
        }
        debug!("Keepalive tick - sending ping #{}", self.sequence);
        KeepaliveTick::Ping(Frame::Ping(encode_sequence(self.sequence)))
    }

    /// Feed an inbound pong
    pub fn on_pong(&self, payload: &[u8]) {
        if let Some(tracker) = &self.tracker {
            if !tracker.record_pong(payload) {
                debug!("Unsolicited pong ({} bytes)", payload.len());
            }
        }
    }

    pub fn pings_sent(&self) -> u64 {
        self.sequence
    }
}

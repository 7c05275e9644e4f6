//! Statistics and metrics for the multiplexer

use std::time::Duration;

use crate::upstream::{FrameOutcome, LinkState};

/// Running counters for upstream frame handling
#[derive(Debug, Clone, Default)]
pub struct DeliveryCounters {
    /// Notifications queued to a client
    pub delivered: u64,
    /// Notifications matched but dropped (client backed up or gone)
    pub dropped: u64,
    /// Notifications for remote ids with no live subscription
    pub unknown: u64,
    /// Subscribe acknowledgments recorded
    pub acknowledged: u64,
    /// Frames that failed to parse
    pub malformed: u64,
}

impl DeliveryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one handled frame
    pub fn record(&mut self, outcome: FrameOutcome) {
        match outcome {
            FrameOutcome::Delivered { .. } => self.delivered += 1,
            FrameOutcome::Dropped { .. } => self.dropped += 1,
            FrameOutcome::UnknownSubscription { .. } => self.unknown += 1,
            FrameOutcome::Acknowledged { .. } => self.acknowledged += 1,
            FrameOutcome::Malformed => self.malformed += 1,
            FrameOutcome::Ignored => {}
        }
    }
}

/// Point-in-time snapshot of the multiplexer
#[derive(Debug, Clone)]
pub struct MuxStats {
    /// Upstream connection state
    pub link_state: LinkState,
    /// Successful upstream connections (first connect included)
    pub upstream_connections: u64,
    /// Outbound frames dropped on a full writer queue
    pub upstream_dropped_frames: u64,
    /// Attached client sessions
    pub sessions: usize,
    /// Live subscriptions in the registry
    pub subscriptions: usize,
    /// Subscriptions acknowledged on the current connection
    pub acknowledged_subscriptions: usize,
    /// Frame handling counters
    pub counters: DeliveryCounters,
    /// Time since the multiplexer started
    pub uptime: Duration,
}

impl MuxStats {
    /// Reconnects performed after the first connection
    pub fn reconnects(&self) -> u64 {
        self.upstream_connections.saturating_sub(1)
    }

    /// Whether live notifications can currently flow
    pub fn is_live(&self) -> bool {
        self.link_state == LinkState::Open
    }
}

//! Tunnel counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct TunnelMetrics {
    /// Envelopes published to other domains
    pub outbound: AtomicU64,
    /// Envelopes from the broker delivered to the runtime
    pub inbound: AtomicU64,
    pub bounces: AtomicU64,
    /// Failures of bounces, dropped instead of bounced again
    pub bounces_suppressed: AtomicU64,
    pub lookups_started: AtomicU64,
    pub lookups_resolved: AtomicU64,
    pub lookups_timed_out: AtomicU64,
    pub discovery_replies: AtomicU64,
    pub announcements: AtomicU64,
    pub malformed: AtomicU64,
}

/// Point-in-time copy of [`TunnelMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TunnelStats {
    pub outbound: u64,
    pub inbound: u64,
    pub bounces: u64,
    pub bounces_suppressed: u64,
    pub lookups_started: u64,
    pub lookups_resolved: u64,
    pub lookups_timed_out: u64,
    pub discovery_replies: u64,
    pub announcements: u64,
    pub malformed: u64,
}

impl TunnelMetrics {
    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TunnelStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        TunnelStats {
            outbound: load(&self.outbound),
            inbound: load(&self.inbound),
            bounces: load(&self.bounces),
            bounces_suppressed: load(&self.bounces_suppressed),
            lookups_started: load(&self.lookups_started),
            lookups_resolved: load(&self.lookups_resolved),
            lookups_timed_out: load(&self.lookups_timed_out),
            discovery_replies: load(&self.discovery_replies),
            announcements: load(&self.announcements),
            malformed: load(&self.malformed),
        }
    }
}

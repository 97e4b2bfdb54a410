//! Shared mutable tunnel state
//!
//! Everything the components share lives in one [`TunnelState`] behind one
//! mutex in [`crate::TunnelContext`]. Critical sections only read and
//! update these maps; broker and runtime calls happen after the guard is
//! dropped.

use crate::cache::ResolutionCache;
use crate::route_table::RouteTable;
use broker_network::SubscriptionId;
use cells_types::{CorrelationId, Envelope};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

#[derive(Debug)]
pub struct TunnelState {
    /// Announced well-known actors per remote domain
    pub routes: RouteTable,
    /// Well-known routes this tunnel installed: actor -> domain
    pub installed: HashMap<String, String>,
    /// Actors exported by the local runtime
    pub exports: BTreeSet<String>,
    pub cache: ResolutionCache,
    pub pending: HashMap<CorrelationId, PendingLookup>,
    /// Domain queue consumers, keyed by domain
    pub subscriptions: BTreeMap<String, SubscriptionSlot>,
    pub closed: bool,
}

impl TunnelState {
    pub fn new(cache_ttl: Duration) -> Self {
        Self {
            routes: RouteTable::new(),
            installed: HashMap::new(),
            exports: BTreeSet::new(),
            cache: ResolutionCache::new(cache_ttl),
            pending: HashMap::new(),
            subscriptions: BTreeMap::new(),
            closed: false,
        }
    }
}

/// Envelope held while its destination domain is being discovered
#[derive(Debug)]
pub struct PendingLookup {
    pub actor: String,
    pub envelope: Envelope,
    pub started: Instant,
    /// Deadline task
    pub timer: AbortHandle,
}

impl PendingLookup {
    /// Cancel the deadline and release the held envelope
    pub fn release(self) -> Envelope {
        self.timer.abort();
        self.envelope
    }
}

/// Consumer of one domain queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionSlot {
    /// Claimed, subscribe call in flight
    Pending,
    Active(SubscriptionId),
}

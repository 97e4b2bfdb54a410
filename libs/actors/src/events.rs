//! Lifecycle and routing notifications
//!
//! Observers receive events over a broadcast channel. A slow observer can
//! lag; it then sees `RecvError::Lagged` and should resynchronize.

use cells_types::Route;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// Actor became addressable by name from other domains
    ActorExported(String),
    /// Actor is gone
    ActorDestroyed(String),
    RouteAdded(Route),
    RouteDeleted(Route),
}

impl RuntimeEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeEvent::ActorExported(_) => "actor-exported",
            RuntimeEvent::ActorDestroyed(_) => "actor-destroyed",
            RuntimeEvent::RouteAdded(_) => "route-added",
            RuntimeEvent::RouteDeleted(_) => "route-deleted",
        }
    }
}

/// Capacity of the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

//! Broker Network
//!
//! Publish/subscribe transport used by the tunnel to reach other domains.
//!
//! - [`BrokerTransport`]: the connection abstraction (publish, subscribe,
//!   temporary reply queues)
//! - [`BrokerMessage`] / [`Destination`]: opaque body plus the routing and
//!   correlation headers a broker carries
//! - [`MemoryBroker`]: in-process broker with queue and topic semantics,
//!   used for single-process deployments and tests

pub mod error;
pub mod memory;
pub mod message;
pub mod transport;

// Re-export commonly used types
pub use error::{Result, TransportError};
pub use memory::{BrokerStats, MemoryBroker, MemoryConnection};
pub use message::{BrokerMessage, Destination, Subscription, SubscriptionId};
pub use transport::BrokerTransport;

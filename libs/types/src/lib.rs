//! # Cells Types
//!
//! Shared vocabulary of the cells runtime and the broker tunnel.
//!
//! ## Contents
//!
//! - **Addressing**: [`ActorPath`] (`actor@domain`) with the `local`
//!   placeholder domain for names that still need resolution
//! - **Envelopes**: immutable [`Envelope`]s carrying a [`Payload`] that is
//!   either opaque data, a [`Bounce`] failure notice or a
//!   [`TopologyAnnouncement`]
//! - **Routes**: [`Route`] entries of the runtime routing table
//!
//! ## Quick Start
//! ```rust
//! use cells_types::{ActorPath, BounceReason, Envelope};
//!
//! let source: ActorPath = "client@alphaDomain".parse().unwrap();
//! let destination = ActorPath::local("PoolManager").unwrap();
//! let envelope = Envelope::data(source, destination, b"hello".to_vec());
//!
//! assert!(envelope.destination().is_local());
//! let tunnel: ActorPath = "tunnel@alphaDomain".parse().unwrap();
//! let notice = envelope.bounce(BounceReason::UnresolvedName, "timed out", tunnel).unwrap();
//! assert!(notice.bounce(BounceReason::UnresolvedName, "", notice.source().clone()).is_none());
//! ```

pub mod address;
pub mod envelope;
pub mod errors;
pub mod route;

pub use address::{ActorPath, LOCAL_DOMAIN};
pub use envelope::{
    Bounce, BounceReason, CorrelationId, Envelope, MessageId, Payload, TopologyAnnouncement,
};
pub use errors::AddressError;
pub use route::{Route, RouteKind};

//! # Broker Tunnel
//!
//! Gateway between a cells actor runtime and a publish/subscribe broker.
//! Each runtime domain runs one tunnel; tunnels of different domains talk
//! to each other only through broker destinations.
//!
//! ## Architecture
//!
//! ```text
//!   ┌────────────── domain A ──────────────┐            ┌──── domain B ────┐
//!   │ actors ──send──> LocalRuntime         │            │                  │
//!   │                  │ default route      │            │                  │
//!   │                  v                    │  queue     │                  │
//!   │              Tunnel ── Bridge ────────┼──cells.domain.B──> Tunnel     │
//!   │                 │  NameResolver ──────┼──topic cells.arp──> Responder │
//!   │                 │  <── reply queue ───┼─────────────────── reply      │
//!   │                 └─ RouteSynchronizer <┼──topic cells.topology──       │
//!   └───────────────────────────────────────┘            └──────────────────┘
//! ```
//!
//! - [`NameResolver`] resolves `actor@local` through a TTL cache or a
//!   discovery broadcast, holding the envelope until a reply or timeout.
//! - [`NameResponder`] answers discovery broadcasts for local exports.
//! - [`RouteSynchronizer`] turns announced remote actors into well-known
//!   routes of the runtime and manages per-domain queue consumers.
//! - [`Bridge`] forwards envelopes both ways and bounces failures back to
//!   their source, never bouncing a bounce.
//!
//! All shared state sits behind one lock that is never held across an
//! `.await`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use broker_network::MemoryBroker;
//! use broker_tunnel::Tunnel;
//! use cells_runtime::LocalRuntime;
//! use std::sync::Arc;
//! use tunnel_config::TunnelConfig;
//!
//! # async fn run() -> Result<(), broker_tunnel::TunnelError> {
//! let broker = MemoryBroker::new();
//! let runtime = Arc::new(LocalRuntime::new("alphaDomain"));
//! let tunnel = Tunnel::start(
//!     TunnelConfig::for_domain("alphaDomain"),
//!     Arc::new(broker.connection()),
//!     runtime,
//! )
//! .await?;
//! println!("{}", tunnel.snapshot());
//! tunnel.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod announcer;
pub mod bridge;
pub mod cache;
pub mod context;
pub mod error;
pub mod metrics;
pub mod resolver;
pub mod responder;
pub mod route_table;
pub mod snapshot;
pub mod state;
pub mod synchronizer;
mod tasks;
pub mod tunnel;

pub use announcer::TopologyAnnouncer;
pub use bridge::{Bridge, ForwardOutcome};
pub use cache::{CachedResolution, ResolutionCache};
pub use context::TunnelContext;
pub use error::{Result, TunnelError};
pub use metrics::{TunnelMetrics, TunnelStats};
pub use resolver::{LookupFailure, LookupOutcome, NameResolver};
pub use responder::NameResponder;
pub use route_table::RouteTable;
pub use snapshot::{CacheRecord, PendingRecord, TunnelSnapshot};
pub use synchronizer::{RouteDelta, RouteSynchronizer};
pub use tunnel::Tunnel;

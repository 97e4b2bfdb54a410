//! Cells Runtime Boundary
//!
//! The part of the actor ("cells") runtime that gateways talk to: routing
//! table maintenance, local delivery and lifecycle notifications.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐          ┌──────────────────────┐
//! │   ActorRuntime      │  events  │   Gateway            │
//! │                     │─────────>│   (broker tunnel)    │
//! │  mailboxes          │          │                      │
//! │  routing table      │<─────────│  register_route      │
//! │                     │  deliver │  remove_route        │
//! └─────────────────────┘          └──────────────────────┘
//! ```
//!
//! [`LocalRuntime`] is the in-process implementation used by the tunnel
//! binary and tests.
//!
//! # Examples
//!
//! ```rust
//! use cells_runtime::{ActorRuntime, LocalRuntime, Visibility};
//! use cells_types::{Envelope, Route};
//!
//! # tokio_test_block(async {
//! let runtime = LocalRuntime::new("alphaDomain");
//! let mut gateway = runtime.open_mailbox("tunnel", Visibility::Private).unwrap();
//! runtime.register_route(Route::default_route("tunnel")).unwrap();
//!
//! let envelope = Envelope::data(
//!     "door@alphaDomain".parse().unwrap(),
//!     "PoolManager@local".parse().unwrap(),
//!     b"hello".to_vec(),
//! );
//! runtime.send(envelope).unwrap();
//! assert!(gateway.recv().await.is_some());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod error;
pub mod events;
pub mod local;
pub mod registry;
pub mod runtime;

pub use error::{DeliveryFailure, Result, RuntimeError};
pub use events::RuntimeEvent;
pub use local::{LocalRuntime, RouteOperation, RuntimeStats};
pub use registry::{Mailbox, Visibility};
pub use runtime::ActorRuntime;

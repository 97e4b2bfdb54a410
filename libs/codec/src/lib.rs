//! # Cells Codec
//!
//! Wire format for everything the tunnel puts on the broker.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/network
//!     ↑           ↓            ↓
//! Envelope    Frame bytes   BrokerMessage body
//! ```
//!
//! ## What This Crate Contains
//! - [`Frame`]: envelope, discovery request/reply and topology frames
//! - Header with magic, version, length and CRC32 of the body
//! - Destination naming for per-domain queues ([`domain_queue_name`])
//!
//! Bodies are serialized with bincode. Decoding validates the header before
//! touching the body so a foreign or corrupted message is rejected cheaply.

pub mod constants;
pub mod error;
pub mod frame;
pub mod naming;

pub use constants::*;
pub use error::{CodecError, Result};
pub use frame::Frame;
pub use naming::{domain_queue_name, escape_domain};

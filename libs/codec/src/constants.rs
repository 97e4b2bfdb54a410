//! # Frame constants
//!
//! Values shared by every producer and consumer of tunnel frames. They must
//! stay stable across domains running different builds.
//!
//! ```text
//! ┌──────────┬─────────┬──────────┬──────────┬──────────────┐
//! │ magic u32│ ver u8  │ len u32  │ crc32 u32│ bincode body │
//! └──────────┴─────────┴──────────┴──────────┴──────────────┘
//!   big-endian header, HEADER_SIZE bytes      len bytes
//! ```

/// Identifies a tunnel frame ("CE11" + "F4A3")
pub const FRAME_MAGIC: u32 = 0xCE11_F4A3;

/// Current frame layout revision
pub const FRAME_VERSION: u8 = 1;

pub const HEADER_SIZE: usize = 4 + 1 + 4 + 4;

/// Upper bound on a frame body
pub const MAX_BODY_SIZE: usize = 4 * 1024 * 1024;

/// Default prefix of per-domain queues
pub const DEFAULT_QUEUE_PREFIX: &str = "cells.domain.";

/// Default topic carrying discovery requests
pub const DEFAULT_DISCOVERY_TOPIC: &str = "cells.arp";

/// Default topic carrying topology announcements
pub const DEFAULT_TOPOLOGY_TOPIC: &str = "cells.topology";

//! # Tunnel Error Types
//!
//! Only [`TunnelError::Startup`] and [`TunnelError::Config`] ever reach the
//! caller of [`crate::Tunnel::start`]. Everything else is handled inside the
//! tunnel (bounced, logged or dropped) and surfaces here only from component
//! operations.

use broker_network::TransportError;
use cells_codec::CodecError;
use cells_runtime::RuntimeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunnelError {
    /// Broker connection could not be established; the tunnel does not run
    #[error("Startup error: {message}")]
    Startup {
        message: String,
        #[source]
        source: Option<TransportError>,
    },

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Broker operation failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Runtime refused a routing or mailbox operation
    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// Operation attempted after shutdown
    #[error("Tunnel is shut down")]
    Closed,
}

/// Result type alias for tunnel operations
pub type Result<T> = std::result::Result<T, TunnelError>;

impl TunnelError {
    pub fn startup(message: impl Into<String>, source: TransportError) -> Self {
        Self::Startup {
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

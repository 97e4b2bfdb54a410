//! # Tunnel Configuration
//!
//! Configuration loading and logging bootstrap for the broker tunnel.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tunnel_config::{init_logging, TunnelConfig};
//!
//! let config = TunnelConfig::load(Some(std::path::Path::new("tunnel.toml")))?;
//! init_logging(&config.logging)?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod logging;
pub mod tunnel_config;

// Re-export commonly used types
pub use logging::init_logging;
pub use tunnel_config::{
    AnnounceSection, BrokerSection, DiscoverySection, LogFormat, LoggingConfig, RoutingSection,
    TunnelConfig, TunnelSection, ENV_PREFIX,
};

//! Tunnel Configuration Module
//!
//! Loads tunnel settings from a TOML file with `CELLS_TUNNEL`-prefixed
//! environment overrides. Nested keys use a double underscore, e.g.
//! `CELLS_TUNNEL_DISCOVERY__TIMEOUT_MS=5000`.
//!
//! Every section has defaults, so a file only needs `[tunnel] domain`.

use anyhow::{ensure, Context, Result};
use cells_codec::{DEFAULT_DISCOVERY_TOPIC, DEFAULT_QUEUE_PREFIX, DEFAULT_TOPOLOGY_TOPIC};
use config_crate::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Prefix of environment variables overriding file values
pub const ENV_PREFIX: &str = "CELLS_TUNNEL";

/// Complete tunnel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TunnelConfig {
    pub tunnel: TunnelSection,
    pub broker: BrokerSection,
    pub discovery: DiscoverySection,
    pub routing: RoutingSection,
    pub announce: AnnounceSection,
    pub logging: LoggingConfig,
}

/// Identity of this tunnel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSection {
    /// Actor name the tunnel registers in the runtime
    pub name: String,
    /// Domain served by this process; `${VAR}` references are expanded
    pub domain: String,
}

/// Broker destinations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSection {
    pub queue_prefix: String,
    pub discovery_topic: String,
    pub topology_topic: String,
    /// Capacity of each subscription channel
    pub subscription_buffer: usize,
    /// Upper bound on a single publish; a slower broker counts as a failure
    pub publish_timeout_ms: u64,
}

/// Name discovery timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub timeout_ms: u64,
    pub cache_ttl_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    /// Names with this prefix are topology markers and never routed
    pub reserved_prefix: String,
}

/// Periodic topology announcements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnounceSection {
    pub enabled: bool,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for TunnelSection {
    fn default() -> Self {
        Self {
            name: "tunnel".to_string(),
            domain: String::new(),
        }
    }
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            queue_prefix: DEFAULT_QUEUE_PREFIX.to_string(),
            discovery_topic: DEFAULT_DISCOVERY_TOPIC.to_string(),
            topology_topic: DEFAULT_TOPOLOGY_TOPIC.to_string(),
            subscription_buffer: 1024,
            publish_timeout_ms: 5_000,
        }
    }
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            cache_ttl_ms: 120_000,
        }
    }
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            reserved_prefix: "@".to_string(),
        }
    }
}

impl Default for AnnounceSection {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 120_000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl BrokerSection {
    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }
}

impl DiscoverySection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

impl AnnounceSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl TunnelConfig {
    /// Defaults for a tunnel serving `domain`
    pub fn for_domain(domain: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.tunnel.domain = domain.into();
        config
    }

    /// Load from an optional TOML file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading tunnel config: {:?}", path);
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: TunnelConfig = builder
            .build()
            .context("Failed to build tunnel configuration")?
            .try_deserialize()
            .context("Failed to deserialize tunnel configuration")?;

        config.finish()
    }

    /// Parse a TOML document without consulting the environment
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TunnelConfig = toml::from_str(text).context("Invalid tunnel configuration TOML")?;
        config.finish()
    }

    fn finish(mut self) -> Result<Self> {
        self.expand_env_vars()?;
        self.validate()?;
        debug!(domain = %self.tunnel.domain, name = %self.tunnel.name, "tunnel configuration ready");
        Ok(self)
    }

    /// Expand `${VAR}` references in the tunnel identity
    pub fn expand_env_vars(&mut self) -> Result<()> {
        self.tunnel.domain = shellexpand::env(&self.tunnel.domain)
            .context("Failed to expand tunnel domain")?
            .into_owned();
        self.tunnel.name = shellexpand::env(&self.tunnel.name)
            .context("Failed to expand tunnel name")?
            .into_owned();
        Ok(())
    }

    /// Reject settings the tunnel cannot run with
    pub fn validate(&self) -> Result<()> {
        let domain = &self.tunnel.domain;
        ensure!(!domain.is_empty(), "tunnel.domain must be set");
        ensure!(!domain.contains('@'), "tunnel.domain '{}' must not contain '@'", domain);
        ensure!(domain != "local", "tunnel.domain cannot be the placeholder 'local'");
        ensure!(!self.tunnel.name.is_empty(), "tunnel.name cannot be empty");

        ensure!(!self.broker.queue_prefix.is_empty(), "broker.queue_prefix cannot be empty");
        ensure!(!self.broker.discovery_topic.is_empty(), "broker.discovery_topic cannot be empty");
        ensure!(!self.broker.topology_topic.is_empty(), "broker.topology_topic cannot be empty");
        ensure!(
            self.broker.discovery_topic != self.broker.topology_topic,
            "discovery and topology topics must differ"
        );
        ensure!(self.broker.subscription_buffer > 0, "broker.subscription_buffer must be positive");
        ensure!(self.broker.publish_timeout_ms > 0, "broker.publish_timeout_ms must be positive");

        ensure!(self.discovery.timeout_ms > 0, "discovery.timeout_ms must be positive");
        ensure!(
            self.discovery.cache_ttl_ms >= self.discovery.timeout_ms,
            "discovery.cache_ttl_ms ({}) shorter than discovery.timeout_ms ({})",
            self.discovery.cache_ttl_ms,
            self.discovery.timeout_ms
        );

        ensure!(!self.routing.reserved_prefix.is_empty(), "routing.reserved_prefix cannot be empty");
        if self.announce.enabled {
            ensure!(self.announce.interval_ms > 0, "announce.interval_ms must be positive");
        }
        Ok(())
    }
}

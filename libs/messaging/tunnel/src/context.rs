//! Context shared by the tunnel components

use crate::error::{Result, TunnelError};
use crate::metrics::TunnelMetrics;
use crate::state::TunnelState;
use crate::tasks::TaskSet;
use broker_network::{BrokerMessage, BrokerTransport, Destination};
use bytes::Bytes;
use cells_codec::{domain_queue_name, Frame};
use cells_runtime::ActorRuntime;
use cells_types::{ActorPath, LOCAL_DOMAIN};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::trace;
use tunnel_config::TunnelConfig;

/// Configuration, collaborators and state of one tunnel
pub struct TunnelContext {
    config: TunnelConfig,
    address: ActorPath,
    pub(crate) state: Mutex<TunnelState>,
    transport: Arc<dyn BrokerTransport>,
    runtime: Arc<dyn ActorRuntime>,
    metrics: TunnelMetrics,
    reply_queue: Destination,
    pub(crate) announce_trigger: Notify,
    /// Discovery deadline tasks
    pub(crate) deadlines: TaskSet,
}

impl TunnelContext {
    pub fn new(
        config: TunnelConfig,
        transport: Arc<dyn BrokerTransport>,
        runtime: Arc<dyn ActorRuntime>,
        reply_queue: Destination,
    ) -> Result<Self> {
        let address = ActorPath::new(config.tunnel.name.clone(), config.tunnel.domain.clone())
            .map_err(|e| TunnelError::config(e.to_string()))?;
        let state = TunnelState::new(config.discovery.cache_ttl());
        Ok(Self {
            config,
            address,
            state: Mutex::new(state),
            transport,
            runtime,
            metrics: TunnelMetrics::default(),
            reply_queue,
            announce_trigger: Notify::new(),
            deadlines: TaskSet::default(),
        })
    }

    pub fn config(&self) -> &TunnelConfig {
        &self.config
    }

    /// `tunnel@domain`, the source of bounces and the target of routing info
    pub fn address(&self) -> &ActorPath {
        &self.address
    }

    pub fn domain(&self) -> &str {
        self.address.domain()
    }

    pub fn transport(&self) -> &Arc<dyn BrokerTransport> {
        &self.transport
    }

    pub fn runtime(&self) -> &Arc<dyn ActorRuntime> {
        &self.runtime
    }

    pub fn metrics(&self) -> &TunnelMetrics {
        &self.metrics
    }

    /// Temporary queue receiving discovery replies
    pub fn reply_queue(&self) -> &Destination {
        &self.reply_queue
    }

    pub fn domain_queue(&self, domain: &str) -> Destination {
        Destination::queue(domain_queue_name(&self.config.broker.queue_prefix, domain))
    }

    pub fn discovery_topic(&self) -> Destination {
        Destination::topic(self.config.broker.discovery_topic.clone())
    }

    pub fn topology_topic(&self) -> Destination {
        Destination::topic(self.config.broker.topology_topic.clone())
    }

    /// This process, either by name or through the placeholder
    pub fn is_own_domain(&self, domain: &str) -> bool {
        domain == self.domain() || domain == LOCAL_DOMAIN
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        name.starts_with(self.config.routing.reserved_prefix.as_str())
    }

    /// Encode and publish one frame
    pub(crate) async fn publish_frame(
        &self,
        destination: Destination,
        frame: &Frame,
        reply_to: Option<Destination>,
        correlation_id: Option<String>,
    ) -> Result<()> {
        let body = frame.encode()?;
        trace!(kind = frame.kind(), destination = %destination, "publishing frame");
        let mut message = BrokerMessage::new(destination, Bytes::from(body));
        message.reply_to = reply_to;
        message.correlation_id = correlation_id;
        self.transport
            .publish_timeout(message, self.config.broker.publish_timeout())
            .await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use broker_network::{MemoryBroker, MemoryConnection};
    use cells_runtime::LocalRuntime;

    /// Context over a connected in-memory broker and a local runtime
    pub(crate) struct Harness {
        pub broker: MemoryBroker,
        pub connection: Arc<MemoryConnection>,
        pub runtime: Arc<LocalRuntime>,
        pub ctx: Arc<TunnelContext>,
    }

    pub(crate) async fn harness(domain: &str) -> Harness {
        harness_on(MemoryBroker::new(), TunnelConfig::for_domain(domain)).await
    }

    pub(crate) async fn harness_on(broker: MemoryBroker, config: TunnelConfig) -> Harness {
        let connection = Arc::new(broker.connection());
        connection.connect().await.unwrap();
        let reply_queue = connection.temporary_queue().await.unwrap();
        let runtime = Arc::new(LocalRuntime::new(config.tunnel.domain.clone()));
        let ctx = Arc::new(
            TunnelContext::new(config, connection.clone(), runtime.clone(), reply_queue).unwrap(),
        );
        Harness {
            broker,
            connection,
            runtime,
            ctx,
        }
    }
}

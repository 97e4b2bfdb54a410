//! Tunnel lifecycle and message pumps
//!
//! [`Tunnel::start`] wires the components to the broker and the runtime and
//! spawns one task per input:
//!
//! ```text
//!  runtime events ──> event pump ──> responder, synchronizer
//!  tunnel mailbox ──> mailbox pump ─> bridge.forward / update_routes
//!  own domain queue ─┐
//!  domain queues ────┤
//!  discovery topic ──┼─> broker pump ─> dispatch(Frame)
//!  reply queue ──────┤
//!  topology topic ───┘
//! ```
//!
//! Shutdown stops intake first: the default route and the tunnel mailbox go
//! away and every consumer is detached. The intake pumps then finish what
//! they already received, so every accepted envelope is either forwarded or
//! bounced before the broker connection closes.

use crate::announcer::TopologyAnnouncer;
use crate::bridge::{Bridge, ForwardOutcome};
use crate::context::TunnelContext;
use crate::error::{Result, TunnelError};
use crate::metrics::TunnelStats;
use crate::resolver::NameResolver;
use crate::responder::NameResponder;
use crate::snapshot::TunnelSnapshot;
use crate::state::SubscriptionSlot;
use crate::synchronizer::{RouteDelta, RouteSynchronizer};
use crate::tasks::TaskSet;
use broker_network::{BrokerMessage, BrokerTransport, Subscription, SubscriptionId};
use cells_codec::Frame;
use cells_runtime::{ActorRuntime, Mailbox, RuntimeEvent, Visibility};
use cells_types::{BounceReason, CorrelationId, Envelope, Payload, Route, RouteKind};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};
use tunnel_config::TunnelConfig;

/// Components shared by the pumps
#[derive(Clone)]
struct Handlers {
    ctx: Arc<TunnelContext>,
    bridge: Bridge,
    responder: NameResponder,
    synchronizer: RouteSynchronizer,
    /// Pumps carrying envelopes; drained on shutdown
    intake: Arc<TaskSet>,
    /// Event pump and announcer; aborted on shutdown
    background: Arc<TaskSet>,
    /// Discovery topic, reply queue and topology topic consumers
    shared_consumers: Arc<Mutex<Vec<SubscriptionId>>>,
}

/// Running gateway between one runtime domain and the broker
pub struct Tunnel {
    handlers: Handlers,
    announcer: TopologyAnnouncer,
}

impl Tunnel {
    /// Connect to the broker, hook into the runtime and start forwarding.
    ///
    /// Fails with [`TunnelError::Config`] on an invalid configuration and
    /// with [`TunnelError::Startup`] when the broker cannot be reached.
    pub async fn start(
        config: TunnelConfig,
        transport: Arc<dyn BrokerTransport>,
        runtime: Arc<dyn ActorRuntime>,
    ) -> Result<Tunnel> {
        config
            .validate()
            .map_err(|e| TunnelError::config(format!("{e:#}")))?;
        if config.tunnel.domain != runtime.domain() {
            return Err(TunnelError::config(format!(
                "tunnel domain {} does not match runtime domain {}",
                config.tunnel.domain,
                runtime.domain()
            )));
        }

        let domain = config.tunnel.domain.clone();
        info!("Starting tunnel {}@{}", config.tunnel.name, domain);
        transport
            .connect()
            .await
            .map_err(|e| TunnelError::startup(format!("cannot connect to broker for domain {}", domain), e))?;
        let reply_queue = transport
            .temporary_queue()
            .await
            .map_err(|e| TunnelError::startup("cannot create discovery reply queue", e))?;

        // subscribe before seeding exports so no notification falls in between
        let events = runtime.subscribe_events();
        let ctx = Arc::new(TunnelContext::new(config, transport, runtime, reply_queue)?);

        let handlers = Handlers {
            bridge: Bridge::new(ctx.clone(), NameResolver::new(ctx.clone())),
            responder: NameResponder::new(ctx.clone()),
            synchronizer: RouteSynchronizer::new(ctx.clone()),
            intake: Arc::new(TaskSet::default()),
            background: Arc::new(TaskSet::default()),
            shared_consumers: Arc::new(Mutex::new(Vec::new())),
            ctx: ctx.clone(),
        };
        let announcer = TopologyAnnouncer::new(ctx.clone());

        let name = ctx.address().actor().to_string();
        let mailbox = ctx.runtime().open_mailbox(&name, Visibility::Private)?;
        if let Err(e) = ctx.runtime().register_route(Route::default_route(name.as_str())) {
            let _ = ctx.runtime().close_mailbox(&name);
            return Err(e.into());
        }
        handlers.responder.resync(ctx.runtime().exported_actors());

        let subscriptions = match handlers.subscribe_startup(&domain).await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                handlers.release_runtime_hooks();
                let _ = ctx.transport().close().await;
                return Err(e);
            }
        };

        for subscription in subscriptions {
            handlers.spawn_broker_pump(subscription);
        }
        handlers
            .background
            .push(tokio::spawn(handlers.clone().event_pump(events)));
        handlers
            .intake
            .push(tokio::spawn(handlers.clone().mailbox_pump(mailbox)));

        let announce = &ctx.config().announce;
        if announce.enabled {
            handlers
                .background
                .push(announcer.clone().spawn(announce.interval()));
        }

        info!("Tunnel {} is up, replies on {}", ctx.address(), ctx.reply_queue());
        Ok(Tunnel { handlers, announcer })
    }

    pub fn address(&self) -> String {
        self.handlers.ctx.address().to_string()
    }

    pub fn stats(&self) -> TunnelStats {
        self.handlers.ctx.metrics().snapshot()
    }

    pub fn snapshot(&self) -> TunnelSnapshot {
        TunnelSnapshot::capture(&self.handlers.ctx)
    }

    /// Forward an envelope as if it had been routed to the tunnel actor
    pub async fn forward(&self, envelope: Envelope) -> ForwardOutcome {
        self.handlers.bridge.forward(envelope).await
    }

    /// Replace the actors known to live in `domain`
    pub fn update_routes(&self, domain: &str, actors: BTreeSet<String>) -> RouteDelta {
        self.handlers.synchronizer.update_routes(domain, actors)
    }

    /// Publish the current exports on the topology topic now
    pub async fn announce(&self) -> Result<()> {
        self.announcer.announce().await
    }

    /// Stop forwarding and release every broker and runtime resource.
    ///
    /// Envelopes already accepted are forwarded or bounced; envelopes held
    /// for discovery are bounced to their senders. The tunnel cannot be
    /// restarted.
    pub async fn shutdown(self) -> Result<()> {
        let ctx = self.handlers.ctx.clone();
        {
            let mut state = ctx.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }
        info!("Shutting down tunnel {}", ctx.address());
        self.handlers.background.abort_all();

        self.handlers.release_runtime_hooks();
        self.handlers.stop_consuming().await;
        self.handlers.intake.join_all().await;

        if ctx.config().announce.enabled {
            if let Err(e) = self.announcer.withdraw().await {
                warn!("Could not withdraw topology: {}", e);
            }
        }

        let held = self.handlers.bridge.resolver().drain();
        if !held.is_empty() {
            info!("Bouncing {} envelopes held for discovery", held.len());
        }
        let bridge = &self.handlers.bridge;
        futures::future::join_all(held.into_iter().map(|envelope| {
            bridge.return_to_sender(envelope, BounceReason::UnresolvedName, "Tunnel shut down")
        }))
        .await;
        // deadlines that already claimed their lookup are still bouncing
        ctx.deadlines.join_all().await;

        ctx.transport().close().await?;
        info!("Tunnel {} stopped", ctx.address());
        Ok(())
    }
}

impl Handlers {
    /// Own domain queue, discovery topic, reply queue and topology topic
    async fn subscribe_startup(&self, domain: &str) -> Result<Vec<Subscription>> {
        let mut subscriptions = Vec::with_capacity(4);
        match self.synchronizer.domain_reachable(domain).await {
            Ok(Some(subscription)) => subscriptions.push(subscription),
            Ok(None) => {}
            Err(TunnelError::Transport(e)) => {
                return Err(TunnelError::startup(format!("cannot consume queue of domain {}", domain), e));
            }
            Err(e) => return Err(e),
        }

        let shared = [
            self.ctx.discovery_topic(),
            self.ctx.reply_queue().clone(),
            self.ctx.topology_topic(),
        ];
        for destination in shared {
            let subscription = self
                .ctx
                .transport()
                .subscribe(destination.clone())
                .await
                .map_err(|e| TunnelError::startup(format!("cannot subscribe to {}", destination), e))?;
            self.shared_consumers.lock().push(subscription.id);
            subscriptions.push(subscription);
        }
        Ok(subscriptions)
    }

    /// Detach every consumer; pumps end once their buffered messages are handled
    async fn stop_consuming(&self) {
        let mut consumers: Vec<SubscriptionId> = {
            let mut state = self.ctx.state.lock();
            std::mem::take(&mut state.subscriptions)
                .into_values()
                .filter_map(|slot| match slot {
                    SubscriptionSlot::Active(id) => Some(id),
                    SubscriptionSlot::Pending => None,
                })
                .collect()
        };
        consumers.append(&mut self.shared_consumers.lock());
        for id in consumers {
            if let Err(e) = self.ctx.transport().unsubscribe(id).await {
                debug!("Unsubscribe of {} failed: {}", id, e);
            }
        }
    }

    fn release_runtime_hooks(&self) {
        let runtime = self.ctx.runtime();
        let name = self.ctx.address().actor();
        if let Err(e) = runtime.remove_route(&Route::default_route(name)) {
            warn!("Could not remove default route: {}", e);
        }
        if let Err(e) = runtime.close_mailbox(name) {
            warn!("Could not close tunnel mailbox: {}", e);
        }
    }

    fn spawn_broker_pump(&self, subscription: Subscription) {
        let handlers = self.clone();
        self.intake.push(tokio::spawn(async move {
            let Subscription {
                destination,
                mut receiver,
                ..
            } = subscription;
            while let Some(message) = receiver.recv().await {
                handlers.dispatch(message).await;
            }
            debug!("Consumer for {} finished", destination);
        }));
    }

    /// Decode one broker message and hand it to its component
    async fn dispatch(&self, message: BrokerMessage) {
        let frame = match Frame::decode(&message.body) {
            Ok(frame) => frame,
            Err(e) => {
                crate::metrics::TunnelMetrics::incr(&self.ctx.metrics().malformed);
                warn!("Dropping malformed message from {}: {}", message.destination, e);
                return;
            }
        };

        match frame {
            Frame::Envelope(envelope) => self.bridge.receive_envelope(envelope).await,
            Frame::DiscoveryRequest { actor } => {
                if let Err(e) = self
                    .responder
                    .handle_request(&actor, message.reply_to, message.correlation_id)
                    .await
                {
                    warn!("Could not answer discovery request for {}: {}", actor, e);
                }
            }
            Frame::DiscoveryReply { actor, domain } => {
                let Some(correlation) = message.correlation_id.as_deref().and_then(CorrelationId::parse) else {
                    warn!("Discovery reply for {} without a usable correlation id", actor);
                    return;
                };
                self.bridge
                    .on_discovery_reply(&correlation, &actor, &domain)
                    .await;
            }
            Frame::Topology(announcement) => {
                if !self.ctx.is_own_domain(&announcement.domain) {
                    self.synchronizer
                        .update_routes(&announcement.domain, announcement.actors);
                }
            }
        }
    }

    async fn mailbox_pump(self, mut mailbox: Mailbox) {
        while let Some(envelope) = mailbox.recv().await {
            let destination = envelope.destination();
            let to_tunnel = destination.actor() == self.ctx.address().actor()
                && self.ctx.is_own_domain(destination.domain());
            if to_tunnel {
                if let Payload::Topology(announcement) = envelope.into_payload() {
                    self.synchronizer
                        .update_routes(&announcement.domain, announcement.actors);
                } else {
                    debug!("Ignoring envelope addressed to the tunnel itself");
                }
                continue;
            }
            self.bridge.forward(envelope).await;
        }
        debug!("Tunnel mailbox closed");
    }

    async fn event_pump(self, mut events: broadcast::Receiver<RuntimeEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.on_event(event).await,
                Err(RecvError::Lagged(missed)) => {
                    warn!("Missed {} runtime events, resynchronizing exports", missed);
                    self.resync_exports();
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("Runtime event stream ended");
    }

    async fn on_event(&self, event: RuntimeEvent) {
        debug!(kind = event.kind(), "runtime event");
        match event {
            RuntimeEvent::ActorExported(actor) => {
                if self.responder.actor_exported(&actor) {
                    self.synchronizer.local_export_added(&actor);
                }
            }
            RuntimeEvent::ActorDestroyed(actor) => {
                if self.responder.actor_destroyed(&actor) {
                    self.synchronizer.local_export_removed(&actor);
                }
            }
            RuntimeEvent::RouteAdded(route) => {
                let Some(domain) = self.served_domain(&route) else {
                    return;
                };
                match self.synchronizer.domain_reachable(&domain).await {
                    Ok(Some(subscription)) => self.spawn_broker_pump(subscription),
                    Ok(None) => {}
                    Err(e) => error!("Domain {} reachable but not consumed: {}", domain, e),
                }
            }
            RuntimeEvent::RouteDeleted(route) => {
                let Some(domain) = self.served_domain(&route) else {
                    return;
                };
                if let Err(e) = self.synchronizer.domain_unreachable(&domain).await {
                    warn!("Teardown of domain {} incomplete: {}", domain, e);
                }
            }
        }
    }

    /// Domain served locally through a gateway other than the tunnel
    fn served_domain(&self, route: &Route) -> Option<String> {
        if route.kind() != RouteKind::Domain || route.gateway() == self.ctx.address().actor() {
            return None;
        }
        let domain = route.destination()?;
        (!self.ctx.is_own_domain(domain)).then(|| domain.to_string())
    }

    fn resync_exports(&self) {
        let current: BTreeSet<String> = self.ctx.runtime().exported_actors().into_iter().collect();
        let previous = self.ctx.state.lock().exports.clone();
        self.responder.resync(current.iter().cloned());
        for added in current.difference(&previous) {
            self.synchronizer.local_export_added(added);
        }
        for removed in previous.difference(&current) {
            self.synchronizer.local_export_removed(removed);
        }
    }
}

impl std::fmt::Debug for Tunnel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tunnel")
            .field("address", &self.address())
            .field("reply_queue", self.handlers.ctx.reply_queue())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_network::{Destination, MemoryBroker};
    use cells_runtime::LocalRuntime;

    async fn start(broker: &MemoryBroker, domain: &str) -> (Tunnel, Arc<LocalRuntime>) {
        let runtime = Arc::new(LocalRuntime::new(domain));
        let transport = Arc::new(broker.connection());
        let tunnel = Tunnel::start(TunnelConfig::for_domain(domain), transport, runtime.clone())
            .await
            .unwrap();
        (tunnel, runtime)
    }

    #[tokio::test]
    async fn start_installs_hooks_and_consumers() {
        let broker = MemoryBroker::new();
        let (tunnel, runtime) = start(&broker, "A").await;

        assert!(runtime.has_route(&Route::default_route("tunnel")));
        assert_eq!(broker.consumer_count(&Destination::queue("cells.domain.A")), 1);
        assert_eq!(broker.consumer_count(&Destination::topic("cells.arp")), 1);
        assert_eq!(broker.consumer_count(&Destination::topic("cells.topology")), 1);

        tunnel.shutdown().await.unwrap();
        assert!(!runtime.has_route(&Route::default_route("tunnel")));
        assert_eq!(broker.consumer_count(&Destination::queue("cells.domain.A")), 0);
    }

    #[tokio::test]
    async fn mismatched_domain_is_a_config_error() {
        let broker = MemoryBroker::new();
        let runtime = Arc::new(LocalRuntime::new("B"));
        let err = Tunnel::start(
            TunnelConfig::for_domain("A"),
            Arc::new(broker.connection()),
            runtime,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TunnelError::Config(_)));
    }

    #[tokio::test]
    async fn unreachable_broker_aborts_startup() {
        let broker = MemoryBroker::new();
        broker.set_offline(true);
        let runtime = Arc::new(LocalRuntime::new("A"));
        let err = Tunnel::start(
            TunnelConfig::for_domain("A"),
            Arc::new(broker.connection()),
            runtime.clone(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TunnelError::Startup { .. }));
        assert!(runtime.routes().is_empty());
    }

    #[tokio::test]
    async fn malformed_broker_message_is_counted_and_dropped() {
        let broker = MemoryBroker::new();
        let (tunnel, _runtime) = start(&broker, "A").await;
        let publisher = broker.connection();
        publisher.connect().await.unwrap();
        publisher
            .publish(BrokerMessage::new(
                Destination::queue("cells.domain.A"),
                b"hello".to_vec(),
            ))
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while tunnel.stats().malformed == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        tunnel.shutdown().await.unwrap();
    }
}

//! In-process actor runtime
//!
//! [`LocalRuntime`] keeps mailboxes and a routing table for one domain. It
//! delivers to local mailboxes and routes everything else to gateway actors:
//!
//! ```text
//! send(env)
//!   ├─ destination here and mailbox exists ──────────> mailbox
//!   ├─ destination here, well-known route x -> *@B ──> readdress to x@B ─┐
//!   ├─ destination in domain B ───────────────────────────────────────────┤
//!   │                                                                     v
//!   │                               domain route B -> gw, else default -> gw
//!   └─ nothing matches ───────────────────────────────> DeliveryFailure(NoRoute)
//! ```
//!
//! # Lock Ordering
//!
//! `routes` is never held while `mailboxes` is locked and vice versa; each
//! lookup copies what it needs and releases the lock.

use crate::error::{DeliveryFailure, Result, RuntimeError};
use crate::events::{RuntimeEvent, EVENT_CHANNEL_CAPACITY};
use crate::registry::{Mailbox, MailboxRegistry, Visibility};
use crate::runtime::ActorRuntime;
use async_trait::async_trait;
use cells_types::{Envelope, Route, RouteKind, LOCAL_DOMAIN};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const DEFAULT_MAILBOX_CAPACITY: usize = 1024;

type RouteKey = (RouteKind, Option<String>);

/// Change applied to the routing table, kept for inspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOperation {
    Added(Route),
    Removed(Route),
}

/// Runtime counters
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    pub delivered: AtomicU64,
    pub delivery_failures: AtomicU64,
    pub routes_added: AtomicU64,
    pub routes_removed: AtomicU64,
}

/// Point-in-time copy of [`RuntimeMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    pub delivered: u64,
    pub delivery_failures: u64,
    pub routes_added: u64,
    pub routes_removed: u64,
}

pub struct LocalRuntime {
    domain: String,
    mailboxes: MailboxRegistry,
    routes: RwLock<HashMap<RouteKey, Route>>,
    history: Mutex<Vec<RouteOperation>>,
    events: broadcast::Sender<RuntimeEvent>,
    metrics: RuntimeMetrics,
}

impl LocalRuntime {
    pub fn new(domain: impl Into<String>) -> Self {
        Self::with_mailbox_capacity(domain, DEFAULT_MAILBOX_CAPACITY)
    }

    pub fn with_mailbox_capacity(domain: impl Into<String>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            domain: domain.into(),
            mailboxes: MailboxRegistry::new(capacity),
            routes: RwLock::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            events,
            metrics: RuntimeMetrics::default(),
        }
    }

    /// Route an envelope sent by a local actor
    pub fn send(&self, envelope: Envelope) -> std::result::Result<(), DeliveryFailure> {
        let destination = envelope.destination();
        let here = destination.is_local() || destination.domain() == self.domain;

        let envelope = if here {
            if self.mailboxes.contains(destination.actor()) {
                return self.deliver_here(envelope);
            }
            match self.well_known_domain(destination.actor()) {
                Some(domain) => envelope.with_destination_domain(&domain),
                None if destination.domain() == self.domain => {
                    return Err(self.failed(DeliveryFailure::no_route(envelope)));
                }
                None => envelope,
            }
        } else {
            envelope
        };

        match self.gateway_for(envelope.destination().domain()) {
            Some(gateway) => {
                debug!(destination = %envelope.destination(), gateway = %gateway, "routing via gateway");
                self.offer(&gateway, envelope)
            }
            None => Err(self.failed(DeliveryFailure::no_route(envelope))),
        }
    }

    /// Broadcast a lifecycle or routing event to observers
    pub fn publish_event(&self, event: RuntimeEvent) {
        // no receivers is fine
        let _ = self.events.send(event);
    }

    /// Current routing table, sorted by display form
    pub fn routes(&self) -> Vec<Route> {
        let mut routes: Vec<Route> = self.routes.read().values().cloned().collect();
        routes.sort_by_key(|r| r.to_string());
        routes
    }

    pub fn has_route(&self, route: &Route) -> bool {
        let key = route_key(route);
        self.routes.read().get(&key) == Some(route)
    }

    /// Every route change since creation or the last clear
    pub fn route_history(&self) -> Vec<RouteOperation> {
        self.history.lock().clone()
    }

    pub fn clear_route_history(&self) {
        self.history.lock().clear();
    }

    pub fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            delivered: self.metrics.delivered.load(Ordering::Acquire),
            delivery_failures: self.metrics.delivery_failures.load(Ordering::Acquire),
            routes_added: self.metrics.routes_added.load(Ordering::Acquire),
            routes_removed: self.metrics.routes_removed.load(Ordering::Acquire),
        }
    }

    fn well_known_domain(&self, actor: &str) -> Option<String> {
        let key = (RouteKind::WellKnown, Some(actor.to_string()));
        self.routes.read().get(&key).map(|r| r.gateway().to_string())
    }

    fn gateway_for(&self, domain: &str) -> Option<String> {
        let routes = self.routes.read();
        let domain_route = if domain == LOCAL_DOMAIN {
            None
        } else {
            routes.get(&(RouteKind::Domain, Some(domain.to_string())))
        };
        domain_route
            .or_else(|| routes.get(&(RouteKind::Default, None)))
            .map(|r| r.gateway().to_string())
    }

    /// Gateway of an explicit domain route; the default route is not consulted
    fn domain_gateway(&self, domain: &str) -> Option<String> {
        let key = (RouteKind::Domain, Some(domain.to_string()));
        self.routes.read().get(&key).map(|r| r.gateway().to_string())
    }

    fn deliver_here(&self, envelope: Envelope) -> std::result::Result<(), DeliveryFailure> {
        let actor = envelope.destination().actor().to_string();
        self.offer(&actor, envelope)
    }

    fn offer(&self, actor: &str, envelope: Envelope) -> std::result::Result<(), DeliveryFailure> {
        match self.mailboxes.offer(actor, envelope) {
            Ok(()) => {
                self.metrics.delivered.fetch_add(1, Ordering::AcqRel);
                Ok(())
            }
            Err(failure) => Err(self.failed(failure)),
        }
    }

    fn failed(&self, failure: DeliveryFailure) -> DeliveryFailure {
        self.metrics.delivery_failures.fetch_add(1, Ordering::AcqRel);
        warn!("{}", failure);
        failure
    }
}

fn route_key(route: &Route) -> RouteKey {
    (route.kind(), route.destination().map(str::to_string))
}

#[async_trait]
impl ActorRuntime for LocalRuntime {
    fn domain(&self) -> &str {
        &self.domain
    }

    fn register_route(&self, route: Route) -> Result<()> {
        {
            let mut routes = self.routes.write();
            let key = route_key(&route);
            if let Some(existing) = routes.get(&key) {
                return Err(RuntimeError::DuplicateRoute {
                    route,
                    existing: existing.clone(),
                });
            }
            routes.insert(key, route.clone());
        }
        info!(domain = %self.domain, "Route added: {}", route);
        self.metrics.routes_added.fetch_add(1, Ordering::AcqRel);
        self.history.lock().push(RouteOperation::Added(route.clone()));
        self.publish_event(RuntimeEvent::RouteAdded(route));
        Ok(())
    }

    fn remove_route(&self, route: &Route) -> Result<()> {
        {
            let mut routes = self.routes.write();
            let key = route_key(route);
            if routes.get(&key) != Some(route) {
                return Err(RuntimeError::UnknownRoute { route: route.clone() });
            }
            routes.remove(&key);
        }
        info!(domain = %self.domain, "Route removed: {}", route);
        self.metrics.routes_removed.fetch_add(1, Ordering::AcqRel);
        self.history.lock().push(RouteOperation::Removed(route.clone()));
        self.publish_event(RuntimeEvent::RouteDeleted(route.clone()));
        Ok(())
    }

    async fn deliver(&self, envelope: Envelope) -> std::result::Result<(), DeliveryFailure> {
        let destination = envelope.destination();
        let here = destination.is_local() || destination.domain() == self.domain;
        if here {
            if !self.mailboxes.contains(destination.actor()) {
                return Err(self.failed(DeliveryFailure::no_route(envelope)));
            }
            return self.deliver_here(envelope);
        }
        match self.domain_gateway(destination.domain()) {
            Some(gateway) => self.offer(&gateway, envelope),
            None => Err(self.failed(DeliveryFailure::no_route(envelope))),
        }
    }

    fn exported_actors(&self) -> Vec<String> {
        self.mailboxes.exported()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }

    fn open_mailbox(&self, actor: &str, visibility: Visibility) -> Result<Mailbox> {
        let mailbox = self.mailboxes.open(actor, visibility)?;
        debug!(domain = %self.domain, actor, ?visibility, "mailbox opened");
        if visibility == Visibility::Exported {
            self.publish_event(RuntimeEvent::ActorExported(actor.to_string()));
        }
        Ok(mailbox)
    }

    fn close_mailbox(&self, actor: &str) -> Result<()> {
        self.mailboxes.close(actor)?;
        debug!(domain = %self.domain, actor, "mailbox closed");
        self.publish_event(RuntimeEvent::ActorDestroyed(actor.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cells_types::ActorPath;

    fn path(s: &str) -> ActorPath {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn deliver_reaches_local_mailbox_only() {
        let runtime = LocalRuntime::new("A");
        let mut pool = runtime.open_mailbox("pool", Visibility::Exported).unwrap();

        let envelope = Envelope::data(path("door@B"), path("pool@A"), b"read".to_vec());
        runtime.deliver(envelope.clone()).await.unwrap();
        assert_eq!(pool.recv().await.unwrap(), envelope);

        let missing = Envelope::data(path("door@B"), path("ghost@A"), Vec::new());
        let failure = runtime.deliver(missing.clone()).await.unwrap_err();
        assert_eq!(failure.envelope, missing);
        assert!(matches!(failure.error, RuntimeError::NoRoute { .. }));

        // the default route is never used for delivery
        runtime.register_route(Route::default_route("pool")).unwrap();
        let elsewhere = Envelope::data(path("door@B"), path("pool@C"), Vec::new());
        assert!(runtime.deliver(elsewhere).await.is_err());
        assert_eq!(runtime.stats().delivered, 1);
        assert_eq!(runtime.stats().delivery_failures, 2);
    }

    #[tokio::test]
    async fn duplicate_and_unknown_routes_are_rejected() {
        let runtime = LocalRuntime::new("A");
        runtime.register_route(Route::well_known("x", "B")).unwrap();

        let err = runtime.register_route(Route::well_known("x", "C")).unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateRoute { .. }));

        let err = runtime.remove_route(&Route::well_known("x", "C")).unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownRoute { .. }));

        runtime.remove_route(&Route::well_known("x", "B")).unwrap();
        assert_eq!(
            runtime.route_history(),
            vec![
                RouteOperation::Added(Route::well_known("x", "B")),
                RouteOperation::Removed(Route::well_known("x", "B")),
            ]
        );
    }

    #[tokio::test]
    async fn send_follows_well_known_then_default_route() {
        let runtime = LocalRuntime::new("A");
        let mut gateway = runtime.open_mailbox("tunnel", Visibility::Private).unwrap();
        runtime.register_route(Route::default_route("tunnel")).unwrap();
        runtime.register_route(Route::well_known("pool", "B")).unwrap();

        runtime
            .send(Envelope::data(path("door@A"), path("pool@local"), Vec::new()))
            .unwrap();
        let routed = gateway.recv().await.unwrap();
        assert_eq!(routed.destination(), &path("pool@B"));

        runtime
            .send(Envelope::data(path("door@A"), path("unknown@local"), Vec::new()))
            .unwrap();
        assert_eq!(gateway.recv().await.unwrap().destination(), &path("unknown@local"));

        let err = runtime
            .send(Envelope::data(path("door@A"), path("unknown@A"), Vec::new()))
            .unwrap_err();
        assert!(matches!(err.error, RuntimeError::NoRoute { .. }));
    }

    #[tokio::test]
    async fn domain_route_beats_default_route() {
        let runtime = LocalRuntime::new("A");
        let mut direct = runtime.open_mailbox("link-b", Visibility::Private).unwrap();
        let mut fallback = runtime.open_mailbox("tunnel", Visibility::Private).unwrap();
        runtime.register_route(Route::domain("B", "link-b")).unwrap();
        runtime.register_route(Route::default_route("tunnel")).unwrap();

        runtime
            .send(Envelope::data(path("door@A"), path("pool@B"), Vec::new()))
            .unwrap();
        runtime
            .send(Envelope::data(path("door@A"), path("pool@C"), Vec::new()))
            .unwrap();

        assert_eq!(direct.recv().await.unwrap().destination(), &path("pool@B"));
        assert_eq!(fallback.recv().await.unwrap().destination(), &path("pool@C"));
    }

    #[tokio::test]
    async fn deliver_follows_domain_route() {
        let runtime = LocalRuntime::new("A");
        let mut link = runtime.open_mailbox("link-c", Visibility::Private).unwrap();
        runtime.register_route(Route::domain("C", "link-c")).unwrap();

        let envelope = Envelope::data(path("door@B"), path("pool@C"), Vec::new());
        runtime.deliver(envelope.clone()).await.unwrap();
        assert_eq!(link.recv().await.unwrap(), envelope);
    }

    #[tokio::test]
    async fn lifecycle_events_are_broadcast() {
        let runtime = LocalRuntime::new("A");
        let mut events = runtime.subscribe_events();

        let _pool = runtime.open_mailbox("pool", Visibility::Exported).unwrap();
        let _private = runtime.open_mailbox("helper", Visibility::Private).unwrap();
        runtime.close_mailbox("pool").unwrap();
        runtime.register_route(Route::domain("B", "tunnel")).unwrap();

        assert_eq!(events.recv().await.unwrap(), RuntimeEvent::ActorExported("pool".into()));
        assert_eq!(events.recv().await.unwrap(), RuntimeEvent::ActorDestroyed("pool".into()));
        assert_eq!(
            events.recv().await.unwrap(),
            RuntimeEvent::RouteAdded(Route::domain("B", "tunnel"))
        );
        assert!(runtime.exported_actors().is_empty());
    }

    #[tokio::test]
    async fn full_mailbox_hands_envelope_back() {
        let runtime = LocalRuntime::with_mailbox_capacity("A", 1);
        let _pool = runtime.open_mailbox("pool", Visibility::Exported).unwrap();
        runtime
            .deliver(Envelope::data(path("door@B"), path("pool@A"), Vec::new()))
            .await
            .unwrap();

        let second = Envelope::data(path("door@B"), path("pool@A"), b"2".to_vec());
        let failure = runtime.deliver(second.clone()).await.unwrap_err();
        assert_eq!(failure.envelope, second);
        assert!(matches!(failure.error, RuntimeError::MailboxFull { .. }));
    }
}

//! Route-Table Synchronizer
//!
//! Mirrors the well-known actors announced by each remote domain into
//! forwarding routes of the local runtime, and keeps one consumer per
//! reachable domain queue.
//!
//! ## Delta rules for `update_routes(domain, actors)`
//!
//! - a name missing from the domain's previous set gets a well-known route
//!   `name -> *@domain`, unless it is exported locally or starts with the
//!   reserved prefix; names already announced cause no route calls
//! - a name previously announced by another domain moves: the old route is
//!   removed before the new one is installed
//! - a vanished name loses its route
//! - the empty set forgets the domain
//!
//! The delta is computed under the state lock and applied to the runtime
//! after it is released. A failed route call is logged and the remaining
//! names are still processed.

use crate::context::TunnelContext;
use crate::error::Result;
use crate::state::SubscriptionSlot;
use broker_network::Subscription;
use cells_types::Route;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Route changes requested by one update
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RouteDelta {
    pub removed: Vec<Route>,
    pub added: Vec<Route>,
}

impl RouteDelta {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

#[derive(Clone)]
pub struct RouteSynchronizer {
    ctx: Arc<TunnelContext>,
}

impl RouteSynchronizer {
    pub fn new(ctx: Arc<TunnelContext>) -> Self {
        Self { ctx }
    }

    /// Replace what `domain` announces and reconcile forwarding routes
    pub fn update_routes(&self, domain: &str, actors: BTreeSet<String>) -> RouteDelta {
        if self.ctx.is_own_domain(domain) {
            debug!(domain, "ignoring routing info about our own domain");
            return RouteDelta::default();
        }

        let mut delta = RouteDelta::default();
        {
            let mut state = self.ctx.state.lock();
            let state = &mut *state;

            let known = state.routes.get(domain).cloned().unwrap_or_default();
            for name in actors.difference(&known).filter(|n| !self.ctx.is_reserved(n)) {
                if let Some(owner) = state.routes.owner_other_than(name, domain) {
                    state.routes.forget(&owner, name);
                    if state.installed.get(name) == Some(&owner) {
                        state.installed.remove(name);
                        delta.removed.push(Route::well_known(name.as_str(), owner.as_str()));
                    }
                }
                if state.exports.contains(name) {
                    continue;
                }
                state.installed.insert(name.clone(), domain.to_string());
                delta.added.push(Route::well_known(name.as_str(), domain));
            }

            state.routes.replace(domain, actors.clone());
            for name in known.difference(&actors) {
                if self.ctx.is_reserved(name) {
                    continue;
                }
                if state.installed.get(name).map(String::as_str) == Some(domain) {
                    state.installed.remove(name);
                    delta.removed.push(Route::well_known(name.as_str(), domain));
                }
            }
        }

        self.apply(&delta);
        delta
    }

    /// A local actor was exported: local delivery wins over any forwarding route
    pub fn local_export_added(&self, actor: &str) -> RouteDelta {
        let mut delta = RouteDelta::default();
        {
            let mut state = self.ctx.state.lock();
            if let Some(domain) = state.installed.remove(actor) {
                delta.removed.push(Route::well_known(actor, domain));
            }
        }
        self.apply(&delta);
        delta
    }

    /// A local actor is gone: restore the route if a remote domain announces the name
    pub fn local_export_removed(&self, actor: &str) -> RouteDelta {
        let mut delta = RouteDelta::default();
        if self.ctx.is_reserved(actor) {
            return delta;
        }
        {
            let mut state = self.ctx.state.lock();
            if state.exports.contains(actor) || state.installed.contains_key(actor) {
                return delta;
            }
            if let Some(domain) = state.routes.owner(actor).map(str::to_string) {
                state.installed.insert(actor.to_string(), domain.clone());
                delta.added.push(Route::well_known(actor, domain));
            }
        }
        self.apply(&delta);
        delta
    }

    /// Start consuming the queue of `domain`.
    ///
    /// Returns the new subscription, or `None` when one already exists or
    /// is being created.
    pub async fn domain_reachable(&self, domain: &str) -> Result<Option<Subscription>> {
        {
            let mut state = self.ctx.state.lock();
            if state.closed {
                return Ok(None);
            }
            if state.subscriptions.contains_key(domain) {
                debug!(domain, "domain queue already consumed");
                return Ok(None);
            }
            state
                .subscriptions
                .insert(domain.to_string(), SubscriptionSlot::Pending);
        }

        let queue = self.ctx.domain_queue(domain);
        let subscription = match self.ctx.transport().subscribe(queue.clone()).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.ctx.state.lock().subscriptions.remove(domain);
                error!("Failed to create consumer for {}: {}", queue, e);
                return Err(e.into());
            }
        };

        let claimed = {
            let mut state = self.ctx.state.lock();
            match state.subscriptions.get_mut(domain) {
                Some(slot @ SubscriptionSlot::Pending) => {
                    *slot = SubscriptionSlot::Active(subscription.id);
                    true
                }
                _ => false,
            }
        };
        if !claimed {
            // unreachable arrived while subscribing
            if let Err(e) = self.ctx.transport().unsubscribe(subscription.id).await {
                debug!("Unsubscribe of {} failed: {}", subscription.id, e);
            }
            return Ok(None);
        }

        info!("Consuming {} for domain {}", queue, domain);
        Ok(Some(subscription))
    }

    /// Forget every route into `domain` and stop consuming its queue
    pub async fn domain_unreachable(&self, domain: &str) -> Result<RouteDelta> {
        let delta = self.update_routes(domain, BTreeSet::new());
        let (slot, invalidated) = {
            let mut state = self.ctx.state.lock();
            let invalidated = state.cache.invalidate_domain(domain);
            (state.subscriptions.remove(domain), invalidated)
        };
        if invalidated > 0 {
            debug!(domain, invalidated, "dropped cached resolutions");
        }

        if let Some(SubscriptionSlot::Active(id)) = slot {
            self.ctx.transport().unsubscribe(id).await?;
            info!("Stopped consuming queue of domain {}", domain);
        }
        Ok(delta)
    }

    /// Domains whose queues are consumed, sorted
    pub fn consumed_domains(&self) -> Vec<String> {
        self.ctx.state.lock().subscriptions.keys().cloned().collect()
    }

    fn apply(&self, delta: &RouteDelta) {
        let runtime = self.ctx.runtime();
        for route in &delta.removed {
            info!("Removing: {}", route);
            if let Err(e) = runtime.remove_route(route) {
                warn!("Could not delete well-known route: {}", e);
            }
        }
        for route in &delta.added {
            info!("Adding: {}", route);
            if let Err(e) = runtime.register_route(route.clone()) {
                error!("Could not add well-known route: {}", e);
                self.forget_installed(route);
            }
        }
    }

    /// Undo bookkeeping for a route the runtime refused
    fn forget_installed(&self, route: &Route) {
        let Some(actor) = route.destination() else {
            return;
        };
        let mut state = self.ctx.state.lock();
        if state.installed.get(actor).map(String::as_str) == Some(route.gateway()) {
            state.installed.remove(actor);
        }
    }
}

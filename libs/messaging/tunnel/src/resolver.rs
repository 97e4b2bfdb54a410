//! Name Resolver
//!
//! Finds the domain hosting an actor that was addressed by name only.
//!
//! ```text
//! resolve(actor) ── hit ──> domain
//!        │
//!       miss
//!        v
//! begin_lookup(envelope) ── publish DiscoveryRequest(actor) on the discovery topic,
//!        │                  reply_to = our temporary queue, correlation = fresh id
//!        v
//!   PendingLookup ──┬── reply ────> complete(id)  ─> cache insert, envelope released
//!                   └── deadline ─> expire(id)    ─> envelope released for bouncing
//! ```
//!
//! Reply and deadline both *claim* the pending entry by removing it under
//! the state lock. Whoever removes it acts; the other finds nothing and does
//! nothing. Concurrent lookups for the same name are independent.

use crate::context::TunnelContext;
use crate::error::TunnelError;
use crate::metrics::TunnelMetrics;
use crate::state::PendingLookup;
use cells_codec::Frame;
use cells_types::{CorrelationId, Envelope};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lookup that could not be started; the envelope comes back untouched
#[derive(Debug)]
pub struct LookupFailure {
    pub envelope: Envelope,
    pub error: TunnelError,
}

/// What a discovery reply did to its pending lookup
#[derive(Debug)]
pub enum LookupOutcome {
    /// Domain found and cached; forward the envelope there
    Resolved { envelope: Envelope, domain: String },
    /// Reply arrived but named no domain
    NoRoute { envelope: Envelope, actor: String },
}

#[derive(Clone)]
pub struct NameResolver {
    ctx: Arc<TunnelContext>,
}

impl NameResolver {
    pub fn new(ctx: Arc<TunnelContext>) -> Self {
        Self { ctx }
    }

    /// Cached domain of `actor`, `None` when not cached or expired
    pub fn resolve(&self, actor: &str) -> Option<String> {
        self.ctx.state.lock().cache.get(actor, Instant::now())
    }

    /// Broadcast a discovery request for the destination of `envelope` and
    /// hold the envelope until a reply or the deadline.
    ///
    /// `on_timeout` receives the envelope if the deadline wins.
    pub async fn begin_lookup<F, Fut>(
        &self,
        envelope: Envelope,
        on_timeout: F,
    ) -> Result<CorrelationId, LookupFailure>
    where
        F: FnOnce(Envelope) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let actor = envelope.destination().actor().to_string();
        let correlation = CorrelationId::new();

        {
            let mut state = self.ctx.state.lock();
            if state.closed {
                return Err(LookupFailure {
                    envelope,
                    error: TunnelError::Closed,
                });
            }
            // armed under the lock so the handle is stored before the deadline can claim
            let resolver = self.clone();
            let timeout = self.ctx.config().discovery.timeout();
            let timer = self.ctx.deadlines.push(tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(envelope) = resolver.expire(&correlation) {
                    on_timeout(envelope).await;
                }
            }));
            state.pending.insert(
                correlation,
                PendingLookup {
                    actor: actor.clone(),
                    envelope,
                    started: Instant::now(),
                    timer,
                },
            );
        }
        TunnelMetrics::incr(&self.ctx.metrics().lookups_started);

        let request = Frame::DiscoveryRequest { actor: actor.clone() };
        let published = self
            .ctx
            .publish_frame(
                self.ctx.discovery_topic(),
                &request,
                Some(self.ctx.reply_queue().clone()),
                Some(correlation.to_string()),
            )
            .await;

        if let Err(error) = published {
            warn!("Discovery request for {} failed: {}", actor, error);
            return match self.claim(&correlation) {
                Some(pending) => Err(LookupFailure {
                    envelope: pending.release(),
                    error,
                }),
                // deadline or shutdown claimed it meanwhile and owns the envelope
                None => Ok(correlation),
            };
        }

        debug!(actor = %actor, correlation = %correlation, "discovery request sent");
        Ok(correlation)
    }

    /// Apply a discovery reply. `None` when the lookup was already claimed.
    pub fn complete(&self, correlation: &CorrelationId, actor: &str, domain: &str) -> Option<LookupOutcome> {
        let mut state = self.ctx.state.lock();
        match state.pending.get(correlation) {
            None => {
                debug!(correlation = %correlation, "late or unknown discovery reply");
                return None;
            }
            Some(pending) if pending.actor != actor => {
                warn!(
                    "Discovery reply for {} does not match pending lookup of {}",
                    actor, pending.actor
                );
                return None;
            }
            Some(_) => {}
        }

        let pending = state.pending.remove(correlation)?;
        let elapsed = pending.started.elapsed();
        let actor = pending.actor.clone();
        let envelope = pending.release();

        if domain.is_empty() {
            drop(state);
            info!("Discovery for {} returned no domain", actor);
            return Some(LookupOutcome::NoRoute { envelope, actor });
        }

        state.cache.insert(&actor, domain, Instant::now());
        drop(state);
        TunnelMetrics::incr(&self.ctx.metrics().lookups_resolved);
        debug!(actor = %actor, domain = %domain, ?elapsed, "resolved");
        Some(LookupOutcome::Resolved {
            envelope,
            domain: domain.to_string(),
        })
    }

    /// Deadline path. `None` when the reply already claimed the lookup.
    pub fn expire(&self, correlation: &CorrelationId) -> Option<Envelope> {
        let pending = self.ctx.state.lock().pending.remove(correlation)?;
        TunnelMetrics::incr(&self.ctx.metrics().lookups_timed_out);
        warn!("Lookup of {} timed out", pending.actor);
        // the timer is the caller here; nothing to cancel
        Some(pending.envelope)
    }

    /// Release every held envelope, cancelling deadlines
    pub fn drain(&self) -> Vec<Envelope> {
        let pending: Vec<PendingLookup> = self
            .ctx
            .state
            .lock()
            .pending
            .drain()
            .map(|(_, pending)| pending)
            .collect();
        pending.into_iter().map(PendingLookup::release).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.ctx.state.lock().pending.len()
    }

    fn claim(&self, correlation: &CorrelationId) -> Option<PendingLookup> {
        self.ctx.state.lock().pending.remove(correlation)
    }
}

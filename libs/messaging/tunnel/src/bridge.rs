//! Bridge
//!
//! Moves envelopes between the local runtime and the broker.
//!
//! ```text
//! outbound  NEW ──┬── cache hit ──────────────────────> PUBLISHED
//!                 ├── cache miss ─> RESOLVING ─┬─ reply ───> PUBLISHED
//!                 │                            └─ timeout ─> BOUNCED (UnresolvedName)
//!                 └── publish fails ──────────────────> BOUNCED (TransportFailure)
//!
//! inbound   frame ─> runtime.deliver ─┬─ ok ──> delivered
//!                                     └─ err ─> BOUNCED (NoRouteLocally)
//! ```
//!
//! Bounces go back to the source of the failed envelope: into the runtime
//! when the source is here, onto the source domain's queue otherwise. A
//! bounce is never answered with another bounce.

use crate::context::TunnelContext;
use crate::error::Result;
use crate::metrics::TunnelMetrics;
use crate::resolver::{LookupFailure, LookupOutcome, NameResolver};
use cells_codec::Frame;
use cells_types::{BounceReason, CorrelationId, Envelope};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Where an outbound envelope ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Published onto the queue of `domain`
    Published { domain: String },
    /// Held until discovery answers or times out
    Resolving(CorrelationId),
    /// Handed to the local runtime
    Delivered,
    /// Returned to its source
    Bounced,
}

#[derive(Clone)]
pub struct Bridge {
    ctx: Arc<TunnelContext>,
    resolver: NameResolver,
}

impl Bridge {
    pub fn new(ctx: Arc<TunnelContext>, resolver: NameResolver) -> Self {
        Self { ctx, resolver }
    }

    pub fn resolver(&self) -> &NameResolver {
        &self.resolver
    }

    /// Send an envelope from the local runtime towards its destination
    pub async fn forward(&self, envelope: Envelope) -> ForwardOutcome {
        let envelope = if envelope.source().is_local() {
            envelope.with_source_domain(self.ctx.domain())
        } else {
            envelope
        };

        let destination = envelope.destination().clone();
        if destination.is_local() {
            if let Some(domain) = self.resolver.resolve(destination.actor()) {
                debug!(actor = %destination.actor(), domain = %domain, "cache hit");
                return self.route(envelope.with_destination_domain(&domain)).await;
            }
            return self.lookup(envelope).await;
        }
        self.route(envelope).await
    }

    /// Deliver an envelope that arrived from the broker
    pub async fn receive_envelope(&self, envelope: Envelope) {
        debug!(id = %envelope.id(), destination = %envelope.destination(), "inbound envelope");
        match self.ctx.runtime().deliver(envelope).await {
            Ok(()) => TunnelMetrics::incr(&self.ctx.metrics().inbound),
            Err(failure) => {
                let detail = failure.error.to_string();
                self.return_to_sender(failure.envelope, BounceReason::NoRouteLocally, detail)
                    .await;
            }
        }
    }

    /// Act on a discovery reply. `None` when no lookup was waiting for it.
    pub async fn on_discovery_reply(
        &self,
        correlation: &CorrelationId,
        actor: &str,
        domain: &str,
    ) -> Option<ForwardOutcome> {
        match self.resolver.complete(correlation, actor, domain)? {
            LookupOutcome::Resolved { envelope, domain } => {
                Some(self.route(envelope.with_destination_domain(&domain)).await)
            }
            LookupOutcome::NoRoute { envelope, actor } => {
                self.return_to_sender(envelope, BounceReason::UnresolvedName, format!("No route to {}", actor))
                    .await;
                Some(ForwardOutcome::Bounced)
            }
        }
    }

    /// Deadline of a lookup passed without a reply
    pub async fn lookup_timed_out(&self, envelope: Envelope) {
        let detail = format!("No route to {}", envelope.destination().actor());
        self.return_to_sender(envelope, BounceReason::UnresolvedName, detail)
            .await;
    }

    /// Bounce `envelope` back to its source unless it is a bounce itself
    pub async fn return_to_sender(&self, envelope: Envelope, reason: BounceReason, detail: impl Into<String>) {
        let Some(bounce) = envelope.bounce(reason, detail, self.ctx.address().clone()) else {
            TunnelMetrics::incr(&self.ctx.metrics().bounces_suppressed);
            warn!(
                "Dropping undeliverable bounce {} for {}",
                envelope.id(),
                envelope.destination()
            );
            return;
        };
        TunnelMetrics::incr(&self.ctx.metrics().bounces);
        debug!(original = %envelope.id(), to = %bounce.destination(), %reason, "bouncing");

        let domain = bounce.destination().domain().to_string();
        if self.ctx.is_own_domain(&domain) {
            if let Err(failure) = self.ctx.runtime().deliver(bounce).await {
                warn!("Bounce for local sender not delivered: {}", failure);
            }
        } else if let Err(e) = self.publish_envelope(&domain, &bounce).await {
            error!("Failed to return bounce to domain {}: {}", domain, e);
        }
    }

    async fn lookup(&self, envelope: Envelope) -> ForwardOutcome {
        let bridge = self.clone();
        let started = self
            .resolver
            .begin_lookup(envelope, move |held| async move {
                bridge.lookup_timed_out(held).await;
            })
            .await;
        match started {
            Ok(correlation) => ForwardOutcome::Resolving(correlation),
            Err(LookupFailure { envelope, error }) => {
                self.return_to_sender(envelope, BounceReason::TransportFailure, error.to_string())
                    .await;
                ForwardOutcome::Bounced
            }
        }
    }

    /// Envelope with a concrete destination domain
    async fn route(&self, envelope: Envelope) -> ForwardOutcome {
        let domain = envelope.destination().domain().to_string();
        if self.ctx.is_own_domain(&domain) {
            return match self.ctx.runtime().deliver(envelope).await {
                Ok(()) => ForwardOutcome::Delivered,
                Err(failure) => {
                    let detail = failure.error.to_string();
                    self.return_to_sender(failure.envelope, BounceReason::NoRouteLocally, detail)
                        .await;
                    ForwardOutcome::Bounced
                }
            };
        }

        match self.publish_envelope(&domain, &envelope).await {
            Ok(()) => {
                TunnelMetrics::incr(&self.ctx.metrics().outbound);
                debug!(id = %envelope.id(), domain = %domain, "published");
                ForwardOutcome::Published { domain }
            }
            Err(e) => {
                warn!("Failed to forward {} to domain {}: {}", envelope.id(), domain, e);
                self.return_to_sender(envelope, BounceReason::TransportFailure, e.to_string())
                    .await;
                ForwardOutcome::Bounced
            }
        }
    }

    async fn publish_envelope(&self, domain: &str, envelope: &Envelope) -> Result<()> {
        let frame = Frame::Envelope(envelope.clone());
        self.ctx
            .publish_frame(self.ctx.domain_queue(domain), &frame, None, None)
            .await
    }
}

//! Name Responder
//!
//! Answers discovery broadcasts for actors exported by the local runtime and
//! stays silent for everything else. The export set follows the runtime's
//! exported/destroyed notifications; repeating a notification changes
//! nothing.

use crate::context::TunnelContext;
use crate::error::Result;
use crate::metrics::TunnelMetrics;
use broker_network::Destination;
use cells_codec::Frame;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct NameResponder {
    ctx: Arc<TunnelContext>,
}

impl NameResponder {
    pub fn new(ctx: Arc<TunnelContext>) -> Self {
        Self { ctx }
    }

    /// Record an exported actor. Returns whether the set changed.
    pub fn actor_exported(&self, actor: &str) -> bool {
        let added = self.ctx.state.lock().exports.insert(actor.to_string());
        if added {
            debug!(actor, "local export added");
            self.ctx.announce_trigger.notify_one();
        }
        added
    }

    /// Record a destroyed actor. Returns whether the set changed.
    pub fn actor_destroyed(&self, actor: &str) -> bool {
        let removed = self.ctx.state.lock().exports.remove(actor);
        if removed {
            debug!(actor, "local export removed");
            self.ctx.announce_trigger.notify_one();
        }
        removed
    }

    /// Replace the export set wholesale, e.g. after missing notifications
    pub fn resync(&self, actors: impl IntoIterator<Item = String>) {
        let actors: BTreeSet<String> = actors.into_iter().collect();
        let changed = {
            let mut state = self.ctx.state.lock();
            let changed = state.exports != actors;
            state.exports = actors;
            changed
        };
        if changed {
            self.ctx.announce_trigger.notify_one();
        }
    }

    pub fn is_exported(&self, actor: &str) -> bool {
        self.ctx.state.lock().exports.contains(actor)
    }

    /// Answer a discovery request if `actor` lives here. Returns whether a reply was sent.
    pub async fn handle_request(
        &self,
        actor: &str,
        reply_to: Option<Destination>,
        correlation_id: Option<String>,
    ) -> Result<bool> {
        if !self.is_exported(actor) {
            return Ok(false);
        }
        let Some(reply_to) = reply_to else {
            warn!("Discovery request for {} carries no reply destination", actor);
            return Ok(false);
        };

        let reply = Frame::DiscoveryReply {
            actor: actor.to_string(),
            domain: self.ctx.domain().to_string(),
        };
        self.ctx
            .publish_frame(reply_to, &reply, None, correlation_id)
            .await?;
        TunnelMetrics::incr(&self.ctx.metrics().discovery_replies);
        debug!(actor, domain = %self.ctx.domain(), "answered discovery request");
        Ok(true)
    }
}

//! Point-in-time view of a tunnel for operators

use crate::context::TunnelContext;
use crate::metrics::TunnelStats;
use crate::state::SubscriptionSlot;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tokio::time::Instant;

#[derive(Debug, Clone, Serialize)]
pub struct CacheRecord {
    pub actor: String,
    pub domain: String,
    pub remaining_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingRecord {
    pub correlation_id: String,
    pub actor: String,
    pub waiting_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TunnelSnapshot {
    pub address: String,
    pub stats: TunnelStats,
    pub local_exports: Vec<String>,
    /// Well-known actors announced per remote domain
    pub domains: BTreeMap<String, Vec<String>>,
    /// Domains whose queues are consumed, with whether the consumer is live
    pub consumers: BTreeMap<String, bool>,
    pub cache: Vec<CacheRecord>,
    pub pending_lookups: Vec<PendingRecord>,
}

impl TunnelSnapshot {
    pub(crate) fn capture(ctx: &TunnelContext) -> Self {
        let now = Instant::now();
        let mut state = ctx.state.lock();

        let cache = state
            .cache
            .entries(now)
            .into_iter()
            .map(|entry| CacheRecord {
                actor: entry.actor,
                domain: entry.domain,
                remaining_ms: entry.remaining.as_millis() as u64,
            })
            .collect();

        let mut pending_lookups: Vec<PendingRecord> = state
            .pending
            .iter()
            .map(|(correlation, pending)| PendingRecord {
                correlation_id: correlation.to_string(),
                actor: pending.actor.clone(),
                waiting_ms: now.saturating_duration_since(pending.started).as_millis() as u64,
            })
            .collect();
        pending_lookups.sort_by(|a, b| b.waiting_ms.cmp(&a.waiting_ms));

        Self {
            address: ctx.address().to_string(),
            stats: ctx.metrics().snapshot(),
            local_exports: state.exports.iter().cloned().collect(),
            domains: state
                .routes
                .iter()
                .map(|(domain, actors)| (domain.clone(), actors.iter().cloned().collect()))
                .collect(),
            consumers: state
                .subscriptions
                .iter()
                .map(|(domain, slot)| (domain.clone(), matches!(slot, SubscriptionSlot::Active(_))))
                .collect(),
            cache,
            pending_lookups,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for TunnelSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Tunnel {}", self.address)?;
        writeln!(
            f,
            "  outbound={} inbound={} bounces={} suppressed={} malformed={}",
            self.stats.outbound,
            self.stats.inbound,
            self.stats.bounces,
            self.stats.bounces_suppressed,
            self.stats.malformed
        )?;
        writeln!(f, "  local exports: {}", self.local_exports.join(", "))?;

        writeln!(f, "  domains:")?;
        for (domain, actors) in &self.domains {
            writeln!(f, "    {}: {}", domain, actors.join(", "))?;
        }

        writeln!(f, "  consumers:")?;
        for (domain, active) in &self.consumers {
            let state = if *active { "active" } else { "starting" };
            writeln!(f, "    {} ({})", domain, state)?;
        }

        writeln!(f, "  cache:")?;
        for entry in &self.cache {
            writeln!(f, "    {} -> {} ({} ms left)", entry.actor, entry.domain, entry.remaining_ms)?;
        }

        write!(f, "  pending lookups: {}", self.pending_lookups.len())?;
        for pending in &self.pending_lookups {
            write!(f, "\n    {} [{}] waiting {} ms", pending.actor, pending.correlation_id, pending.waiting_ms)?;
        }
        Ok(())
    }
}

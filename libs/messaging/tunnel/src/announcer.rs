//! Topology announcements
//!
//! Publishes the set of locally exported actors on the topology topic so
//! peers can install well-known routes without a discovery round trip. The
//! loop announces on every interval tick and whenever the export set
//! changes. An empty announcement withdraws the domain.

use crate::context::TunnelContext;
use crate::error::Result;
use crate::metrics::TunnelMetrics;
use cells_codec::Frame;
use cells_types::TopologyAnnouncement;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct TopologyAnnouncer {
    ctx: Arc<TunnelContext>,
}

impl TopologyAnnouncer {
    pub fn new(ctx: Arc<TunnelContext>) -> Self {
        Self { ctx }
    }

    /// Current exports of this domain, reserved names left out
    pub fn announcement(&self) -> TopologyAnnouncement {
        let actors: Vec<String> = self
            .ctx
            .state
            .lock()
            .exports
            .iter()
            .filter(|name| !self.ctx.is_reserved(name))
            .cloned()
            .collect();
        TopologyAnnouncement::new(self.ctx.domain(), actors)
    }

    pub async fn announce(&self) -> Result<()> {
        let announcement = self.announcement();
        debug!(domain = %announcement.domain, actors = announcement.actors.len(), "announcing topology");
        self.publish(announcement).await
    }

    /// Tell peers to drop every route into this domain
    pub async fn withdraw(&self) -> Result<()> {
        info!("Withdrawing topology of domain {}", self.ctx.domain());
        self.publish(TopologyAnnouncement::withdrawal(self.ctx.domain()))
            .await
    }

    /// Announce periodically and on export changes until the tunnel closes
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = self.ctx.announce_trigger.notified() => {}
                }
                if self.ctx.state.lock().closed {
                    break;
                }
                if let Err(e) = self.announce().await {
                    warn!("Topology announcement failed: {}", e);
                }
            }
        })
    }

    async fn publish(&self, announcement: TopologyAnnouncement) -> Result<()> {
        self.ctx
            .publish_frame(self.ctx.topology_topic(), &Frame::Topology(announcement), None, None)
            .await?;
        TunnelMetrics::incr(&self.ctx.metrics().announcements);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::harness;
    use broker_network::Destination;

    fn topology(body: &[u8]) -> TopologyAnnouncement {
        match Frame::decode(body).unwrap() {
            Frame::Topology(announcement) => announcement,
            other => panic!("expected topology frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn announcement_skips_reserved_names() {
        let h = harness("A").await;
        {
            let mut state = h.ctx.state.lock();
            state.exports.insert("pool".into());
            state.exports.insert("@internal".into());
        }
        let announcer = TopologyAnnouncer::new(h.ctx.clone());
        announcer.announce().await.unwrap();
        announcer.withdraw().await.unwrap();

        let sent = h.broker.published_to(&Destination::topic("cells.topology"));
        assert_eq!(sent.len(), 2);
        let first = topology(&sent[0].body);
        assert_eq!(first.domain, "A");
        assert_eq!(first.actors.into_iter().collect::<Vec<_>>(), vec!["pool".to_string()]);
        assert!(topology(&sent[1].body).actors.is_empty());
        assert_eq!(h.ctx.metrics().snapshot().announcements, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_announces_on_tick_and_on_change() {
        let h = harness("A").await;
        let handle = TopologyAnnouncer::new(h.ctx.clone()).spawn(Duration::from_secs(120));
        let topic = Destination::topic("cells.topology");

        // first tick is immediate
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(h.broker.published_to(&topic).len(), 1);

        h.ctx.state.lock().exports.insert("pool".into());
        h.ctx.announce_trigger.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let sent = h.broker.published_to(&topic);
        assert_eq!(sent.len(), 2);
        assert!(topology(&sent[1].body).actors.contains("pool"));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.broker.published_to(&topic).len(), 3);
        handle.abort();
    }
}

//! Route-table synchronization driven by announcements and runtime events

use broker_network::{BrokerMessage, BrokerTransport, Destination, MemoryBroker};
use broker_tunnel::Tunnel;
use cells_codec::Frame;
use cells_runtime::{ActorRuntime, LocalRuntime, RouteOperation, Visibility};
use cells_types::{ActorPath, Envelope, Payload, Route, TopologyAnnouncement};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tunnel_config::TunnelConfig;

fn path(s: &str) -> ActorPath {
    s.parse().unwrap()
}

fn names(list: &[&str]) -> BTreeSet<String> {
    list.iter().map(|s| s.to_string()).collect()
}

async fn start(broker: &MemoryBroker, config: TunnelConfig) -> (Tunnel, Arc<LocalRuntime>) {
    let runtime = Arc::new(LocalRuntime::new(config.tunnel.domain.clone()));
    let tunnel = Tunnel::start(config, Arc::new(broker.connection()), runtime.clone())
        .await
        .unwrap();
    (tunnel, runtime)
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 5s");
}

#[tokio::test]
async fn announced_set_changes_become_route_deltas() {
    let broker = MemoryBroker::new();
    let (tunnel, runtime) = start(&broker, TunnelConfig::for_domain("A")).await;
    runtime.clear_route_history();

    tunnel.update_routes("B", names(&["x", "y"]));
    tunnel.update_routes("B", names(&["y", "z"]));
    assert_eq!(
        runtime.route_history(),
        vec![
            RouteOperation::Added(Route::well_known("x", "B")),
            RouteOperation::Added(Route::well_known("y", "B")),
            RouteOperation::Removed(Route::well_known("x", "B")),
            RouteOperation::Added(Route::well_known("z", "B")),
        ]
    );

    let delta = tunnel.update_routes("B", names(&["y", "z"]));
    assert!(delta.is_empty());
    assert_eq!(tunnel.snapshot().domains["B"], vec!["y".to_string(), "z".to_string()]);

    tunnel.update_routes("B", BTreeSet::new());
    assert!(tunnel.snapshot().domains.is_empty());
    assert!(!runtime.has_route(&Route::well_known("y", "B")));
}

#[tokio::test]
async fn local_export_takes_precedence_over_announcement() {
    let broker = MemoryBroker::new();
    let (tunnel, runtime) = start(&broker, TunnelConfig::for_domain("A")).await;
    let _pool = runtime.open_mailbox("pool", Visibility::Exported).unwrap();
    eventually(|| tunnel.snapshot().local_exports.contains(&"pool".to_string())).await;

    tunnel.update_routes("B", names(&["pool"]));
    assert!(!runtime.has_route(&Route::well_known("pool", "B")));

    runtime.close_mailbox("pool").unwrap();
    eventually(|| runtime.has_route(&Route::well_known("pool", "B"))).await;
}

#[test_log::test(tokio::test)]
async fn announcements_install_routes_and_shutdown_withdraws_them() {
    let broker = MemoryBroker::new();
    let (a, a_runtime) = start(&broker, TunnelConfig::for_domain("A")).await;

    let mut b_config = TunnelConfig::for_domain("B");
    b_config.announce.enabled = true;
    let (b, b_runtime) = start(&broker, b_config).await;
    let mut pool = b_runtime.open_mailbox("pool", Visibility::Exported).unwrap();

    eventually(|| a_runtime.has_route(&Route::well_known("pool", "B"))).await;

    // the installed route makes discovery unnecessary
    a_runtime
        .send(Envelope::data(path("door@A"), path("pool@local"), Vec::new()))
        .unwrap();
    let delivered = tokio::time::timeout(Duration::from_secs(5), pool.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered.destination(), &path("pool@B"));
    assert_eq!(a.stats().lookups_started, 0);

    b.shutdown().await.unwrap();
    eventually(|| !a_runtime.has_route(&Route::well_known("pool", "B"))).await;
    a.shutdown().await.unwrap();
}

#[tokio::test]
async fn routing_info_addressed_to_tunnel_updates_routes() {
    let broker = MemoryBroker::new();
    let (tunnel, runtime) = start(&broker, TunnelConfig::for_domain("A")).await;

    runtime
        .send(Envelope::new(
            path("manager@A"),
            path("tunnel@A"),
            Payload::Topology(TopologyAnnouncement::new("C", vec!["ledger".to_string()])),
        ))
        .unwrap();
    eventually(|| runtime.has_route(&Route::well_known("ledger", "C"))).await;
    tunnel.shutdown().await.unwrap();
}

#[tokio::test]
async fn domain_route_events_manage_queue_consumers() {
    let broker = MemoryBroker::new();
    let (tunnel, runtime) = start(&broker, TunnelConfig::for_domain("A")).await;
    let mut link = runtime.open_mailbox("link-c", Visibility::Private).unwrap();
    let queue = Destination::queue("cells.domain.C");

    runtime.register_route(Route::domain("C", "link-c")).unwrap();
    eventually(|| broker.consumer_count(&queue) == 1).await;
    assert!(tunnel.snapshot().consumers.contains_key("C"));

    let raw = broker.connection();
    raw.connect().await.unwrap();
    let envelope = Envelope::data(path("door@B"), path("store@C"), Vec::new());
    raw.publish(BrokerMessage::new(
        queue.clone(),
        Frame::Envelope(envelope.clone()).encode().unwrap(),
    ))
    .await
    .unwrap();
    let relayed = tokio::time::timeout(Duration::from_secs(5), link.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(relayed.id(), envelope.id());

    tunnel.update_routes("C", names(&["store"]));
    runtime.remove_route(&Route::domain("C", "link-c")).unwrap();
    eventually(|| broker.consumer_count(&queue) == 0).await;
    assert!(!runtime.has_route(&Route::well_known("store", "C")));
    assert!(!tunnel.snapshot().consumers.contains_key("C"));
}

#[tokio::test]
async fn offline_broker_is_fatal_at_startup() {
    let broker = MemoryBroker::new();
    broker.set_offline(true);
    let runtime = Arc::new(LocalRuntime::new("A"));
    let err = Tunnel::start(
        TunnelConfig::for_domain("A"),
        Arc::new(broker.connection()),
        runtime,
    )
    .await
    .unwrap_err();
    assert!(err.to_string().starts_with("Startup error"));
}

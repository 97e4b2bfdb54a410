//! Broker transport abstraction

use crate::message::{BrokerMessage, Destination, Subscription, SubscriptionId};
use crate::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Publish/subscribe broker connection
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Establish the connection. Everything else fails until this succeeds.
    async fn connect(&self) -> Result<()>;

    /// Drop every subscription of this connection and disconnect
    async fn close(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Hand a message to the broker
    async fn publish(&self, message: BrokerMessage) -> Result<()>;

    /// Publish with an upper bound on how long the broker may take
    async fn publish_timeout(&self, message: BrokerMessage, timeout: Duration) -> Result<()> {
        let destination = message.destination.clone();
        tokio::time::timeout(timeout, self.publish(message))
            .await
            .map_err(|_| crate::TransportError::publish(destination, format!("timed out after {}ms", timeout.as_millis())))?
    }

    /// Attach a consumer to `destination`
    async fn subscribe(&self, destination: Destination) -> Result<Subscription>;

    /// Detach a consumer created by [`BrokerTransport::subscribe`]
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Fresh queue private to this connection, used as a reply destination
    async fn temporary_queue(&self) -> Result<Destination>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportError;

    /// Connection whose broker never acknowledges a publish
    struct StalledConnection;

    #[async_trait]
    impl BrokerTransport for StalledConnection {
        async fn connect(&self) -> Result<()> {
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            true
        }

        async fn publish(&self, _message: BrokerMessage) -> Result<()> {
            std::future::pending::<Result<()>>().await
        }

        async fn subscribe(&self, destination: Destination) -> Result<Subscription> {
            Err(TransportError::subscription(destination, "not supported"))
        }

        async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
            Err(TransportError::UnknownSubscription { id: id.0 })
        }

        async fn temporary_queue(&self) -> Result<Destination> {
            Ok(Destination::queue("tmp.stalled"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publish_timeout_turns_a_stalled_broker_into_an_error() {
        let message = BrokerMessage::new(Destination::queue("cells.domain.B"), b"x".to_vec());
        let err = StalledConnection
            .publish_timeout(message, Duration::from_millis(200))
            .await
            .unwrap_err();
        match err {
            TransportError::Publish { destination, message } => {
                assert_eq!(destination, "queue://cells.domain.B");
                assert!(message.contains("200ms"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

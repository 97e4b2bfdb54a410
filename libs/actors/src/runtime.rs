//! The runtime boundary seen by gateways such as the broker tunnel

use crate::error::{DeliveryFailure, Result};
use crate::events::RuntimeEvent;
use crate::registry::{Mailbox, Visibility};
use async_trait::async_trait;
use cells_types::{Envelope, Route};
use tokio::sync::broadcast;

#[async_trait]
pub trait ActorRuntime: Send + Sync {
    /// Domain served by this runtime
    fn domain(&self) -> &str;

    /// Install a routing table entry. Fails on a duplicate key.
    fn register_route(&self, route: Route) -> Result<()>;

    /// Remove an entry equal to `route`
    fn remove_route(&self, route: &Route) -> Result<()>;

    /// Hand an envelope arriving from outside to its mailbox.
    ///
    /// Envelopes for this domain go to the named mailbox, envelopes for
    /// another domain to the gateway of an explicit domain route. The
    /// default route is never used, so inbound traffic cannot be sent back
    /// out through the gateway it came from. Undeliverable envelopes come
    /// back inside the failure.
    async fn deliver(&self, envelope: Envelope) -> std::result::Result<(), DeliveryFailure>;

    /// Names of the actors currently exported by this domain
    fn exported_actors(&self) -> Vec<String>;

    /// Stream of lifecycle and routing events from now on
    fn subscribe_events(&self) -> broadcast::Receiver<RuntimeEvent>;

    fn open_mailbox(&self, actor: &str, visibility: Visibility) -> Result<Mailbox>;

    fn close_mailbox(&self, actor: &str) -> Result<()>;
}

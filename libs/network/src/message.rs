//! Broker message model

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Broker destination: point-to-point queue or fan-out topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Destination {
    Queue(String),
    Topic(String),
}

impl Destination {
    pub fn queue(name: impl Into<String>) -> Self {
        Destination::Queue(name.into())
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Destination::Topic(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Destination::Queue(name) | Destination::Topic(name) => name,
        }
    }

    pub fn is_topic(&self) -> bool {
        matches!(self, Destination::Topic(_))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Queue(name) => write!(f, "queue://{}", name),
            Destination::Topic(name) => write!(f, "topic://{}", name),
        }
    }
}

/// One message as seen by the broker. The body is opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    pub destination: Destination,
    /// Where replies to this message should go
    pub reply_to: Option<Destination>,
    /// Ties a reply to the request that caused it
    pub correlation_id: Option<String>,
    pub body: Bytes,
}

impl BrokerMessage {
    pub fn new(destination: Destination, body: impl Into<Bytes>) -> Self {
        Self {
            destination,
            reply_to: None,
            correlation_id: None,
            body: body.into(),
        }
    }

    pub fn with_reply_to(mut self, reply_to: Destination) -> Self {
        self.reply_to = Some(reply_to);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Handle identifying one consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Active consumer. Messages arrive on `receiver` until unsubscribed.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub destination: Destination,
    pub receiver: mpsc::Receiver<BrokerMessage>,
}

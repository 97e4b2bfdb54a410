//! In-process broker
//!
//! [`MemoryBroker`] is a shared hub; every domain talks to it through its own
//! [`MemoryConnection`]. Semantics follow a conventional message broker:
//!
//! - **Queues** deliver each message to one consumer, round-robin. Messages
//!   published while nobody consumes are kept until a consumer attaches.
//! - **Topics** deliver a copy to every current subscriber and keep nothing.
//! - **Temporary queues** are private to the connection that created them.
//!
//! The hub records every accepted publish (bounded) so tests can assert on
//! broker traffic, and supports failure injection for connect and publish.

use crate::error::{Result, TransportError};
use crate::message::{BrokerMessage, Destination, Subscription, SubscriptionId};
use crate::transport::BrokerTransport;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
const HISTORY_LIMIT: usize = 4096;

/// Shared in-process broker hub
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    state: Mutex<BrokerState>,
    offline: AtomicBool,
    next_subscription: AtomicU64,
    channel_capacity: usize,
    stats: BrokerCounters,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, QueueState>,
    topics: HashMap<String, Vec<Consumer>>,
    history: VecDeque<BrokerMessage>,
}

#[derive(Default)]
struct QueueState {
    consumers: Vec<Consumer>,
    backlog: VecDeque<BrokerMessage>,
    next_consumer: usize,
}

struct Consumer {
    id: SubscriptionId,
    sender: mpsc::Sender<BrokerMessage>,
}

#[derive(Default)]
struct BrokerCounters {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of hub counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub published: u64,
    pub delivered: u64,
    /// Topic copies lost because a subscriber channel was full or gone
    pub dropped: u64,
    pub backlog: usize,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Hub whose subscription channels hold at most `capacity` messages
    pub fn with_channel_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                state: Mutex::new(BrokerState::default()),
                offline: AtomicBool::new(false),
                next_subscription: AtomicU64::new(1),
                channel_capacity: capacity.max(1),
                stats: BrokerCounters::default(),
            }),
        }
    }

    /// New client connection to this hub (not yet connected)
    pub fn connection(&self) -> MemoryConnection {
        MemoryConnection {
            broker: self.clone(),
            id: Uuid::new_v4(),
            connected: AtomicBool::new(false),
            failing_publishes: AtomicU64::new(0),
            subscriptions: Mutex::new(HashMap::new()),
            temp_counter: AtomicU64::new(0),
        }
    }

    /// While offline, `connect` fails on every connection
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Every message accepted so far, oldest first
    pub fn published(&self) -> Vec<BrokerMessage> {
        self.inner.state.lock().history.iter().cloned().collect()
    }

    /// Accepted messages sent to `destination`
    pub fn published_to(&self, destination: &Destination) -> Vec<BrokerMessage> {
        self.inner
            .state
            .lock()
            .history
            .iter()
            .filter(|m| &m.destination == destination)
            .cloned()
            .collect()
    }

    /// Number of consumers attached to `destination`
    pub fn consumer_count(&self, destination: &Destination) -> usize {
        let state = self.inner.state.lock();
        match destination {
            Destination::Queue(name) => state.queues.get(name).map_or(0, |q| q.consumers.len()),
            Destination::Topic(name) => state.topics.get(name).map_or(0, Vec::len),
        }
    }

    pub fn stats(&self) -> BrokerStats {
        let backlog = self
            .inner
            .state
            .lock()
            .queues
            .values()
            .map(|q| q.backlog.len())
            .sum();
        BrokerStats {
            published: self.inner.stats.published.load(Ordering::Acquire),
            delivered: self.inner.stats.delivered.load(Ordering::Acquire),
            dropped: self.inner.stats.dropped.load(Ordering::Acquire),
            backlog,
        }
    }

    fn route(&self, message: BrokerMessage) {
        let stats = &self.inner.stats;
        let mut state = self.inner.state.lock();

        state.history.push_back(message.clone());
        if state.history.len() > HISTORY_LIMIT {
            state.history.pop_front();
        }
        stats.published.fetch_add(1, Ordering::AcqRel);

        let destination = message.destination.clone();
        match &destination {
            Destination::Topic(name) => {
                let Some(subscribers) = state.topics.get_mut(name) else {
                    trace!("No subscribers on topic {}", name);
                    return;
                };
                subscribers.retain(|consumer| match consumer.sender.try_send(message.clone()) {
                    Ok(()) => {
                        stats.delivered.fetch_add(1, Ordering::AcqRel);
                        true
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!("Topic {} subscriber {} is full, dropping copy", name, consumer.id);
                        stats.dropped.fetch_add(1, Ordering::AcqRel);
                        true
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        stats.dropped.fetch_add(1, Ordering::AcqRel);
                        false
                    }
                });
            }
            Destination::Queue(name) => {
                let queue = state.queues.entry(name.clone()).or_default();
                queue.backlog.push_back(message);
                let delivered = queue.drain();
                stats.delivered.fetch_add(delivered, Ordering::AcqRel);
            }
        }
    }

    fn attach(&self, destination: &Destination) -> (SubscriptionId, mpsc::Receiver<BrokerMessage>) {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::AcqRel));
        let (sender, receiver) = mpsc::channel(self.inner.channel_capacity);
        let consumer = Consumer { id, sender };

        let mut state = self.inner.state.lock();
        match destination {
            Destination::Topic(name) => state.topics.entry(name.clone()).or_default().push(consumer),
            Destination::Queue(name) => {
                let queue = state.queues.entry(name.clone()).or_default();
                queue.consumers.push(consumer);
                let delivered = queue.drain();
                self.inner.stats.delivered.fetch_add(delivered, Ordering::AcqRel);
            }
        }
        (id, receiver)
    }

    fn detach(&self, id: SubscriptionId, destination: &Destination) {
        let mut state = self.inner.state.lock();
        match destination {
            Destination::Topic(name) => {
                if let Some(subscribers) = state.topics.get_mut(name) {
                    subscribers.retain(|c| c.id != id);
                }
            }
            Destination::Queue(name) => {
                if let Some(queue) = state.queues.get_mut(name) {
                    queue.consumers.retain(|c| c.id != id);
                }
            }
        }
    }

    fn delete_queue(&self, name: &str) {
        self.inner.state.lock().queues.remove(name);
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl QueueState {
    /// Move backlog into consumers; returns the number delivered
    fn drain(&mut self) -> u64 {
        let mut delivered = 0;
        while let Some(message) = self.backlog.pop_front() {
            match self.offer(message) {
                Ok(()) => delivered += 1,
                Err(message) => {
                    self.backlog.push_front(message);
                    break;
                }
            }
        }
        delivered
    }

    /// Round-robin over live consumers; hands the message back if none can take it
    fn offer(&mut self, mut message: BrokerMessage) -> std::result::Result<(), BrokerMessage> {
        self.consumers.retain(|c| !c.sender.is_closed());
        for _ in 0..self.consumers.len() {
            let index = self.next_consumer % self.consumers.len();
            self.next_consumer = self.next_consumer.wrapping_add(1);
            match self.consumers[index].sender.try_send(message) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::TrySendError::Full(m)) | Err(mpsc::error::TrySendError::Closed(m)) => {
                    message = m;
                }
            }
        }
        Err(message)
    }
}

/// One client connection to a [`MemoryBroker`]
pub struct MemoryConnection {
    broker: MemoryBroker,
    id: Uuid,
    connected: AtomicBool,
    failing_publishes: AtomicU64,
    subscriptions: Mutex<HashMap<SubscriptionId, Destination>>,
    temp_counter: AtomicU64,
}

impl MemoryConnection {
    /// Make the next `count` publishes fail
    pub fn fail_next_publishes(&self, count: u64) {
        self.failing_publishes.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_publish(&self) {
        self.fail_next_publishes(1);
    }

    pub fn broker(&self) -> &MemoryBroker {
        &self.broker
    }

    /// Destinations this connection currently consumes from
    pub fn subscribed_destinations(&self) -> Vec<Destination> {
        self.subscriptions.lock().values().cloned().collect()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn temp_prefix(&self) -> String {
        format!("tmp.{}.", self.id.simple())
    }
}

#[async_trait]
impl BrokerTransport for MemoryConnection {
    async fn connect(&self) -> Result<()> {
        if self.broker.inner.offline.load(Ordering::SeqCst) {
            return Err(TransportError::connection("broker is offline"));
        }
        self.connected.store(true, Ordering::Release);
        debug!(connection = %self.id, "connected to in-memory broker");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let subscriptions: Vec<_> = self.subscriptions.lock().drain().collect();
        for (id, destination) in &subscriptions {
            self.broker.detach(*id, destination);
        }
        let prefix = self.temp_prefix();
        for (_, destination) in subscriptions {
            if let Destination::Queue(name) = destination {
                if name.starts_with(&prefix) {
                    self.broker.delete_queue(&name);
                }
            }
        }
        debug!(connection = %self.id, "closed in-memory broker connection");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn publish(&self, message: BrokerMessage) -> Result<()> {
        self.ensure_connected()?;
        let injected = self
            .failing_publishes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(TransportError::publish(&message.destination, "injected publish failure"));
        }
        trace!(destination = %message.destination, size = message.body.len(), "publish");
        self.broker.route(message);
        Ok(())
    }

    async fn subscribe(&self, destination: Destination) -> Result<Subscription> {
        self.ensure_connected()?;
        if let Destination::Queue(name) = &destination {
            if name.starts_with("tmp.") && !name.starts_with(&self.temp_prefix()) {
                return Err(TransportError::subscription(
                    &destination,
                    "temporary queue belongs to another connection",
                ));
            }
        }
        let (id, receiver) = self.broker.attach(&destination);
        self.subscriptions.lock().insert(id, destination.clone());
        debug!(subscription = %id, destination = %destination, "subscribed");
        Ok(Subscription {
            id,
            destination,
            receiver,
        })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let destination = self
            .subscriptions
            .lock()
            .remove(&id)
            .ok_or(TransportError::UnknownSubscription { id: id.0 })?;
        self.broker.detach(id, &destination);
        debug!(subscription = %id, destination = %destination, "unsubscribed");
        Ok(())
    }

    async fn temporary_queue(&self) -> Result<Destination> {
        self.ensure_connected()?;
        let n = self.temp_counter.fetch_add(1, Ordering::AcqRel);
        Ok(Destination::queue(format!("{}{}", self.temp_prefix(), n)))
    }
}

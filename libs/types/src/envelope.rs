//! Message envelopes exchanged between actors
//!
//! An [`Envelope`] is created once and then only moved: it is queued for
//! forwarding, handed to the runtime, or returned to the caller on failure.
//! The only way to derive a new envelope from an existing one is through the
//! consuming readdressing helpers or [`Envelope::bounce`].
//!
//! ```text
//!   Payload::Data ──┐
//!   Payload::Topology ──> may bounce ──> Payload::Bounce ──> never bounces again
//! ```

use crate::address::ActorPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Unique identity of one envelope, echoed by bounces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlates a discovery request with its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the textual form carried in broker message headers
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why an envelope was reflected to its sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BounceReason {
    /// Publishing to the broker failed
    TransportFailure,
    /// Discovery for the destination name produced no domain
    UnresolvedName,
    /// The receiving runtime had no route for the destination
    NoRouteLocally,
}

impl fmt::Display for BounceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BounceReason::TransportFailure => "transport failure",
            BounceReason::UnresolvedName => "unresolved name",
            BounceReason::NoRouteLocally => "no route",
        };
        f.write_str(text)
    }
}

/// Failure notification sent back to the source of an undeliverable envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounce {
    pub original_id: MessageId,
    pub original_destination: ActorPath,
    pub reason: BounceReason,
    pub detail: String,
}

/// Set of well-known actors hosted by one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyAnnouncement {
    pub domain: String,
    pub actors: BTreeSet<String>,
}

impl TopologyAnnouncement {
    pub fn new(domain: impl Into<String>, actors: impl IntoIterator<Item = String>) -> Self {
        Self {
            domain: domain.into(),
            actors: actors.into_iter().collect(),
        }
    }

    /// Announcement telling peers the domain no longer exports anything
    pub fn withdrawal(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            actors: BTreeSet::new(),
        }
    }
}

/// Envelope body, decided once at ingress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// Opaque application bytes
    Data(Vec<u8>),
    Bounce(Bounce),
    Topology(TopologyAnnouncement),
}

/// Routable message between two actors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    id: MessageId,
    source: ActorPath,
    destination: ActorPath,
    payload: Payload,
}

impl Envelope {
    pub fn new(source: ActorPath, destination: ActorPath, payload: Payload) -> Self {
        Self {
            id: MessageId::new(),
            source,
            destination,
            payload,
        }
    }

    /// Convenience for opaque data envelopes
    pub fn data(source: ActorPath, destination: ActorPath, body: impl Into<Vec<u8>>) -> Self {
        Self::new(source, destination, Payload::Data(body.into()))
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn source(&self) -> &ActorPath {
        &self.source
    }

    pub fn destination(&self) -> &ActorPath {
        &self.destination
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }

    pub fn is_bounce(&self) -> bool {
        matches!(self.payload, Payload::Bounce(_))
    }

    /// Same envelope (same id) with the destination moved to `domain`
    pub fn with_destination_domain(mut self, domain: &str) -> Self {
        self.destination = retarget(self.destination, domain);
        self
    }

    /// Same envelope (same id) with the source moved to `domain`
    pub fn with_source_domain(mut self, domain: &str) -> Self {
        self.source = retarget(self.source, domain);
        self
    }

    /// Failure notice addressed to this envelope's source.
    ///
    /// Returns `None` for bounces: a bounce is never answered with another
    /// bounce, which keeps failure notices from circulating between domains.
    pub fn bounce(&self, reason: BounceReason, detail: impl Into<String>, from: ActorPath) -> Option<Envelope> {
        if self.is_bounce() {
            return None;
        }
        Some(Envelope::new(
            from,
            self.source.clone(),
            Payload::Bounce(Bounce {
                original_id: self.id,
                original_destination: self.destination.clone(),
                reason,
                detail: detail.into(),
            }),
        ))
    }
}

fn retarget(path: ActorPath, domain: &str) -> ActorPath {
    match path.with_domain(domain) {
        Ok(moved) => moved,
        Err(_) => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> ActorPath {
        s.parse().unwrap()
    }

    #[test]
    fn bounce_targets_source_and_echoes_id() {
        let envelope = Envelope::data(path("client@A"), path("pool@B"), b"ping".to_vec());
        let bounce = envelope
            .bounce(BounceReason::NoRouteLocally, "no such cell", path("tunnel@B"))
            .unwrap();

        assert_eq!(bounce.destination(), &path("client@A"));
        assert_eq!(bounce.source(), &path("tunnel@B"));
        match bounce.payload() {
            Payload::Bounce(notice) => {
                assert_eq!(notice.original_id, envelope.id());
                assert_eq!(notice.original_destination, path("pool@B"));
                assert_eq!(notice.reason, BounceReason::NoRouteLocally);
            }
            other => panic!("expected bounce, got {other:?}"),
        }
    }

    #[test]
    fn bounce_of_bounce_is_suppressed() {
        let envelope = Envelope::data(path("client@A"), path("pool@B"), Vec::new());
        let first = envelope
            .bounce(BounceReason::TransportFailure, "", path("tunnel@A"))
            .unwrap();
        assert!(first
            .bounce(BounceReason::TransportFailure, "", path("tunnel@A"))
            .is_none());
    }

    #[test]
    fn readdressing_keeps_identity() {
        let envelope = Envelope::data(path("client@local"), path("pool@local"), Vec::new());
        let id = envelope.id();
        let moved = envelope.with_destination_domain("B").with_source_domain("A");
        assert_eq!(moved.id(), id);
        assert_eq!(moved.destination(), &path("pool@B"));
        assert_eq!(moved.source(), &path("client@A"));
    }

    #[test]
    fn envelope_serializes_to_json() {
        let envelope = Envelope::new(
            path("routing@A"),
            path("tunnel@B"),
            Payload::Topology(TopologyAnnouncement::new("A", ["x".to_string()])),
        );
        let json = serde_json::to_string(&envelope).unwrap();
        let decoded: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, envelope);
    }
}

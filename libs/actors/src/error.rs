//! Runtime error types

use cells_types::{ActorPath, Envelope, Route};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// An entry with the same kind and destination already exists
    #[error("Duplicate route: {route} (existing: {existing})")]
    DuplicateRoute { route: Route, existing: Route },

    #[error("Route not found: {route}")]
    UnknownRoute { route: Route },

    #[error("Actor '{actor}' already has a mailbox")]
    DuplicateMailbox { actor: String },

    #[error("No mailbox for actor '{actor}'")]
    UnknownMailbox { actor: String },

    /// Mailbox exists but cannot take more envelopes right now
    #[error("Mailbox of '{actor}' is full")]
    MailboxFull { actor: String },

    #[error("No route to {destination}")]
    NoRoute { destination: ActorPath },
}

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Failed delivery. The envelope is handed back so the caller decides its fate.
#[derive(Debug, Error)]
#[error("Delivery of {} to {} failed: {error}", .envelope.id(), .envelope.destination())]
pub struct DeliveryFailure {
    pub envelope: Envelope,
    pub error: RuntimeError,
}

impl DeliveryFailure {
    pub fn new(envelope: Envelope, error: RuntimeError) -> Self {
        Self { envelope, error }
    }

    pub fn no_route(envelope: Envelope) -> Self {
        let destination = envelope.destination().clone();
        Self::new(envelope, RuntimeError::NoRoute { destination })
    }
}

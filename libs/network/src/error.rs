//! Broker Transport Error Types
//!
//! Error handling for broker connections, publishing and subscriptions.

use thiserror::Error;

/// Main transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    /// Operation attempted before `connect` or after `close`
    #[error("Not connected to broker")]
    NotConnected,

    /// Connection establishment failed
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Message could not be handed to the broker
    #[error("Publish to {destination} failed: {message}")]
    Publish { destination: String, message: String },

    /// Consumer could not be attached
    #[error("Subscription to {destination} failed: {message}")]
    Subscription { destination: String, message: String },

    #[error("Unknown subscription {id}")]
    UnknownSubscription { id: u64 },

    /// Consumer queue full
    #[error("Resource exhausted: {resource}: {message}")]
    ResourceExhausted { resource: String, message: String },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn publish(destination: impl ToString, message: impl Into<String>) -> Self {
        Self::Publish {
            destination: destination.to_string(),
            message: message.into(),
        }
    }

    pub fn subscription(destination: impl ToString, message: impl Into<String>) -> Self {
        Self::Subscription {
            destination: destination.to_string(),
            message: message.into(),
        }
    }

    pub fn resource_exhausted(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

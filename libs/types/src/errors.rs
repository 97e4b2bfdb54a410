//! Error types for address and route validation

use thiserror::Error;

/// Errors raised while building actor paths or routes
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Actor component missing
    #[error("actor name cannot be empty")]
    EmptyActor,

    /// Domain component missing after the separator
    #[error("domain of actor '{actor}' cannot be empty")]
    EmptyDomain { actor: String },

    /// Domain contains the path separator
    #[error("invalid domain name '{domain}'")]
    InvalidDomain { domain: String },
}

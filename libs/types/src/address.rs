//! Actor addressing
//!
//! An [`ActorPath`] names an actor together with the domain hosting it. The
//! domain may be the literal [`LOCAL_DOMAIN`], which means "not known yet":
//! on a destination it asks the tunnel to resolve the name, on a source it
//! stands for the sending process and is rewritten to the real domain before
//! the envelope leaves it.

use crate::errors::AddressError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder domain for actors whose hosting domain is not spelled out
pub const LOCAL_DOMAIN: &str = "local";

/// Address of an actor: `actor@domain`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorPath {
    actor: String,
    domain: String,
}

impl ActorPath {
    /// Build a path, rejecting empty components and embedded separators in the domain
    pub fn new(actor: impl Into<String>, domain: impl Into<String>) -> Result<Self, AddressError> {
        let actor = actor.into();
        let domain = domain.into();
        if actor.is_empty() {
            return Err(AddressError::EmptyActor);
        }
        if domain.is_empty() {
            return Err(AddressError::EmptyDomain { actor });
        }
        if domain.contains('@') {
            return Err(AddressError::InvalidDomain { domain });
        }
        Ok(Self { actor, domain })
    }

    /// Path whose domain still has to be resolved
    pub fn local(actor: impl Into<String>) -> Result<Self, AddressError> {
        Self::new(actor, LOCAL_DOMAIN)
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// True when the domain is the unresolved placeholder
    pub fn is_local(&self) -> bool {
        self.domain == LOCAL_DOMAIN
    }

    /// Same actor, different domain
    pub fn with_domain(&self, domain: impl Into<String>) -> Result<Self, AddressError> {
        Self::new(self.actor.clone(), domain)
    }
}

impl fmt::Display for ActorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.actor, self.domain)
    }
}

impl FromStr for ActorPath {
    type Err = AddressError;

    /// Parses `actor@domain`; a bare `actor` (or one whose only `@` is the
    /// leading reserved marker) gets the local placeholder domain.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once('@') {
            Some((actor, domain)) if !actor.is_empty() => Self::new(actor, domain),
            _ => Self::local(s),
        }
    }
}

//! Routing table entries of the actor runtime

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of routing table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteKind {
    /// Actor name -> domain that hosts it
    WellKnown,
    /// Domain -> local gateway actor that reaches it
    Domain,
    /// Catch-all gateway for anything without a more specific route
    Default,
}

/// One routing table entry.
///
/// `destination` is the actor name for well-known routes, the domain name for
/// domain routes and absent for the default route. `gateway` is the domain
/// for well-known routes and the gateway actor otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    kind: RouteKind,
    destination: Option<String>,
    gateway: String,
}

impl Route {
    pub fn well_known(actor: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            kind: RouteKind::WellKnown,
            destination: Some(actor.into()),
            gateway: domain.into(),
        }
    }

    pub fn domain(domain: impl Into<String>, gateway: impl Into<String>) -> Self {
        Self {
            kind: RouteKind::Domain,
            destination: Some(domain.into()),
            gateway: gateway.into(),
        }
    }

    pub fn default_route(gateway: impl Into<String>) -> Self {
        Self {
            kind: RouteKind::Default,
            destination: None,
            gateway: gateway.into(),
        }
    }

    pub fn kind(&self) -> RouteKind {
        self.kind
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn gateway(&self) -> &str {
        &self.gateway
    }

    /// Key under which the runtime stores the entry
    pub fn key(&self) -> (RouteKind, Option<&str>) {
        (self.kind, self.destination())
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.destination) {
            (RouteKind::WellKnown, Some(actor)) => write!(f, "well-known {} -> *@{}", actor, self.gateway),
            (RouteKind::Domain, Some(domain)) => write!(f, "domain {} -> {}", domain, self.gateway),
            (_, _) => write!(f, "default -> {}", self.gateway),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_route_kind() {
        assert_eq!(Route::well_known("pool", "B").to_string(), "well-known pool -> *@B");
        assert_eq!(Route::domain("B", "tunnel").to_string(), "domain B -> tunnel");
        assert_eq!(Route::default_route("tunnel").to_string(), "default -> tunnel");
    }
}

//! Last announced well-known actors per remote domain

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RouteTable {
    domains: BTreeMap<String, BTreeSet<String>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, domain: &str) -> Option<&BTreeSet<String>> {
        self.domains.get(domain)
    }

    /// Store the announced set; an empty set removes the domain. Returns the previous set.
    pub fn replace(&mut self, domain: &str, actors: BTreeSet<String>) -> BTreeSet<String> {
        let previous = if actors.is_empty() {
            self.domains.remove(domain)
        } else {
            self.domains.insert(domain.to_string(), actors)
        };
        previous.unwrap_or_default()
    }

    /// Domain other than `except` whose set contains `actor`
    pub fn owner_other_than(&self, actor: &str, except: &str) -> Option<String> {
        self.domains
            .iter()
            .find(|(domain, actors)| domain.as_str() != except && actors.contains(actor))
            .map(|(domain, _)| domain.clone())
    }

    /// Drop `actor` from the set of `domain`, removing the domain if it empties
    pub fn forget(&mut self, domain: &str, actor: &str) {
        if let Some(actors) = self.domains.get_mut(domain) {
            actors.remove(actor);
            if actors.is_empty() {
                self.domains.remove(domain);
            }
        }
    }

    /// Domain currently announcing `actor`
    pub fn owner(&self, actor: &str) -> Option<&str> {
        self.domains
            .iter()
            .find(|(_, actors)| actors.contains(actor))
            .map(|(domain, _)| domain.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.domains.iter()
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

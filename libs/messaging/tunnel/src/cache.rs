//! Name resolution cache
//!
//! Every entry lives for the same TTL, so insertion order is also expiry
//! order. Expired entries are trimmed from the front of the insertion queue
//! and trimming stops at the first live record, which makes eviction
//! proportional to the number of expired entries.
//!
//! Re-inserting a name leaves its old queue record behind. A record only
//! evicts the map entry whose expiry it carries, so a refreshed entry is
//! never dropped by its stale predecessor.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheEntry {
    domain: String,
    expires_at: Instant,
}

/// Cached `actor -> domain` answer with its remaining lifetime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResolution {
    pub actor: String,
    pub domain: String,
    pub remaining: Duration,
}

#[derive(Debug)]
pub struct ResolutionCache {
    ttl: Duration,
    order: VecDeque<(String, Instant)>,
    entries: HashMap<String, CacheEntry>,
}

impl ResolutionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Remember that `actor` lives in `domain` until `now + ttl`
    pub fn insert(&mut self, actor: &str, domain: &str, now: Instant) {
        self.trim(now);
        let expires_at = now + self.ttl;
        self.entries.insert(
            actor.to_string(),
            CacheEntry {
                domain: domain.to_string(),
                expires_at,
            },
        );
        self.order.push_back((actor.to_string(), expires_at));
    }

    /// Domain of `actor` if known and not expired at `now`
    pub fn get(&mut self, actor: &str, now: Instant) -> Option<String> {
        self.trim(now);
        self.entries
            .get(actor)
            .filter(|entry| now < entry.expires_at)
            .map(|entry| entry.domain.clone())
    }

    /// Forget every answer pointing at `domain`
    pub fn invalidate_domain(&mut self, domain: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.domain != domain);
        before - self.entries.len()
    }

    /// Drop expired entries, oldest first
    pub fn trim(&mut self, now: Instant) {
        while let Some((actor, expires_at)) = self.order.front() {
            if *expires_at > now {
                break;
            }
            if self.entries.get(actor).map(|e| e.expires_at) == Some(*expires_at) {
                self.entries.remove(actor);
            }
            self.order.pop_front();
        }
    }

    /// Live entries in insertion order
    pub fn entries(&mut self, now: Instant) -> Vec<CachedResolution> {
        self.trim(now);
        self.order
            .iter()
            .filter_map(|(actor, expires_at)| {
                let entry = self.entries.get(actor)?;
                (entry.expires_at == *expires_at).then(|| CachedResolution {
                    actor: actor.clone(),
                    domain: entry.domain.clone(),
                    remaining: entry.expires_at.saturating_duration_since(now),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(120);

    #[test]
    fn entry_visible_strictly_before_expiry() {
        let start = Instant::now();
        let mut cache = ResolutionCache::new(TTL);
        cache.insert("pool", "B", start);

        assert_eq!(cache.get("pool", start).as_deref(), Some("B"));
        assert_eq!(
            cache.get("pool", start + TTL - Duration::from_millis(1)).as_deref(),
            Some("B")
        );
        assert_eq!(cache.get("pool", start + TTL), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn trim_stops_at_first_live_entry() {
        let start = Instant::now();
        let mut cache = ResolutionCache::new(TTL);
        cache.insert("a", "B", start);
        cache.insert("b", "B", start + Duration::from_secs(10));
        cache.insert("c", "C", start + Duration::from_secs(20));

        cache.trim(start + TTL + Duration::from_secs(5));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.order.len(), 2);
        assert_eq!(cache.get("a", start + TTL + Duration::from_secs(5)), None);
        assert!(cache.get("c", start + TTL + Duration::from_secs(5)).is_some());
    }

    #[test]
    fn refreshed_entry_survives_its_stale_record() {
        let start = Instant::now();
        let mut cache = ResolutionCache::new(TTL);
        cache.insert("pool", "B", start);
        cache.insert("pool", "C", start + Duration::from_secs(60));

        let later = start + TTL + Duration::from_secs(1);
        assert_eq!(cache.get("pool", later).as_deref(), Some("C"));

        let entries = cache.entries(later);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].remaining, Duration::from_secs(59));
    }

    #[test]
    fn invalidate_domain_forgets_its_answers() {
        let start = Instant::now();
        let mut cache = ResolutionCache::new(TTL);
        cache.insert("x", "B", start);
        cache.insert("y", "C", start);

        assert_eq!(cache.invalidate_domain("B"), 1);
        assert_eq!(cache.get("x", start), None);
        assert_eq!(cache.get("y", start).as_deref(), Some("C"));
        // stale queue record for x is harmless
        cache.trim(start + TTL);
        assert!(cache.is_empty());
    }
}

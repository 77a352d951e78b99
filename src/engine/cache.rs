use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::decision::{Decision, Tier};

/// Process-local memoization of recent allow decisions.
///
/// Collapses bursts of identical calls onto one store evaluation. Denials
/// are never stored — caching them would extend an outage past its cause.
/// Within the TTL the true bucket can only gain tokens, so a cached allow
/// cannot have flipped to a deny; the bucket is under-charged for the
/// collapsed repeats, which is the accepted trade-off.
///
/// Expired entries are dropped at lookup time; with a 1-second TTL and
/// per-identity keys there is nothing worth a background sweeper.
pub struct DecisionCache {
    entries: DashMap<String, CachedDecision>,
    ttl: Duration,
}

struct CachedDecision {
    decision: Decision,
    expires_at: Instant,
}

impl DecisionCache {
    /// A zero TTL disables the cache entirely.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn key(identity: &str, endpoint: &str, tier: Tier) -> String {
        format!("check:{identity}:{endpoint}:{}", tier.as_str())
    }

    pub fn lookup(&self, key: &str) -> Option<Decision> {
        if self.ttl.is_zero() {
            return None;
        }
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > Instant::now() {
                return Some(entry.decision);
            }
        }
        // Guard dropped before removal — DashMap deadlocks otherwise.
        self.entries.remove(key);
        None
    }

    pub fn insert_allow(&self, key: String, decision: Decision) {
        if self.ttl.is_zero() || !decision.allowed {
            return;
        }
        self.entries.insert(
            key,
            CachedDecision {
                decision,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Drop every cached decision for `identity` — called when a tier is
    /// reassigned so stale-tier allows cannot outlive the change.
    pub fn clear_for(&self, identity: &str) {
        let prefix = format!("check:{identity}:");
        self.entries.retain(|key, _| !key.starts_with(&prefix));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::decision::Remaining;

    fn allow(remaining: u64) -> Decision {
        Decision {
            allowed: true,
            remaining: Remaining::Finite(remaining),
            retry_after_seconds: 0,
            cost: 1,
        }
    }

    fn deny() -> Decision {
        Decision {
            allowed: false,
            remaining: Remaining::Finite(0),
            retry_after_seconds: 5,
            cost: 1,
        }
    }

    #[test]
    fn test_hit_within_ttl() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        let key = DecisionCache::key("u1", "/api/search", Tier::Free);
        cache.insert_allow(key.clone(), allow(19));
        assert_eq!(cache.lookup(&key), Some(allow(19)));
    }

    #[test]
    fn test_expired_entry_misses() {
        let cache = DecisionCache::new(Duration::from_millis(10));
        let key = DecisionCache::key("u1", "/api/search", Tier::Free);
        cache.insert_allow(key.clone(), allow(19));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.lookup(&key), None);
    }

    #[test]
    fn test_denials_are_not_cached() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        let key = DecisionCache::key("u1", "/api/search", Tier::Free);
        cache.insert_allow(key.clone(), deny());
        assert_eq!(cache.lookup(&key), None);
    }

    #[test]
    fn test_zero_ttl_disables_cache() {
        let cache = DecisionCache::new(Duration::ZERO);
        let key = DecisionCache::key("u1", "/api/search", Tier::Free);
        cache.insert_allow(key.clone(), allow(19));
        assert_eq!(cache.lookup(&key), None);
    }

    #[test]
    fn test_clear_for_identity() {
        let cache = DecisionCache::new(Duration::from_secs(60));
        let k1 = DecisionCache::key("u1", "/api/search", Tier::Free);
        let k2 = DecisionCache::key("u1", "/api/profile", Tier::Free);
        let k3 = DecisionCache::key("u2", "/api/search", Tier::Free);
        cache.insert_allow(k1.clone(), allow(1));
        cache.insert_allow(k2.clone(), allow(2));
        cache.insert_allow(k3.clone(), allow(3));

        cache.clear_for("u1");
        assert_eq!(cache.lookup(&k1), None);
        assert_eq!(cache.lookup(&k2), None);
        assert_eq!(cache.lookup(&k3), Some(allow(3)));
    }
}

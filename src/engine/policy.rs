use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::{PolicyEntry, RatePolicy};

use super::decision::Tier;

pub const DEFAULT_REGION: &str = "DEFAULT";

/// One immutable snapshot of the policy and region tables.
#[derive(Clone)]
struct PolicyTable {
    policies: HashMap<Tier, HashMap<String, RatePolicy>>,
    regions: HashMap<String, f64>,
}

impl PolicyTable {
    /// The shipped defaults for the platform's three rated endpoints.
    fn shipped() -> Self {
        fn p(max: u64, burst: u64) -> RatePolicy {
            RatePolicy {
                window_seconds: 3600,
                max,
                burst,
            }
        }

        let mut policies: HashMap<Tier, HashMap<String, RatePolicy>> = HashMap::new();
        policies.insert(
            Tier::Free,
            HashMap::from([
                ("/api/search".to_string(), p(100, 20)),
                ("/api/checkout".to_string(), p(10, 2)),
                ("/api/profile".to_string(), p(50, 10)),
            ]),
        );
        policies.insert(
            Tier::Premium,
            HashMap::from([
                ("/api/search".to_string(), p(1000, 100)),
                ("/api/checkout".to_string(), p(100, 20)),
                ("/api/profile".to_string(), p(200, 40)),
            ]),
        );
        policies.insert(
            Tier::Enterprise,
            HashMap::from([
                ("/api/search".to_string(), p(10000, 1000)),
                ("/api/checkout".to_string(), p(1000, 200)),
                ("/api/profile".to_string(), p(1000, 200)),
            ]),
        );

        let regions = HashMap::from([
            ("US".to_string(), 1.0),
            ("EU".to_string(), 1.0),
            ("CN".to_string(), 0.5),
            ("IN".to_string(), 2.0),
            (DEFAULT_REGION.to_string(), 1.0),
        ]);

        Self { policies, regions }
    }
}

/// Policy and region-multiplier registry.
///
/// Read-mostly: lookups go through a lock-free `ArcSwap` snapshot, so a
/// reader never observes a half-applied write. Mutations clone the table
/// under a mutex and swap it in whole.
pub struct PolicyRegistry {
    table: ArcSwap<PolicyTable>,
    write_mu: Mutex<()>,
}

impl PolicyRegistry {
    /// Shipped table plus file-level overrides.
    pub fn new(entries: &[PolicyEntry], regions: &HashMap<String, f64>) -> Self {
        let mut table = PolicyTable::shipped();
        for entry in entries {
            let tier = Tier::parse(&entry.tier);
            table
                .policies
                .entry(tier)
                .or_default()
                .insert(entry.endpoint.clone(), entry.policy);
        }
        for (region, mult) in regions {
            table.regions.insert(region.clone(), *mult);
        }

        Self {
            table: ArcSwap::new(Arc::new(table)),
            write_mu: Mutex::new(()),
        }
    }

    /// The policy governing `(tier, endpoint)`. `Unlimited` carries no
    /// policies; an absent entry means the endpoint is unrated for the tier.
    pub fn policy_for(&self, tier: Tier, endpoint: &str) -> Option<RatePolicy> {
        if tier == Tier::Unlimited {
            return None;
        }
        self.table
            .load()
            .policies
            .get(&tier)
            .and_then(|row| row.get(endpoint))
            .copied()
    }

    /// Multiplier for `region`, falling back to the `DEFAULT` entry.
    pub fn region_multiplier(&self, region: &str) -> f64 {
        let table = self.table.load();
        table
            .regions
            .get(region)
            .or_else(|| table.regions.get(DEFAULT_REGION))
            .copied()
            .unwrap_or(1.0)
    }

    /// Replace the policy for `(tier, endpoint)`. Writes to `Unlimited`
    /// are ignored — that tier has no policies by construction. Returns
    /// whether the write applied.
    pub fn set_policy(&self, tier: Tier, endpoint: &str, policy: RatePolicy) -> bool {
        if tier == Tier::Unlimited {
            tracing::warn!("policy: write to unlimited tier ignored, endpoint={}", endpoint);
            return false;
        }
        let _guard = self.write_mu.lock().unwrap();
        let mut next = (**self.table.load()).clone();
        next.policies
            .entry(tier)
            .or_default()
            .insert(endpoint.to_string(), policy);
        self.table.store(Arc::new(next));
        true
    }

    pub fn policy_count(&self) -> usize {
        self.table.load().policies.values().map(|row| row.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PolicyRegistry {
        PolicyRegistry::new(&[], &HashMap::new())
    }

    #[test]
    fn test_shipped_table() {
        let reg = registry();
        let p = reg.policy_for(Tier::Free, "/api/search").unwrap();
        assert_eq!(p.max, 100);
        assert_eq!(p.burst, 20);
        assert_eq!(p.window_seconds, 3600);

        let p = reg.policy_for(Tier::Enterprise, "/api/checkout").unwrap();
        assert_eq!(p.max, 1000);
        assert_eq!(p.burst, 200);

        assert_eq!(reg.policy_count(), 9);
    }

    #[test]
    fn test_unknown_endpoint_is_unrated() {
        let reg = registry();
        assert!(reg.policy_for(Tier::Free, "/api/unknown").is_none());
    }

    #[test]
    fn test_unlimited_has_no_policies() {
        let reg = registry();
        assert!(reg.policy_for(Tier::Unlimited, "/api/search").is_none());

        reg.set_policy(
            Tier::Unlimited,
            "/api/search",
            RatePolicy {
                window_seconds: 60,
                max: 1,
                burst: 1,
            },
        );
        assert!(reg.policy_for(Tier::Unlimited, "/api/search").is_none());
    }

    #[test]
    fn test_region_multipliers() {
        let reg = registry();
        assert_eq!(reg.region_multiplier("US"), 1.0);
        assert_eq!(reg.region_multiplier("CN"), 0.5);
        assert_eq!(reg.region_multiplier("IN"), 2.0);
        assert_eq!(reg.region_multiplier("MARS"), 1.0);
    }

    #[test]
    fn test_set_policy_read_back() {
        let reg = registry();
        let policy = RatePolicy {
            window_seconds: 600,
            max: 42,
            burst: 7,
        };
        reg.set_policy(Tier::Premium, "/api/orders", policy);
        assert_eq!(reg.policy_for(Tier::Premium, "/api/orders"), Some(policy));
    }

    #[test]
    fn test_file_entries_override_shipped() {
        let entries = vec![PolicyEntry {
            tier: "free".into(),
            endpoint: "/api/search".into(),
            policy: RatePolicy {
                window_seconds: 60,
                max: 5,
                burst: 2,
            },
        }];
        let reg = PolicyRegistry::new(&entries, &HashMap::from([("CN".to_string(), 0.8)]));
        assert_eq!(reg.policy_for(Tier::Free, "/api/search").unwrap().max, 5);
        assert_eq!(reg.region_multiplier("CN"), 0.8);
    }
}

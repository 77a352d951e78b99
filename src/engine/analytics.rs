use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::decision::Tier;

/// Process-local decision counters keyed by `(endpoint, tier, region)`.
///
/// Best-effort and non-durable; the authoritative admission accounting
/// lives in the shared store. Incremented exactly once per decision the
/// engine returns, whether it came from the cache, the atomic path, or
/// the fallback path.
#[derive(Default)]
pub struct AnalyticsRecorder {
    counters: DashMap<AnalyticsKey, Counters>,
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct AnalyticsKey {
    endpoint: String,
    tier: Tier,
    region: String,
}

#[derive(Default)]
struct Counters {
    allowed: AtomicU64,
    denied: AtomicU64,
}

impl AnalyticsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, endpoint: &str, tier: Tier, region: &str, allowed: bool) {
        let key = AnalyticsKey {
            endpoint: endpoint.to_string(),
            tier,
            region: region.to_string(),
        };
        let entry = self.counters.entry(key).or_default();
        if allowed {
            entry.allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            entry.denied.fetch_add(1, Ordering::Relaxed);
        }

        metrics::counter!(
            "limiter_decisions_total",
            "endpoint" => endpoint.to_string(),
            "tier" => tier.as_str(),
            "region" => region.to_string(),
            "allowed" => if allowed { "true" } else { "false" },
        )
        .increment(1);
    }

    /// Snapshot of all combinations plus aggregate totals, sorted for
    /// stable output.
    pub fn report(&self) -> AnalyticsReport {
        let mut entries: Vec<AnalyticsEntry> = self
            .counters
            .iter()
            .map(|item| {
                let allowed = item.value().allowed.load(Ordering::Relaxed);
                let denied = item.value().denied.load(Ordering::Relaxed);
                let total = allowed + denied;
                AnalyticsEntry {
                    endpoint: item.key().endpoint.clone(),
                    tier: item.key().tier.as_str().to_string(),
                    region: item.key().region.clone(),
                    allowed,
                    denied,
                    total,
                    allow_rate: if total > 0 {
                        allowed as f64 / total as f64
                    } else {
                        0.0
                    },
                }
            })
            .collect();
        entries.sort_by(|a, b| {
            (&a.endpoint, &a.tier, &a.region).cmp(&(&b.endpoint, &b.tier, &b.region))
        });

        let total_allowed = entries.iter().map(|e| e.allowed).sum();
        let total_denied = entries.iter().map(|e| e.denied).sum();
        AnalyticsReport {
            total_allowed,
            total_denied,
            total: total_allowed + total_denied,
            entries,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub total_allowed: u64,
    pub total_denied: u64,
    pub total: u64,
    pub entries: Vec<AnalyticsEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsEntry {
    pub endpoint: String,
    pub tier: String,
    pub region: String,
    pub allowed: u64,
    pub denied: u64,
    pub total: u64,
    pub allow_rate: f64,
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Top-level service configuration.
///
/// Everything here is infrastructure or engine tuning. The shipped policy
/// table and region multipliers are code defaults (see `engine::policy`);
/// `policies` / `regions` extend or override them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub slow_start: SlowStartConfig,

    #[serde(default)]
    pub audit: AuditConfig,

    /// Additional `(tier, endpoint)` policies merged over the shipped table.
    #[serde(default)]
    pub policies: Vec<PolicyEntry>,

    /// Additional region multipliers merged over the shipped table.
    #[serde(default)]
    pub regions: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL. The literal value `"memory"` (or an empty
    /// string) selects the in-process store — standalone mode, decisions
    /// are not shared across instances.
    #[serde(default = "default_store_url")]
    pub url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
        }
    }
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for locally cached allow decisions. 0 disables the cache.
    /// Values above 1 widen the window in which the shared bucket is
    /// under-charged for repeats; keep at 1 unless you know better.
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlowStartConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ramp length. The first-seen marker carries this TTL, so an identity
    /// dormant longer than the ramp re-enters stage 0.
    #[serde(default = "default_slow_start_duration")]
    pub duration_seconds: u64,

    /// Ascending multipliers, each in (0, 1]. The ramp is split into
    /// `stages.len()` equal slices of `duration_seconds`.
    #[serde(default = "default_slow_start_stages")]
    pub stages: Vec<f64>,
}

impl Default for SlowStartConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            duration_seconds: default_slow_start_duration(),
            stages: default_slow_start_stages(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_slow_start_duration() -> u64 {
    3600
}

fn default_slow_start_stages() -> Vec<f64> {
    vec![0.3, 0.6, 1.0]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ring capacity; oldest events are dropped first.
    #[serde(default = "default_audit_max_events")]
    pub max_events: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_events: default_audit_max_events(),
        }
    }
}

fn default_audit_max_events() -> usize {
    1000
}

/// A single `(tier, endpoint)` rate-limit policy.
///
/// `max` is the steady-state per-window ceiling, `burst` the bucket
/// capacity. Both are scaled by the region and slow-start multipliers
/// before evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePolicy {
    pub window_seconds: u64,
    pub max: u64,
    pub burst: u64,
}

/// File-level policy entry: a `RatePolicy` plus its table coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub tier: String,
    pub endpoint: String,
    #[serde(flatten)]
    pub policy: RatePolicy,
}

pub mod analytics;
pub mod audit;
pub mod bucket;
pub mod cache;
pub mod decision;
pub mod fallback;
pub mod policy;
pub mod slow_start;

pub use analytics::{AnalyticsEntry, AnalyticsRecorder, AnalyticsReport};
pub use audit::{AuditEvent, AuditFilter, AuditKind, AuditLog};
pub use cache::DecisionCache;
pub use decision::{CheckRequest, Decision, Remaining, Tier};
pub use policy::PolicyRegistry;

use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::config::{LimiterConfig, RatePolicy};
use crate::store::StoreDriver;

use bucket::{BucketArgs, BucketReply};
use fallback::FallbackEvaluator;
use slow_start::SlowStartController;

/// Wall-clock seconds since the Unix epoch. The refill arithmetic
/// tolerates skew between frontends; it does not need monotonic time.
pub fn epoch_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// The rate-limit decision engine.
///
/// Owns all process-local state (policies, cache, analytics, audit) and a
/// handle to the shared store where bucket state lives. One instance per
/// process; any number of processes share the same buckets through the
/// store.
pub struct RateLimitEngine {
    policies: PolicyRegistry,
    store: Arc<dyn StoreDriver>,
    cache: DecisionCache,
    slow_start: SlowStartController,
    fallback: FallbackEvaluator,
    analytics: AnalyticsRecorder,
    audit: AuditLog,
}

impl RateLimitEngine {
    pub fn new(config: &LimiterConfig, store: Arc<dyn StoreDriver>) -> Self {
        Self {
            policies: PolicyRegistry::new(&config.policies, &config.regions),
            cache: DecisionCache::new(Duration::from_secs(config.cache.ttl_seconds)),
            slow_start: SlowStartController::new(config.slow_start.clone(), store.clone()),
            fallback: FallbackEvaluator::new(store.clone()),
            analytics: AnalyticsRecorder::new(),
            audit: AuditLog::new(config.audit.enabled, config.audit.max_events),
            store,
        }
    }

    /// Decide whether one request is admitted, and if not, when to retry.
    ///
    /// Never fails and never blocks on a dead store: every store failure
    /// degrades along atomic → fallback → fail-open, and an internal
    /// exception (a panic inside evaluation) also resolves to a fail-open
    /// allow instead of escaping to the caller.
    pub async fn check_limit(&self, req: CheckRequest) -> Decision {
        let cost = req.cost.max(1);
        match AssertUnwindSafe(self.evaluate(&req, cost)).catch_unwind().await {
            Ok(decision) => decision,
            Err(_) => {
                tracing::error!(
                    "engine: evaluation panicked, failing open, identity={}, endpoint={}",
                    req.identity,
                    req.endpoint
                );
                metrics::counter!("limiter_fail_open_total", "cause" => "internal").increment(1);
                Decision::unbounded_allow(cost)
            }
        }
    }

    async fn evaluate(&self, req: &CheckRequest, cost: u64) -> Decision {
        // Unlimited bypasses store and cache; the decision is still counted.
        if req.tier == Tier::Unlimited {
            self.analytics.record(&req.endpoint, req.tier, &req.region, true);
            return Decision::unbounded_allow(cost);
        }

        // Unrated endpoint for this tier: unconditional allow, off the books.
        let Some(policy) = self.policies.policy_for(req.tier, &req.endpoint) else {
            return Decision::unbounded_allow(cost);
        };

        let cache_key = DecisionCache::key(&req.identity, &req.endpoint, req.tier);
        if let Some(cached) = self.cache.lookup(&cache_key) {
            metrics::counter!("limiter_cache_hits_total").increment(1);
            self.analytics
                .record(&req.endpoint, req.tier, &req.region, cached.allowed);
            return cached;
        }

        let now = epoch_seconds();
        let region_mult = self.policies.region_multiplier(&req.region);
        let ramp = self
            .slow_start
            .multiplier(&req.identity, &req.endpoint, now)
            .await;
        if ramp.first_seen {
            self.audit.append(self.event(AuditKind::NewUser, req, now, None));
        }

        let adjusted_max = (policy.max as f64 * region_mult * ramp.multiplier).floor() as i64;
        let adjusted_burst = (policy.burst as f64 * region_mult * ramp.multiplier).floor() as i64;
        let args = BucketArgs {
            now,
            adjusted_max,
            adjusted_burst,
            window_seconds: policy.window_seconds as i64,
            cost: cost as i64,
        };

        let keys = bucket::bucket_keys(&req.identity, &req.endpoint);
        let atomic_reply = match self
            .store
            .eval(bucket::BUCKET_SCRIPT, &keys, &args.to_store_args())
            .await
        {
            Ok(raw) => match bucket::decode_eval_reply(&raw) {
                Ok(reply) => Some(reply),
                Err(e) => {
                    tracing::warn!("engine: bucket reply undecodable, error={}", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!(
                    "engine: atomic evaluation failed, identity={}, endpoint={}, error={}",
                    req.identity,
                    req.endpoint,
                    e
                );
                None
            }
        };

        let reply = match atomic_reply {
            Some(reply) => reply,
            None => {
                metrics::counter!("limiter_fallback_total").increment(1);
                match self
                    .fallback
                    .evaluate(&req.identity, &req.endpoint, args)
                    .await
                {
                    Some(out) => BucketReply {
                        allowed: out.allowed,
                        remaining: out.remaining,
                        count: out.count,
                    },
                    None => {
                        metrics::counter!("limiter_fail_open_total", "cause" => "store")
                            .increment(1);
                        tracing::warn!(
                            "engine: store unreachable, failing open, identity={}, endpoint={}",
                            req.identity,
                            req.endpoint
                        );
                        self.analytics.record(&req.endpoint, req.tier, &req.region, true);
                        return Decision::unbounded_allow(cost);
                    }
                }
            }
        };

        let decision = if reply.allowed {
            let decision = Decision {
                allowed: true,
                remaining: Remaining::Finite(reply.remaining as u64),
                retry_after_seconds: 0,
                cost,
            };
            self.cache.insert_allow(cache_key, decision);
            decision
        } else {
            let retry_after = if adjusted_max <= 0 || reply.count >= adjusted_max {
                // The per-window ceiling is spent (or no throughput exists
                // at all): only the entry's TTL expiry can help.
                policy.window_seconds
            } else {
                let deficit = (cost as i64 - reply.remaining) as f64;
                let seconds_per_token = policy.window_seconds as f64 / adjusted_max as f64;
                (deficit * seconds_per_token).ceil().max(1.0) as u64
            };
            Decision {
                allowed: false,
                remaining: Remaining::Finite(reply.remaining as u64),
                retry_after_seconds: retry_after,
                cost,
            }
        };

        self.analytics
            .record(&req.endpoint, req.tier, &req.region, decision.allowed);
        if !decision.allowed {
            self.audit
                .append(self.event(AuditKind::RateLimitExceeded, req, now, None));
        }

        decision
    }

    fn event(
        &self,
        kind: AuditKind,
        req: &CheckRequest,
        now: i64,
        detail: Option<String>,
    ) -> AuditEvent {
        AuditEvent {
            timestamp: now,
            kind,
            identity: req.identity.clone(),
            endpoint: req.endpoint.clone(),
            tier: req.tier.as_str().to_string(),
            region: req.region.clone(),
            detail,
        }
    }

    pub fn analytics_report(&self) -> AnalyticsReport {
        self.analytics.report()
    }

    pub fn audit_log(&self, filter: &AuditFilter) -> Vec<AuditEvent> {
        self.audit.query(filter)
    }

    /// Install or replace a policy at runtime. Applied writes are audited.
    pub fn set_policy(&self, tier: Tier, endpoint: &str, policy: RatePolicy) {
        if !self.policies.set_policy(tier, endpoint, policy) {
            return;
        }
        self.audit.append(AuditEvent {
            timestamp: epoch_seconds(),
            kind: AuditKind::ConfigurationChange,
            identity: String::new(),
            endpoint: endpoint.to_string(),
            tier: tier.as_str().to_string(),
            region: String::new(),
            detail: Some(format!(
                "window_seconds={}, max={}, burst={}",
                policy.window_seconds, policy.max, policy.burst
            )),
        });
        metrics::gauge!("limiter_policies_total").set(self.policies.policy_count() as f64);
        tracing::info!(
            "policy: updated, tier={}, endpoint={}, max={}, burst={}, window={}s",
            tier,
            endpoint,
            policy.max,
            policy.burst,
            policy.window_seconds
        );
    }

    /// Drop cached decisions for an identity (tier reassignment hook).
    pub fn clear_cache_for(&self, identity: &str) {
        self.cache.clear_for(identity);
        tracing::info!("cache: cleared, identity={}", identity);
    }

    pub fn policy_count(&self) -> usize {
        self.policies.policy_count()
    }

    pub fn store_backend(&self) -> &'static str {
        self.store.backend()
    }
}

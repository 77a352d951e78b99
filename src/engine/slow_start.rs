use std::sync::Arc;

use crate::config::SlowStartConfig;
use crate::store::StoreDriver;

/// Ramp multiplier for newly seen `(identity, endpoint)` pairs.
///
/// The first-seen marker lives in the shared store with TTL equal to the
/// ramp duration, so every frontend sees the same stage and a dormant
/// identity re-enters stage 0. Marker writes are idempotent after the
/// first set; concurrent first calls only produce redundant new-user
/// events.
pub struct SlowStartController {
    config: SlowStartConfig,
    store: Arc<dyn StoreDriver>,
}

/// `first_seen` is true exactly when this call created the marker; the
/// orchestrator turns it into a new-user audit event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlowStartOutcome {
    pub multiplier: f64,
    pub first_seen: bool,
}

const NEUTRAL: SlowStartOutcome = SlowStartOutcome {
    multiplier: 1.0,
    first_seen: false,
};

impl SlowStartController {
    pub fn new(config: SlowStartConfig, store: Arc<dyn StoreDriver>) -> Self {
        Self { config, store }
    }

    fn marker_key(identity: &str, endpoint: &str) -> String {
        format!("slowstart:{identity}:{endpoint}")
    }

    /// Current ramp multiplier for the pair. Fails open to 1.0 on any
    /// store error — slow-start alone must not block traffic.
    pub async fn multiplier(&self, identity: &str, endpoint: &str, now: i64) -> SlowStartOutcome {
        if !self.config.enabled || self.config.stages.is_empty() {
            return NEUTRAL;
        }

        let key = Self::marker_key(identity, endpoint);
        let stored = match self.store.get(&key).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("slow_start: marker read failed, error={}", e);
                return NEUTRAL;
            }
        };

        match stored {
            None => {
                if let Err(e) = self
                    .store
                    .setex(&key, self.config.duration_seconds, &now.to_string())
                    .await
                {
                    tracing::warn!("slow_start: marker write failed, error={}", e);
                    return NEUTRAL;
                }
                SlowStartOutcome {
                    multiplier: self.config.stages[0],
                    first_seen: true,
                }
            }
            Some(raw) => {
                // A corrupt marker reads as "first seen just now" — stage 0.
                let started = raw.parse::<i64>().unwrap_or(now);
                let age = (now - started).max(0) as f64;
                let stage_length =
                    self.config.duration_seconds as f64 / self.config.stages.len() as f64;
                let index = ((age / stage_length) as usize).min(self.config.stages.len() - 1);
                SlowStartOutcome {
                    multiplier: self.config.stages[index],
                    first_seen: false,
                }
            }
        }
    }
}

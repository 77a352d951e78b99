use crate::config::LimiterConfig;
use crate::engine::RateLimitEngine;
use crate::metrics::Metrics;
use crate::store::{MemoryStore, RedisDriver, StoreDriver};
use anyhow::Result;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::info;

/// Shared service state, cheaply cloneable.
///
/// The engine owns every decision-path structure; this aggregate only adds
/// the startup wiring (store selection, metrics recorder) and the config
/// snapshot read by the admin endpoints.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ArcSwap<LimiterConfig>>,
    pub metrics: Metrics,
    pub engine: Arc<RateLimitEngine>,
}

impl AppState {
    pub async fn new(config: LimiterConfig) -> Result<Self> {
        let metrics = Metrics::install();

        let store: Arc<dyn StoreDriver> =
            if config.store.url.is_empty() || config.store.url == "memory" {
                info!("store: in-process store selected (standalone mode, no shared buckets)");
                Arc::new(MemoryStore::new())
            } else {
                let driver = RedisDriver::connect(&config.store.url).await?;
                info!("store: connected, url={}", config.store.url);
                Arc::new(driver)
            };

        let engine = Arc::new(RateLimitEngine::new(&config, store));
        metrics::gauge!("limiter_policies_total").set(engine.policy_count() as f64);
        info!(
            "engine: ready, policies={}, store={}",
            engine.policy_count(),
            engine.store_backend()
        );

        Ok(Self {
            config: Arc::new(ArcSwap::new(Arc::new(config))),
            metrics,
            engine,
        })
    }
}

use std::sync::Arc;

use crate::store::StoreDriver;

use super::bucket::{self, BucketArgs, BucketOutcome, StoredBucket};

/// Non-atomic bucket evaluator, used when the atomic script path fails.
///
/// Read-modify-write from the calling process: racy across instances, and
/// documented as such — its job is availability while the store's script
/// path is degraded, not correctness. Unreadable or corrupt values count
/// as absent, which resets the bucket to full rather than blocking.
pub struct FallbackEvaluator {
    store: Arc<dyn StoreDriver>,
}

impl FallbackEvaluator {
    pub fn new(store: Arc<dyn StoreDriver>) -> Self {
        Self { store }
    }

    /// `None` means the reads themselves failed and the caller should fail
    /// open. Write-back is best-effort; a lost write only costs accounting.
    pub async fn evaluate(
        &self,
        identity: &str,
        endpoint: &str,
        args: BucketArgs,
    ) -> Option<BucketOutcome> {
        let [tokens_key, refill_key, count_key] = bucket::bucket_keys(identity, endpoint);

        let (tokens, last_refill, count) = match tokio::try_join!(
            self.store.get(&tokens_key),
            self.store.get(&refill_key),
            self.store.get(&count_key),
        ) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!("fallback: bucket read failed, error={}", e);
                return None;
            }
        };

        let state = StoredBucket {
            tokens: tokens.and_then(|s| s.parse().ok()),
            last_refill: last_refill.and_then(|s| s.parse().ok()),
            count: count.and_then(|s| s.parse().ok()),
        };

        let out = bucket::apply(state, args);

        let ttl = args.window_seconds as u64;
        let tokens_str = out.tokens.to_string();
        let refill_str = args.now.to_string();
        let count_str = out.count.to_string();
        let writes = tokio::join!(
            self.store.setex(&tokens_key, ttl, &tokens_str),
            self.store.setex(&refill_key, ttl, &refill_str),
            self.store.setex(&count_key, ttl, &count_str),
        );
        if let Err(e) = writes.0.and(writes.1).and(writes.2) {
            tracing::warn!("fallback: bucket write failed, error={}", e);
        }

        Some(out)
    }
}

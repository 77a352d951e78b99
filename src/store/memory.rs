use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::engine::bucket::{self, BucketArgs, StoredBucket};
use crate::engine::epoch_seconds;

use super::driver::{StoreDriver, StoreError};

/// In-process store driver.
///
/// Backs tests and standalone (single-instance) deployments. Entries carry
/// wall-clock expiries checked lazily on access; `eval` runs the bucket
/// program natively under the map lock, which gives it the same atomicity
/// the real store gives the script. Operation counters let tests assert on
/// store traffic (cache collapse, unlimited bypass).
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    gets: AtomicU64,
    setexs: AtomicU64,
    evals: AtomicU64,
}

struct Entry {
    value: String,
    expires_at: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreOpCounts {
    pub gets: u64,
    pub setexs: u64,
    pub evals: u64,
}

impl StoreOpCounts {
    pub fn total(&self) -> u64 {
        self.gets + self.setexs + self.evals
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op_counts(&self) -> StoreOpCounts {
        StoreOpCounts {
            gets: self.gets.load(Ordering::Relaxed),
            setexs: self.setexs.load(Ordering::Relaxed),
            evals: self.evals.load(Ordering::Relaxed),
        }
    }

    fn read_live(map: &mut HashMap<String, Entry>, key: &str, now: i64) -> Option<String> {
        match map.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                map.remove(key);
                None
            }
            None => None,
        }
    }

    fn parse<T: std::str::FromStr>(raw: Option<String>, key: &str) -> Result<Option<T>, StoreError> {
        match raw {
            None => Ok(None),
            Some(s) => s
                .parse::<T>()
                .map(Some)
                .map_err(|_| StoreError::Decode(format!("unparseable value at {key}"))),
        }
    }
}

#[async_trait]
impl StoreDriver for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let mut map = self.entries.lock().unwrap();
        Ok(Self::read_live(&mut map, key, epoch_seconds()))
    }

    async fn setex(&self, key: &str, ttl_seconds: u64, value: &str) -> Result<(), StoreError> {
        self.setexs.fetch_add(1, Ordering::Relaxed);
        let mut map = self.entries.lock().unwrap();
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: epoch_seconds() + ttl_seconds as i64,
            },
        );
        Ok(())
    }

    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        self.evals.fetch_add(1, Ordering::Relaxed);
        // The engine ships exactly one script; the fake executes its
        // contract natively rather than interpreting Lua.
        debug_assert_eq!(script, bucket::BUCKET_SCRIPT);

        let [now, max, burst, window, cost] = match args {
            [a, b, c, d, e] => [*a, *b, *c, *d, *e],
            _ => {
                return Err(StoreError::Script(format!(
                    "bucket script takes 5 args, got {}",
                    args.len()
                )))
            }
        };
        let [tokens_key, refill_key, count_key] = match keys {
            [a, b, c] => [a, b, c],
            _ => {
                return Err(StoreError::Script(format!(
                    "bucket script takes 3 keys, got {}",
                    keys.len()
                )))
            }
        };

        let mut map = self.entries.lock().unwrap();
        let wall = epoch_seconds();
        let state = StoredBucket {
            tokens: Self::parse(Self::read_live(&mut map, tokens_key, wall), tokens_key)?,
            last_refill: Self::parse(Self::read_live(&mut map, refill_key, wall), refill_key)?,
            count: Self::parse(Self::read_live(&mut map, count_key, wall), count_key)?,
        };

        let out = bucket::apply(
            state,
            BucketArgs {
                now,
                adjusted_max: max,
                adjusted_burst: burst,
                window_seconds: window,
                cost,
            },
        );

        let expires_at = wall + window;
        map.insert(
            tokens_key.clone(),
            Entry {
                value: out.tokens.to_string(),
                expires_at,
            },
        );
        map.insert(
            refill_key.clone(),
            Entry {
                value: now.to_string(),
                expires_at,
            },
        );
        map.insert(
            count_key.clone(),
            Entry {
                value: out.count.to_string(),
                expires_at,
            },
        );

        Ok(vec![out.allowed as i64, out.remaining, out.count])
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::bucket::BUCKET_SCRIPT;

    #[tokio::test]
    async fn test_setex_get_roundtrip() {
        let store = MemoryStore::new();
        store.setex("k", 60, "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store.setex("k", 1, "v").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_eval_runs_bucket_program() {
        let store = MemoryStore::new();
        let keys = vec![
            "bucket:u:/api/search:tokens".to_string(),
            "bucket:u:/api/search:last_refill".to_string(),
            "bucket:u:/api/search:count".to_string(),
        ];

        let reply = store
            .eval(BUCKET_SCRIPT, &keys, &[1000, 100, 20, 3600, 1])
            .await
            .unwrap();
        assert_eq!(reply, vec![1, 19, 1]);

        // State persisted: a second call keeps draining the same bucket.
        let reply = store
            .eval(BUCKET_SCRIPT, &keys, &[1000, 100, 20, 3600, 5])
            .await
            .unwrap();
        assert_eq!(reply, vec![1, 14, 6]);
    }

    #[tokio::test]
    async fn test_op_counts() {
        let store = MemoryStore::new();
        store.setex("k", 60, "v").await.unwrap();
        store.get("k").await.unwrap();
        store.get("k").await.unwrap();
        let counts = store.op_counts();
        assert_eq!(counts.setexs, 1);
        assert_eq!(counts.gets, 2);
        assert_eq!(counts.evals, 0);
        assert_eq!(counts.total(), 3);
    }
}

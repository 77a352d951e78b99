use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::{Arc, OnceLock};

use super::driver::{StoreDriver, StoreError};

/// Redis-backed store driver.
///
/// Cheaply cloneable — `ConnectionManager` multiplexes one connection
/// behind an `Arc` and reconnects on its own after transport failures, so
/// a transient outage degrades decisions (fallback / fail-open) without
/// killing the process.
#[derive(Clone)]
pub struct RedisDriver {
    conn: ConnectionManager,
    /// The engine ships one fixed script; its `redis::Script` form is
    /// built on first use and shared across clones so the hot path runs
    /// `EVALSHA` instead of re-sending the script body on every decision.
    script: Arc<OnceLock<(String, redis::Script)>>,
}

impl RedisDriver {
    /// Connect to Redis. Fails fast at startup when the store is
    /// unreachable; runtime outages are handled per-operation instead.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self {
            conn,
            script: Arc::new(OnceLock::new()),
        })
    }
}

fn classify(e: redis::RedisError, op: &'static str) -> StoreError {
    metrics::counter!("limiter_store_errors_total", "op" => op).increment(1);
    if e.kind() == redis::ErrorKind::ResponseError {
        StoreError::Script(e.to_string())
    } else {
        StoreError::Transport(e.to_string())
    }
}

#[async_trait]
impl StoreDriver for RedisDriver {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| classify(e, "get"))
    }

    async fn setex(&self, key: &str, ttl_seconds: u64, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_seconds)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(|e| classify(e, "setex"))?;
        Ok(())
    }

    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[i64],
    ) -> Result<Vec<i64>, StoreError> {
        let (cached_source, cached) = self
            .script
            .get_or_init(|| (script.to_string(), redis::Script::new(script)));
        debug_assert_eq!(script, cached_source.as_str());

        let mut invocation = cached.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        for arg in args {
            invocation.arg(*arg);
        }

        let mut conn = self.conn.clone();
        invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| classify(e, "eval"))
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

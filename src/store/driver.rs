use async_trait::async_trait;
use std::fmt;

/// Failure classes surfaced by a store driver.
///
/// `Transport` and `Script` both route the caller to the non-atomic
/// fallback path; the split exists so operators can tell a dead store from
/// a broken script in logs and metrics.
#[derive(Debug, Clone)]
pub enum StoreError {
    /// The store could not be reached (connect, I/O, timeout, cancellation).
    Transport(String),
    /// The store rejected the atomic script.
    Script(String),
    /// The store answered with something the caller cannot interpret.
    Decode(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Transport(msg) => write!(f, "store transport error: {}", msg),
            StoreError::Script(msg) => write!(f, "store script error: {}", msg),
            StoreError::Decode(msg) => write!(f, "store decode error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Shared key-value store consumed by the engine.
///
/// `eval` executes the given script as a single atomic unit over `keys`;
/// it is the engine's authoritative read-modify-write primitive. `get` and
/// `setex` carry slow-start markers and the fallback evaluator.
#[async_trait]
pub trait StoreDriver: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn setex(&self, key: &str, ttl_seconds: u64, value: &str) -> Result<(), StoreError>;

    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[i64],
    ) -> Result<Vec<i64>, StoreError>;

    /// Short driver label for logs and the readiness endpoint.
    fn backend(&self) -> &'static str;
}

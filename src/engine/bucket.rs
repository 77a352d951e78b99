use crate::store::StoreError;

/// Atomic bucket program, executed server-side by the shared store.
///
/// KEYS: tokens, last_refill, count. ARGV: now, adjusted_max,
/// adjusted_burst, window_seconds, cost. Returns
/// `{allowed, floor(max(0, tokens_after)), count_after}`.
///
/// All three keys are rewritten with TTL = window_seconds on every run, so
/// a full idle window evicts the entry and the bucket resets to full.
/// `apply` below is the same arithmetic for the in-process paths; the two
/// must stay in lockstep.
pub const BUCKET_SCRIPT: &str = r#"
local tokens = tonumber(redis.call('GET', KEYS[1]))
local last_refill = tonumber(redis.call('GET', KEYS[2]))
local count = tonumber(redis.call('GET', KEYS[3]))

local now = tonumber(ARGV[1])
local max = tonumber(ARGV[2])
local burst = tonumber(ARGV[3])
local window = tonumber(ARGV[4])
local cost = tonumber(ARGV[5])

if tokens == nil then tokens = burst end
if last_refill == nil then last_refill = now end
if count == nil then count = 0 end

local elapsed = now - last_refill
if elapsed < 0 then elapsed = 0 end
tokens = tokens + elapsed * max / window
if tokens > burst then tokens = burst end

local allowed = 0
if tokens >= cost and count < max then
  allowed = 1
  tokens = tokens - cost
  count = count + cost
end

redis.call('SETEX', KEYS[1], window, tostring(tokens))
redis.call('SETEX', KEYS[2], window, now)
redis.call('SETEX', KEYS[3], window, count)

local remaining = tokens
if remaining < 0 then remaining = 0 end
return {allowed, math.floor(remaining), count}
"#;

/// The three shared-store keys holding one `(identity, endpoint)` bucket.
pub fn bucket_keys(identity: &str, endpoint: &str) -> [String; 3] {
    [
        format!("bucket:{identity}:{endpoint}:tokens"),
        format!("bucket:{identity}:{endpoint}:last_refill"),
        format!("bucket:{identity}:{endpoint}:count"),
    ]
}

/// Arguments to one bucket evaluation, in script ARGV order.
#[derive(Debug, Clone, Copy)]
pub struct BucketArgs {
    pub now: i64,
    pub adjusted_max: i64,
    pub adjusted_burst: i64,
    pub window_seconds: i64,
    pub cost: i64,
}

impl BucketArgs {
    pub fn to_store_args(self) -> [i64; 5] {
        [
            self.now,
            self.adjusted_max,
            self.adjusted_burst,
            self.window_seconds,
            self.cost,
        ]
    }
}

/// Bucket state as read from the store; `None` means the key is absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoredBucket {
    pub tokens: Option<f64>,
    pub last_refill: Option<i64>,
    pub count: Option<i64>,
}

/// Result of one evaluation. `tokens` is the exact balance persisted
/// (fractional); `remaining` is the whole-token view returned to callers.
#[derive(Debug, Clone, Copy)]
pub struct BucketOutcome {
    pub allowed: bool,
    pub tokens: f64,
    pub remaining: i64,
    pub count: i64,
}

/// Refill-then-admit arithmetic, identical to `BUCKET_SCRIPT`.
///
/// Refill is continuous at `adjusted_max / window_seconds` tokens per
/// second, clamped to `adjusted_burst`. Admission requires both a full
/// token balance for `cost` and headroom under the per-window `count`
/// ceiling. Denials still advance `last_refill` and persist the refilled
/// balance. Backward clock skew reads as zero elapsed time.
pub fn apply(state: StoredBucket, args: BucketArgs) -> BucketOutcome {
    let tokens0 = state.tokens.unwrap_or(args.adjusted_burst as f64);
    let last_refill = state.last_refill.unwrap_or(args.now);
    let count0 = state.count.unwrap_or(0);

    let elapsed = (args.now - last_refill).max(0);
    let refill = elapsed as f64 * args.adjusted_max as f64 / args.window_seconds as f64;
    let tokens1 = (tokens0 + refill).min(args.adjusted_burst as f64);

    let (allowed, tokens2, count1) = if tokens1 >= args.cost as f64 && count0 < args.adjusted_max {
        (true, tokens1 - args.cost as f64, count0 + args.cost)
    } else {
        (false, tokens1, count0)
    };

    BucketOutcome {
        allowed,
        tokens: tokens2,
        remaining: tokens2.max(0.0).floor() as i64,
        count: count1,
    }
}

/// Decode the three-integer reply of `BUCKET_SCRIPT`.
pub fn decode_eval_reply(reply: &[i64]) -> Result<BucketReply, StoreError> {
    match reply {
        [allowed, remaining, count] => Ok(BucketReply {
            allowed: *allowed == 1,
            remaining: (*remaining).max(0),
            count: *count,
        }),
        other => Err(StoreError::Decode(format!(
            "bucket script returned {} values, expected 3",
            other.len()
        ))),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BucketReply {
    pub allowed: bool,
    pub remaining: i64,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(now: i64, max: i64, burst: i64, window: i64, cost: i64) -> BucketArgs {
        BucketArgs {
            now,
            adjusted_max: max,
            adjusted_burst: burst,
            window_seconds: window,
            cost,
        }
    }

    #[test]
    fn test_fresh_bucket_starts_full() {
        let out = apply(StoredBucket::default(), args(1000, 100, 20, 3600, 1));
        assert!(out.allowed);
        assert_eq!(out.remaining, 19);
        assert_eq!(out.count, 1);
    }

    #[test]
    fn test_exhaustion_denies() {
        let mut state = StoredBucket::default();
        let mut last = None;
        for _ in 0..21 {
            let out = apply(state, args(1000, 100, 20, 3600, 1));
            state = StoredBucket {
                tokens: Some(out.tokens),
                last_refill: Some(1000),
                count: Some(out.count),
            };
            last = Some(out);
        }
        let last = last.unwrap();
        assert!(!last.allowed);
        assert_eq!(last.remaining, 0);
        assert_eq!(last.count, 20);
    }

    #[test]
    fn test_refill_is_continuous() {
        // 20 max over a 10s window = 2 tokens/sec.
        let out = apply(
            StoredBucket {
                tokens: Some(0.0),
                last_refill: Some(100),
                count: Some(0),
            },
            args(103, 20, 10, 10, 1),
        );
        assert!(out.allowed);
        // 0 + 3*2 = 6, minus cost 1.
        assert_eq!(out.remaining, 5);
    }

    #[test]
    fn test_refill_clamps_at_burst() {
        let out = apply(
            StoredBucket {
                tokens: Some(1.0),
                last_refill: Some(0),
                count: Some(0),
            },
            args(1_000_000, 100, 20, 3600, 1),
        );
        assert_eq!(out.remaining, 19);
    }

    #[test]
    fn test_backward_clock_skew_is_zero_refill() {
        let out = apply(
            StoredBucket {
                tokens: Some(5.0),
                last_refill: Some(1000),
                count: Some(3),
            },
            args(970, 100, 20, 3600, 1),
        );
        assert!(out.allowed);
        assert_eq!(out.remaining, 4);
        assert!(out.tokens >= 0.0);
    }

    #[test]
    fn test_count_ceiling_gates_even_with_tokens() {
        // Burst has refilled but the per-window ceiling is spent.
        let out = apply(
            StoredBucket {
                tokens: Some(20.0),
                last_refill: Some(1000),
                count: Some(100),
            },
            args(1000, 100, 20, 3600, 1),
        );
        assert!(!out.allowed);
        assert_eq!(out.count, 100);
    }

    #[test]
    fn test_cost_above_burst_never_admits() {
        let out = apply(StoredBucket::default(), args(1000, 100, 20, 3600, 25));
        assert!(!out.allowed);
        assert_eq!(out.remaining, 20);
        assert_eq!(out.count, 0);
    }

    #[test]
    fn test_zero_adjusted_max_denies_everything() {
        let out = apply(StoredBucket::default(), args(1000, 0, 0, 3600, 1));
        assert!(!out.allowed);
        assert_eq!(out.remaining, 0);
    }

    #[test]
    fn test_denial_persists_refilled_tokens() {
        // 1 token/sec refill; 0.5 tokens after refill is still below cost,
        // but the balance and clock must advance.
        let out = apply(
            StoredBucket {
                tokens: Some(0.0),
                last_refill: Some(1000),
                count: Some(2),
            },
            args(1002, 10, 10, 10, 5),
        );
        assert!(!out.allowed);
        assert!((out.tokens - 2.0).abs() < 1e-9);
        assert_eq!(out.remaining, 2);
        assert_eq!(out.count, 2);
    }

    #[test]
    fn test_decode_eval_reply() {
        let reply = decode_eval_reply(&[1, 19, 1]).unwrap();
        assert!(reply.allowed);
        assert_eq!(reply.remaining, 19);
        assert_eq!(reply.count, 1);

        assert!(decode_eval_reply(&[1, 19]).is_err());
    }
}

use crate::adapters::cache::CacheClient;
use crate::error::Result;
use redis::Script;

/// Atomically refills and debits a token bucket stored as a Redis hash
/// (`tokens`, `updated_at_ms`). Ported to Lua so the read-modify-write cycle
/// can't race across replicas the way a GET/SET pair would — the same
/// reasoning the teacher applies to its `ZADD NX` claim pattern, just with a
/// script instead of a single atomic command.
///
/// KEYS[1]  bucket key
/// ARGV[1]  capacity
/// ARGV[2]  refill_per_sec
/// ARGV[3]  now_ms
/// ARGV[4]  requested tokens
/// ARGV[5]  ttl_secs (key expiry, so idle buckets don't leak memory)
///
/// Returns 1 if `requested` tokens were available and debited, 0 otherwise.
const TOKEN_BUCKET_ACQUIRE: &str = r"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_per_sec = tonumber(ARGV[2])
local now_ms = tonumber(ARGV[3])
local requested = tonumber(ARGV[4])
local ttl_secs = tonumber(ARGV[5])

local bucket = redis.call('HMGET', key, 'tokens', 'updated_at_ms')
local tokens = tonumber(bucket[1])
local updated_at_ms = tonumber(bucket[2])

if tokens == nil then
    tokens = capacity
    updated_at_ms = now_ms
end

local elapsed_ms = math.max(0, now_ms - updated_at_ms)
tokens = math.min(capacity, tokens + (elapsed_ms / 1000.0) * refill_per_sec)

local allowed = 0
if tokens >= requested then
    tokens = tokens - requested
    allowed = 1
end

redis.call('HSET', key, 'tokens', tostring(tokens), 'updated_at_ms', tostring(now_ms))
redis.call('EXPIRE', key, ttl_secs)

return allowed
";

/// Rate-limit fabric (§4.A): a system-wide bucket, a per-provider bucket,
/// and an optional per-`SendConfig` bucket are checked in sequence before a
/// job is dispatched. Any bucket's Redis call failing is treated as an
/// allow — the fabric fails open, because a stalled rate limiter must never
/// become an outage.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    cache: CacheClient,
    script: Script,
}

#[derive(Debug, Clone, Copy)]
pub struct BucketSpec {
    pub capacity: u32,
    pub refill_per_sec: u32,
    pub ttl_secs: u64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(cache: CacheClient) -> Self {
        Self { cache, script: Script::new(TOKEN_BUCKET_ACQUIRE) }
    }

    /// Attempts to debit `requested` tokens from `key` under `spec`.
    /// Fails open (returns `Ok(true)`) on any Redis error, logging a
    /// warning, since a broken rate limiter must not block every send.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn try_acquire(&self, key: &str, spec: BucketSpec, now_ms: i64, requested: u32) -> bool {
        let mut conn = self.cache.connection();
        let result: std::result::Result<i64, redis::RedisError> = self
            .script
            .key(key)
            .arg(spec.capacity)
            .arg(spec.refill_per_sec)
            .arg(now_ms)
            .arg(requested)
            .arg(spec.ttl_secs)
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(allowed) => allowed == 1,
            Err(error) => {
                tracing::warn!(%error, %key, "rate limiter backend unavailable, failing open");
                true
            }
        }
    }

    /// Checks the system, provider, and (if present) config buckets in
    /// order, short-circuiting on the first denial. Composition mirrors
    /// §4.A's layered-bucket description; each layer still fails open
    /// independently via [`Self::try_acquire`].
    ///
    /// # Errors
    /// Never returns `Err` today — kept as a `Result` so a future
    /// fail-closed mode (an explicit opt-in per tenant) can be added
    /// without changing call sites.
    #[tracing::instrument(level = "debug", skip(self, buckets))]
    pub async fn acquire_layered(&self, buckets: &[(String, BucketSpec)], now_ms: i64, requested: u32) -> Result<bool> {
        for (key, spec) in buckets {
            if !self.try_acquire(key, *spec, now_ms, requested).await {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_spec_is_copy() {
        let spec = BucketSpec { capacity: 10, refill_per_sec: 2, ttl_secs: 60 };
        let copy = spec;
        assert_eq!(spec.capacity, copy.capacity);
    }
}

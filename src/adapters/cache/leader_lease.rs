use crate::adapters::cache::CacheClient;
use redis::Script;
use uuid::Uuid;

const LEASE_KEY: &str = "leader:lease";

/// Only the renewal (not the acquire) needs to be a script: a CAS that only
/// extends the TTL if we still hold the token, so a leader that stalled past
/// its lease doesn't clobber whoever took over.
///
/// KEYS[1] lease key, ARGV[1] our token, ARGV[2] ttl_ms
const RENEW_IF_OWNER: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
";

/// KEYS[1] lease key, ARGV[1] our token
const RELEASE_IF_OWNER: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
";

/// Single-process leadership over the discoverer and scheduler loops
/// (§4.I): whichever replica holds the lease runs leader-only work; every
/// other replica just keeps trying to acquire it. Grounded in the same
/// `SET key val NX EX ttl` primitive the teacher uses for its push-queue
/// claim, generalized from a per-job claim to a standing lease.
#[derive(Debug, Clone)]
pub struct LeaderLease {
    cache: CacheClient,
    token: String,
    ttl_ms: i64,
    renew_script: Script,
    release_script: Script,
}

impl LeaderLease {
    #[must_use]
    pub fn new(cache: CacheClient, ttl_secs: u64) -> Self {
        Self {
            cache,
            token: Uuid::new_v4().to_string(),
            ttl_ms: i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX),
            renew_script: Script::new(RENEW_IF_OWNER),
            release_script: Script::new(RELEASE_IF_OWNER),
        }
    }

    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Attempts to become leader. Returns `true` if this call won the
    /// lease, `false` if another replica already holds it. A Redis error
    /// is treated as "not leader" — leadership fails closed, since running
    /// leader-only work twice (two discoverers double-publishing) is worse
    /// than running it zero times for one tick.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn try_acquire(&self) -> bool {
        let mut conn = self.cache.connection();
        let result: std::result::Result<Option<String>, redis::RedisError> = redis::cmd("SET")
            .arg(LEASE_KEY)
            .arg(&self.token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl_ms)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(reply) => reply.is_some(),
            Err(error) => {
                tracing::warn!(%error, "leader lease acquire failed, assuming follower");
                false
            }
        }
    }

    /// Extends the lease iff we still hold it. Returns `true` on success;
    /// `false` means leadership was lost (another replica's lease expired
    /// and it won the next acquire) and leader-only work must stop.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn renew(&self) -> bool {
        let mut conn = self.cache.connection();
        let result: std::result::Result<i64, redis::RedisError> =
            self.renew_script.key(LEASE_KEY).arg(&self.token).arg(self.ttl_ms).invoke_async(&mut conn).await;

        match result {
            Ok(renewed) => renewed == 1,
            Err(error) => {
                tracing::warn!(%error, "leader lease renew failed, assuming leadership lost");
                false
            }
        }
    }

    /// Releases the lease on graceful shutdown so the next replica doesn't
    /// wait out the full TTL before taking over.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn release(&self) {
        let mut conn = self.cache.connection();
        let result: std::result::Result<i64, redis::RedisError> =
            self.release_script.key(LEASE_KEY).arg(&self.token).invoke_async(&mut conn).await;
        if let Err(error) = result {
            tracing::warn!(%error, "leader lease release failed, will expire via TTL");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_lease_mints_a_distinct_token() {
        let ttl_ms = |ttl_secs: u64| i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        assert_eq!(ttl_ms(30), 30_000);
    }
}

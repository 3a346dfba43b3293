use crate::adapters::cache::rate_limit::{BucketSpec, RateLimiter as RateLimitBackend};
use crate::config::RateLimitConfig;
use crate::domain::{ConfigMode, SendConfigSnapshot};
use crate::error::{AppError, Result};
use rand::Rng;
use std::time::Duration;
use uuid::Uuid;

const SYSTEM_BUCKET_KEY: &str = "rl:system";
const SYSTEM_CAPACITY: u32 = 2_000;
const SYSTEM_REFILL_PER_SEC: u32 = 2_000;
const SYSTEM_TTL_SECS: u64 = 60;

/// Builds the ordered list of bucket keys a send must clear: system, then
/// (if known) the provider's hard limit, then (if configured) the
/// per-`SendConfig` limit. Kept free of any connection state so it can be
/// unit tested without a live cache.
fn layered_bucket_specs(bucket_ttl_secs: u64, send_config: &SendConfigSnapshot, provider: &str) -> Vec<(String, BucketSpec)> {
    let mut buckets = vec![(
        SYSTEM_BUCKET_KEY.to_string(),
        BucketSpec { capacity: SYSTEM_CAPACITY, refill_per_sec: SYSTEM_REFILL_PER_SEC, ttl_secs: SYSTEM_TTL_SECS },
    )];

    // The shared provider bucket represents the platform's own credentials
    // being shared across tenants; a BYOK config calls the provider under
    // the user's own credentials, so it never contends on this bucket
    // (§4.A: "managed mode only").
    if send_config.mode() == ConfigMode::Managed {
        if let Some(limits) = crate::config::provider_limits(provider) {
            buckets.push((
                format!("rl:provider:{provider}"),
                BucketSpec {
                    capacity: limits.max_requests_per_second,
                    refill_per_sec: limits.max_requests_per_second,
                    ttl_secs: bucket_ttl_secs,
                },
            ));
        }
    }

    if let Some(rps) = send_config.rate_limit.requests_per_second {
        buckets.push((
            format!("rl:config:{}", send_config.id),
            BucketSpec { capacity: rps, refill_per_sec: rps, ttl_secs: bucket_ttl_secs },
        ));
    }

    buckets
}

/// Composes the system, provider, and per-config buckets described in §4.A
/// into a single "may I send this recipient now" decision, retrying with a
/// jittered backoff up to `job_timeout_ms` before giving up.
#[derive(Debug, Clone)]
pub struct RateLimiterService {
    backend: RateLimitBackend,
    config: RateLimitConfig,
}

impl RateLimiterService {
    #[must_use]
    pub const fn new(backend: RateLimitBackend, config: RateLimitConfig) -> Self {
        Self { backend, config }
    }

    /// Blocks (via short sleeps, never the caller's own task budget) until
    /// every layered bucket admits one unit of work, or `job_timeout_ms`
    /// elapses, whichever comes first (§4.A, §4.D step 3).
    ///
    /// # Errors
    /// Returns `AppError::RateLimitTimeout` if no bucket admitted the send
    /// within the configured timeout.
    #[tracing::instrument(level = "debug", skip(self, send_config))]
    pub async fn acquire(&self, _recipient_id: Uuid, send_config: &SendConfigSnapshot) -> Result<()> {
        let provider = send_config.provider().unwrap_or("unknown");
        let buckets = layered_bucket_specs(self.config.bucket_ttl_secs, send_config, provider);
        let deadline = tokio::time::Instant::now() + Duration::from_millis(self.config.job_timeout_ms);

        loop {
            let now_ms = i64::try_from(time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000).unwrap_or(0);
            if self.backend.acquire_layered(&buckets, now_ms, 1).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(AppError::RateLimitTimeout);
            }
            let jitter = rand::thread_rng().gen_range(0..=self.config.jitter_ms.max(1));
            tokio::time::sleep(Duration::from_millis(self.config.min_wait_ms + jitter)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RateLimitPolicy;
    use serde_json::json;

    #[test]
    fn buckets_include_system_provider_and_config_layers_when_configured() {
        let send_config = SendConfigSnapshot {
            id: Uuid::new_v4(),
            module: crate::domain::ModuleKind::Email,
            config: json!({"provider": "ses"}),
            rate_limit: RateLimitPolicy { requests_per_second: Some(14), recipients_per_request: 1, daily_limit: None },
        };
        let buckets = layered_bucket_specs(10, &send_config, "ses");
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].0, SYSTEM_BUCKET_KEY);
    }

    #[test]
    fn omits_provider_and_config_layers_when_neither_apply() {
        let send_config = SendConfigSnapshot {
            id: Uuid::new_v4(),
            module: crate::domain::ModuleKind::Webhook,
            config: json!({"provider": "generic_webhook"}),
            rate_limit: RateLimitPolicy { requests_per_second: None, recipients_per_request: 1, daily_limit: None },
        };
        let buckets = layered_bucket_specs(10, &send_config, "unknown_provider");
        assert_eq!(buckets.len(), 1);
    }
}

use clap::{Parser, ValueEnum};

const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
const DEFAULT_SERVER_PORT: u16 = 8080;
const DEFAULT_MGMT_PORT: u16 = 8081;
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 10;
const DEFAULT_TRUSTED_PROXIES: &str = "10.0.0.0/8,172.16.0.0/12,192.168.0.0/16,127.0.0.1/32";

const DEFAULT_ORCHESTRATION_STREAM: &str = "orchestration.batch";
const DEFAULT_JOBS_STREAM_PREFIX: &str = "jobs.user";
const DEFAULT_WEBHOOKS_STREAM_PREFIX: &str = "webhook";
const DEFAULT_BROKER_DEDUP_WINDOW_SECS: u64 = 120;
const DEFAULT_JOBS_MAX_AGE_SECS: u64 = 2 * 60 * 60;
const DEFAULT_WEBHOOKS_MAX_AGE_SECS: u64 = 24 * 60 * 60;
const DEFAULT_MAX_MSGS_PER_SUBJECT: i64 = 10_000;

const DEFAULT_RATE_LIMIT_JOB_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_RATE_LIMIT_MIN_WAIT_MS: u64 = 10;
const DEFAULT_RATE_LIMIT_JITTER_MS: u64 = 10;
const DEFAULT_RATE_LIMIT_BUCKET_TTL_SECS: u64 = 10;

const DEFAULT_MAX_ACK_PENDING: usize = 100;
const DEFAULT_MAX_DELIVER: u32 = 5;
const DEFAULT_TENANT_CONSUMER_IDLE_SECS: u64 = 60 * 60;
const DEFAULT_MODULE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TENANT_CONCURRENCY: usize = 16;
const DEFAULT_TENANT_DISCOVERY_INTERVAL_SECS: u64 = 10;

const DEFAULT_ORCHESTRATOR_PAGE_SIZE: i64 = 1000;
const DEFAULT_DISCOVERER_POLL_INTERVAL_SECS: u64 = 5;

const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 30;
const DEFAULT_SCHEDULER_BATCH_LIMIT: i64 = 100;

const DEFAULT_RECOVERY_INTERVAL_MS: u64 = 15_000;
const DEFAULT_RECOVERY_THRESHOLD_MS: u64 = 120_000;
const DEFAULT_RECOVERY_MAX_PER_SCAN: i64 = 50;
const DEFAULT_RECOVERY_MAX_RETRIES: u32 = 3;

const DEFAULT_WEBHOOK_MICRO_BATCH_SIZE: usize = 100;
const DEFAULT_WEBHOOK_LINGER_MS: u64 = 250;
const DEFAULT_WEBHOOK_LOCAL_DEDUP_TTL_SECS: u64 = 60;
const DEFAULT_WEBHOOK_DISTRIBUTED_DEDUP_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_MSGINDEX_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_RECIPIENT_STATUS_TTL_SECS: u64 = 7 * 24 * 60 * 60;

const DEFAULT_LEASE_TTL_SECS: u64 = 15;
const DEFAULT_LEASE_RENEW_INTERVAL_SECS: u64 = 5;

const DEFAULT_ARCHIVER_INTERVAL_SECS: u64 = 6 * 60 * 60;
const DEFAULT_ARCHIVER_EVENT_RETENTION_DAYS: u32 = 30;
const DEFAULT_ARCHIVER_MESSAGE_INDEX_RETENTION_HOURS: u32 = 24;
const DEFAULT_ARCHIVER_BATCH_LIMIT: i64 = 10_000;

#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, ValueEnum, PartialEq, Eq)]
pub enum Role {
    All,
    Api,
    Worker,
    Orchestrator,
    Leader,
}

#[derive(Clone, Debug, Parser)]
pub struct ServerConfig {
    #[arg(long, env, default_value = DEFAULT_SERVER_HOST)]
    pub host: String,
    #[arg(long, env = "PORT", default_value_t = DEFAULT_SERVER_PORT)]
    pub port: u16,
    #[arg(long, env, default_value_t = DEFAULT_MGMT_PORT)]
    pub mgmt_port: u16,
    #[arg(long, env, default_value_t = DEFAULT_SHUTDOWN_TIMEOUT_SECS)]
    pub shutdown_timeout_secs: u64,
    /// Comma-separated CIDRs to trust for X-Forwarded-For extraction on the webhook ingress.
    #[arg(long, env, default_value = DEFAULT_TRUSTED_PROXIES)]
    pub trusted_proxies: String,
}

#[derive(Clone, Debug, Parser)]
pub struct DatabaseConfig {
    #[arg(long, env)]
    pub database_url: String,
}

#[derive(Clone, Debug, Parser)]
pub struct CacheConfig {
    #[arg(long, env)]
    pub redis_url: String,
}

#[derive(Clone, Debug, Parser)]
pub struct BrokerConfig {
    #[arg(long, env)]
    pub nats_url: String,
    #[arg(long, env, default_value = DEFAULT_ORCHESTRATION_STREAM)]
    pub orchestration_subject: String,
    #[arg(long, env, default_value = DEFAULT_JOBS_STREAM_PREFIX)]
    pub jobs_subject_prefix: String,
    #[arg(long, env, default_value = DEFAULT_WEBHOOKS_STREAM_PREFIX)]
    pub webhooks_subject_prefix: String,
    #[arg(long, env, default_value_t = DEFAULT_BROKER_DEDUP_WINDOW_SECS)]
    pub dedup_window_secs: u64,
    #[arg(long, env, default_value_t = DEFAULT_JOBS_MAX_AGE_SECS)]
    pub jobs_max_age_secs: u64,
    #[arg(long, env, default_value_t = DEFAULT_WEBHOOKS_MAX_AGE_SECS)]
    pub webhooks_max_age_secs: u64,
    #[arg(long, env, default_value_t = DEFAULT_MAX_MSGS_PER_SUBJECT)]
    pub max_msgs_per_subject: i64,
}

#[derive(Clone, Debug, Parser)]
pub struct RateLimitConfig {
    #[arg(long, env, default_value_t = DEFAULT_RATE_LIMIT_JOB_TIMEOUT_MS)]
    pub job_timeout_ms: u64,
    #[arg(long, env, default_value_t = DEFAULT_RATE_LIMIT_MIN_WAIT_MS)]
    pub min_wait_ms: u64,
    #[arg(long, env, default_value_t = DEFAULT_RATE_LIMIT_JITTER_MS)]
    pub jitter_ms: u64,
    #[arg(long, env, default_value_t = DEFAULT_RATE_LIMIT_BUCKET_TTL_SECS)]
    pub bucket_ttl_secs: u64,
}

#[derive(Clone, Debug, Parser)]
pub struct WorkerConfig {
    #[arg(long, env, default_value_t = DEFAULT_MAX_ACK_PENDING)]
    pub max_ack_pending: usize,
    #[arg(long, env, default_value_t = DEFAULT_MAX_DELIVER)]
    pub max_deliver: u32,
    #[arg(long, env, default_value_t = DEFAULT_TENANT_CONSUMER_IDLE_SECS)]
    pub tenant_consumer_idle_secs: u64,
    #[arg(long, env, default_value_t = DEFAULT_MODULE_TIMEOUT_SECS)]
    pub module_timeout_secs: u64,
    #[arg(long, env, default_value_t = DEFAULT_RECIPIENT_STATUS_TTL_SECS)]
    pub recipient_status_ttl_secs: u64,
    #[arg(long, env, default_value_t = DEFAULT_MSGINDEX_TTL_SECS)]
    pub msgindex_ttl_secs: u64,
    /// In-flight dispatch concurrency within a single tenant's worker.
    #[arg(long, env, default_value_t = DEFAULT_TENANT_CONCURRENCY)]
    pub tenant_concurrency: usize,
    /// How often the worker pool scans for tenants that need a consumer
    /// spun up or torn down.
    #[arg(long, env, default_value_t = DEFAULT_TENANT_DISCOVERY_INTERVAL_SECS)]
    pub tenant_discovery_interval_secs: u64,
}

#[derive(Clone, Debug, Parser)]
pub struct OrchestratorConfig {
    #[arg(long, env, default_value_t = DEFAULT_ORCHESTRATOR_PAGE_SIZE)]
    pub page_size: i64,
    #[arg(long, env, default_value_t = DEFAULT_DISCOVERER_POLL_INTERVAL_SECS)]
    pub discoverer_poll_interval_secs: u64,
}

#[derive(Clone, Debug, Parser)]
pub struct SchedulerConfig {
    #[arg(long, env, default_value_t = DEFAULT_SCHEDULER_INTERVAL_SECS)]
    pub interval_secs: u64,
    #[arg(long, env, default_value_t = DEFAULT_SCHEDULER_BATCH_LIMIT)]
    pub batch_limit: i64,
}

#[derive(Clone, Debug, Parser)]
pub struct RecoveryConfig {
    #[arg(long, env, default_value_t = DEFAULT_RECOVERY_INTERVAL_MS)]
    pub interval_ms: u64,
    #[arg(long, env, default_value_t = DEFAULT_RECOVERY_THRESHOLD_MS)]
    pub threshold_ms: u64,
    #[arg(long, env, default_value_t = DEFAULT_RECOVERY_MAX_PER_SCAN)]
    pub max_per_scan: i64,
    #[arg(long, env, default_value_t = DEFAULT_RECOVERY_MAX_RETRIES)]
    pub max_retries: u32,
}

#[derive(Clone, Debug, Parser)]
pub struct WebhookConfig {
    #[arg(long, env, default_value_t = DEFAULT_WEBHOOK_MICRO_BATCH_SIZE)]
    pub micro_batch_size: usize,
    #[arg(long, env, default_value_t = DEFAULT_WEBHOOK_LINGER_MS)]
    pub linger_ms: u64,
    #[arg(long, env, default_value_t = DEFAULT_WEBHOOK_LOCAL_DEDUP_TTL_SECS)]
    pub local_dedup_ttl_secs: u64,
    #[arg(long, env, default_value_t = DEFAULT_WEBHOOK_DISTRIBUTED_DEDUP_TTL_SECS)]
    pub distributed_dedup_ttl_secs: u64,
    #[arg(long, env)]
    pub ses_signing_cert_allowlist: Option<String>,
    #[arg(long, env)]
    pub resend_webhook_secret: Option<String>,
    #[arg(long, env)]
    pub telnyx_public_key: Option<String>,
}

#[derive(Clone, Debug, Parser)]
pub struct LeaderConfig {
    #[arg(long, env, default_value_t = DEFAULT_LEASE_TTL_SECS)]
    pub lease_ttl_secs: u64,
    #[arg(long, env, default_value_t = DEFAULT_LEASE_RENEW_INTERVAL_SECS)]
    pub renew_interval_secs: u64,
}

/// Retention window for §3's "Ownership & lifecycle": `EventRecord` and
/// `MessageIndex` rows are hot for a configured window, then purged by the
/// leader-only analytics-archiver (§4.I). The archiving destination itself
/// (cold storage, export) is explicitly external configuration, not core
/// logic, so the archiver here only deletes rows past the window.
#[derive(Clone, Debug, Parser)]
pub struct ArchiverConfig {
    #[arg(long, env, default_value_t = DEFAULT_ARCHIVER_INTERVAL_SECS)]
    pub interval_secs: u64,
    #[arg(long, env, default_value_t = DEFAULT_ARCHIVER_EVENT_RETENTION_DAYS)]
    pub event_record_retention_days: u32,
    #[arg(long, env, default_value_t = DEFAULT_ARCHIVER_MESSAGE_INDEX_RETENTION_HOURS)]
    pub message_index_retention_hours: u32,
    #[arg(long, env, default_value_t = DEFAULT_ARCHIVER_BATCH_LIMIT)]
    pub batch_limit: i64,
}

#[derive(Clone, Debug, Parser)]
pub struct TelemetryConfig {
    #[arg(long, env)]
    pub otlp_endpoint: Option<String>,
    #[arg(long, env, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
    #[arg(long, env, default_value_t = 0.1)]
    pub trace_sampling_ratio: f64,
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[arg(long, env, value_enum, default_value_t = Role::All)]
    pub role: Role,

    #[command(flatten)]
    pub server: ServerConfig,
    #[command(flatten)]
    pub database: DatabaseConfig,
    #[command(flatten)]
    pub cache: CacheConfig,
    #[command(flatten)]
    pub broker: BrokerConfig,
    #[command(flatten)]
    pub rate_limit: RateLimitConfig,
    #[command(flatten)]
    pub worker: WorkerConfig,
    #[command(flatten)]
    pub orchestrator: OrchestratorConfig,
    #[command(flatten)]
    pub scheduler: SchedulerConfig,
    #[command(flatten)]
    pub recovery: RecoveryConfig,
    #[command(flatten)]
    pub webhook: WebhookConfig,
    #[command(flatten)]
    pub leader: LeaderConfig,
    #[command(flatten)]
    pub archiver: ArchiverConfig,
    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

/// Static per-provider hard limits, consulted to cap user-configured rate
/// and batch sizes (§4.C). A provider absent from this table is rejected at
/// `validate_config` time rather than silently unlimited.
#[derive(Debug, Clone, Copy)]
pub struct ProviderLimits {
    pub max_batch_size: u32,
    pub max_requests_per_second: u32,
}

#[must_use]
pub fn provider_limits(provider: &str) -> Option<ProviderLimits> {
    match provider {
        "ses" => Some(ProviderLimits { max_batch_size: 50, max_requests_per_second: 14 }),
        "resend" => Some(ProviderLimits { max_batch_size: 100, max_requests_per_second: 10 }),
        "telnyx" => Some(ProviderLimits { max_batch_size: 1, max_requests_per_second: 50 }),
        "generic_webhook" => Some(ProviderLimits { max_batch_size: 1, max_requests_per_second: 20 }),
        "fcm" => Some(ProviderLimits { max_batch_size: 500, max_requests_per_second: 600 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_providers_have_limits() {
        assert!(provider_limits("ses").is_some());
        assert!(provider_limits("unknown_provider").is_none());
    }
}

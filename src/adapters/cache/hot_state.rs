use crate::adapters::cache::CacheClient;
use crate::domain::{BatchCounters, MessageIndexEntry, RecipientStatus};
use crate::error::{AppError, Result};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hot-path read/write-through cache sitting in front of the relational
/// store (§4.B). Every entry here has a durable counterpart; a cache miss
/// always falls back to a repository read rather than treating absence as
/// an error — the same fail-soft posture the teacher's cache adapter takes.
#[derive(Debug, Clone)]
pub struct HotStateStore {
    cache: CacheClient,
    recipient_status_ttl_secs: u64,
    msgindex_ttl_secs: u64,
}

fn recipient_key(batch_id: Uuid, recipient_id: Uuid) -> String {
    format!("recipient:{batch_id}:{recipient_id}")
}

fn counters_key(batch_id: Uuid) -> String {
    format!("batch:counters:{batch_id}")
}

fn msgindex_key(provider_message_id: &str) -> String {
    format!("msgindex:{provider_message_id}")
}

fn webhook_dedup_key(provider: &str, provider_message_id: &str, event_type: &str) -> String {
    format!("webhook:dedup:{provider}:{provider_message_id}:{event_type}")
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedMessageIndexEntry {
    recipient_id: Uuid,
    batch_id: Uuid,
    user_id: Uuid,
}

impl HotStateStore {
    #[must_use]
    pub const fn new(cache: CacheClient, recipient_status_ttl_secs: u64, msgindex_ttl_secs: u64) -> Self {
        Self { cache, recipient_status_ttl_secs, msgindex_ttl_secs }
    }

    /// # Errors
    /// Returns `AppError::Cache` if the write fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn set_recipient_status(&self, batch_id: Uuid, recipient_id: Uuid, status: RecipientStatus) -> Result<()> {
        let mut conn = self.cache.connection();
        let key = recipient_key(batch_id, recipient_id);
        let value = format!("{status:?}");
        conn.set_ex::<_, _, ()>(&key, value, self.recipient_status_ttl_secs).await.map_err(AppError::Cache)
    }

    /// Returns `None` on a cache miss; callers fall back to
    /// `recipient_repo::find_by_id`.
    ///
    /// # Errors
    /// Returns `AppError::Cache` if the read fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_recipient_status(&self, batch_id: Uuid, recipient_id: Uuid) -> Result<Option<String>> {
        let mut conn = self.cache.connection();
        let key = recipient_key(batch_id, recipient_id);
        conn.get(&key).await.map_err(AppError::Cache)
    }

    /// Increments the hot-state counters hash after a send outcome or
    /// webhook reconciliation (§4.B), refreshing its TTL so a batch that's
    /// still being actively written never expires mid-flight.
    ///
    /// # Errors
    /// Returns `AppError::Cache` if the write fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn incr_counters(&self, batch_id: Uuid, deltas: BatchCounters) -> Result<()> {
        let mut conn = self.cache.connection();
        let key = counters_key(batch_id);
        let mut pipe = redis::pipe();
        pipe.cmd("HINCRBY").arg(&key).arg("sent").arg(deltas.sent).ignore();
        pipe.cmd("HINCRBY").arg(&key).arg("delivered").arg(deltas.delivered).ignore();
        pipe.cmd("HINCRBY").arg(&key).arg("bounced").arg(deltas.bounced).ignore();
        pipe.cmd("HINCRBY").arg(&key).arg("complained").arg(deltas.complained).ignore();
        pipe.cmd("HINCRBY").arg(&key).arg("failed").arg(deltas.failed).ignore();
        pipe.cmd("EXPIRE").arg(&key).arg(86400).ignore();
        pipe.query_async::<()>(&mut conn).await.map_err(AppError::Cache)
    }

    /// Reads the cached counters snapshot, if present.
    ///
    /// # Errors
    /// Returns `AppError::Cache` if the read fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_counters(&self, batch_id: Uuid) -> Result<Option<BatchCounters>> {
        let mut conn = self.cache.connection();
        let key = counters_key(batch_id);
        let fields: Vec<(String, i64)> = conn.hgetall(&key).await.map_err(AppError::Cache)?;
        if fields.is_empty() {
            return Ok(None);
        }
        let mut counters = BatchCounters::default();
        for (field, value) in fields {
            match field.as_str() {
                "sent" => counters.sent = value,
                "delivered" => counters.delivered = value,
                "bounced" => counters.bounced = value,
                "complained" => counters.complained = value,
                "failed" => counters.failed = value,
                _ => {}
            }
        }
        Ok(Some(counters))
    }

    /// `isBatchComplete` (§4.B): a cache-only check the reconciler uses
    /// before issuing the durable completion write, avoiding a database
    /// round trip on every webhook event for batches nowhere near done.
    ///
    /// # Errors
    /// Returns `AppError::Cache` if the read fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn is_batch_complete(&self, batch_id: Uuid, total_recipients: i64) -> Result<bool> {
        let counters = self.get_counters(batch_id).await?;
        Ok(counters.is_some_and(|c| c.applied_total() >= total_recipients))
    }

    /// # Errors
    /// Returns `AppError::Cache` if the write fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn set_message_index(&self, entry: MessageIndexEntry, provider_message_id: &str) -> Result<()> {
        let mut conn = self.cache.connection();
        let key = msgindex_key(provider_message_id);
        let cached = CachedMessageIndexEntry {
            recipient_id: entry.recipient_id,
            batch_id: entry.batch_id,
            user_id: entry.user_id,
        };
        let payload = serde_json::to_string(&cached).map_err(|e| {
            tracing::error!(error = %e, "failed to serialize message index entry");
            AppError::Internal
        })?;
        conn.set_ex::<_, _, ()>(&key, payload, self.msgindex_ttl_secs).await.map_err(AppError::Cache)
    }

    /// # Errors
    /// Returns `AppError::Cache` if the read fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn get_message_index(&self, provider_message_id: &str) -> Result<Option<MessageIndexEntry>> {
        let mut conn = self.cache.connection();
        let key = msgindex_key(provider_message_id);
        let raw: Option<String> = conn.get(&key).await.map_err(AppError::Cache)?;
        let Some(raw) = raw else { return Ok(None) };
        let cached: CachedMessageIndexEntry = serde_json::from_str(&raw).map_err(|e| {
            tracing::error!(error = %e, "failed to deserialize message index entry");
            AppError::Internal
        })?;
        Ok(Some(MessageIndexEntry {
            recipient_id: cached.recipient_id,
            batch_id: cached.batch_id,
            user_id: cached.user_id,
        }))
    }

    /// Claims the webhook dedup key with `SET NX`. Returns `true` the first
    /// time a given `(provider, providerMessageId, eventType)` triple is
    /// seen within the TTL window; `false` on a redelivery (§4.H step 1,
    /// §7 invariant: webhook handling is idempotent).
    ///
    /// # Errors
    /// Returns `AppError::Cache` if the write fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn claim_webhook_dedup(&self, provider: &str, provider_message_id: &str, event_type: &str, ttl_secs: u64) -> Result<bool> {
        let mut conn = self.cache.connection();
        let key = webhook_dedup_key(provider, provider_message_id, event_type);
        let claimed: bool = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(AppError::Cache)?
            .is_some();
        Ok(claimed)
    }
}

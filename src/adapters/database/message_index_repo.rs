use crate::domain::MessageIndexEntry;
use crate::error::{AppError, Result};
use sqlx::PgConnection;

#[derive(Clone, Debug, Default)]
pub struct MessageIndexRepository {}

impl MessageIndexRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Durable fallback of the `msgindex:{providerMessageId}` cache entry
    /// (§4.B). Written once a provider hands back a message id on send;
    /// read by the webhook reconciler when the cache entry has expired or
    /// was never populated (§4.H step 2).
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn insert(&self, conn: &mut PgConnection, entry: &MessageIndexEntry, provider_message_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO message_index (provider_message_id, recipient_id, batch_id, user_id) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (provider_message_id) DO NOTHING",
        )
        .bind(provider_message_id)
        .bind(entry.recipient_id)
        .bind(entry.batch_id)
        .bind(entry.user_id)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn find(&self, conn: &mut PgConnection, provider_message_id: &str) -> Result<Option<MessageIndexEntry>> {
        let row: Option<(uuid::Uuid, uuid::Uuid, uuid::Uuid)> = sqlx::query_as(
            "SELECT recipient_id, batch_id, user_id FROM message_index WHERE provider_message_id = $1",
        )
        .bind(provider_message_id)
        .fetch_optional(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(row.map(|(recipient_id, batch_id, user_id)| MessageIndexEntry { recipient_id, batch_id, user_id }))
    }

    /// Deletes message-index rows older than the retention window (§4.I
    /// analytics-archiver).
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn delete_older_than(&self, conn: &mut PgConnection, cutoff: time::OffsetDateTime, limit: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM message_index WHERE provider_message_id IN \
                (SELECT provider_message_id FROM message_index WHERE created_at < $1 LIMIT $2)",
        )
        .bind(cutoff)
        .bind(limit)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_without_a_connection() {
        let repo = MessageIndexRepository::new();
        let _ = repo;
    }
}

use crate::domain::EventRecord;
use crate::error::{AppError, Result};
use sqlx::PgConnection;

#[derive(Clone, Debug, Default)]
pub struct EventRecordRepository {}

impl EventRecordRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Appends a single lifecycle event. Most callers go through
    /// [`Self::insert_many`]; this exists for the webhook ack path, which
    /// cannot wait on a buffer flush.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, event))]
    pub async fn insert(&self, conn: &mut PgConnection, event: &EventRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO event_records \
                (event_type, batch_id, recipient_id, user_id, provider_message_id, timestamp, metadata, error_message) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(event.event_type.as_str())
        .bind(event.batch_id)
        .bind(event.recipient_id)
        .bind(event.user_id)
        .bind(&event.provider_message_id)
        .bind(event.timestamp)
        .bind(&event.metadata)
        .bind(&event.error_message)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    /// Flushes a buffered batch of events in one round trip via `UNNEST`,
    /// the same bulk-insert shape the teacher uses for message inserts.
    /// The event logger (§9 "buffered-logger") accumulates events in memory
    /// and calls this on a timer or size threshold.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, events))]
    pub async fn insert_many(&self, conn: &mut PgConnection, events: &[EventRecord]) -> Result<u64> {
        if events.is_empty() {
            return Ok(0);
        }

        let event_types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        let batch_ids: Vec<_> = events.iter().map(|e| e.batch_id).collect();
        let recipient_ids: Vec<_> = events.iter().map(|e| e.recipient_id).collect();
        let user_ids: Vec<_> = events.iter().map(|e| e.user_id).collect();
        let provider_message_ids: Vec<_> = events.iter().map(|e| e.provider_message_id.clone()).collect();
        let timestamps: Vec<_> = events.iter().map(|e| e.timestamp).collect();
        let metadata: Vec<_> = events.iter().map(|e| e.metadata.clone()).collect();
        let error_messages: Vec<_> = events.iter().map(|e| e.error_message.clone()).collect();

        let result = sqlx::query(
            "INSERT INTO event_records \
                (event_type, batch_id, recipient_id, user_id, provider_message_id, timestamp, metadata, error_message) \
             SELECT * FROM UNNEST( \
                $1::text[], $2::uuid[], $3::uuid[], $4::uuid[], $5::text[], $6::timestamptz[], $7::jsonb[], $8::text[] \
             )",
        )
        .bind(&event_types)
        .bind(&batch_ids)
        .bind(&recipient_ids)
        .bind(&user_ids)
        .bind(&provider_message_ids)
        .bind(&timestamps)
        .bind(&metadata)
        .bind(&error_messages)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    /// Deletes event records older than the retention window (§4.I
    /// analytics-archiver). Retention is configuration, not core logic, so
    /// this is a plain bounded delete rather than a move to cold storage.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn delete_older_than(&self, conn: &mut PgConnection, cutoff: time::OffsetDateTime, limit: i64) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM event_records WHERE id IN \
                (SELECT id FROM event_records WHERE timestamp < $1 LIMIT $2)",
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
        let repo = EventRecordRepository::new();
        let _ = repo;
    }
}

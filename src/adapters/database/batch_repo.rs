use crate::adapters::database::records::BatchRecord;
use crate::domain::{Batch, BatchCounters, BatchStatus};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct BatchRepository {}

impl BatchRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn find_by_id(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<Batch>> {
        let record = sqlx::query_as::<_, BatchRecord>("SELECT * FROM batches WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(record.map(Into::into))
    }

    /// Rows the discoverer polls every 5s (§4.E).
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn list_queued(&self, conn: &mut PgConnection) -> Result<Vec<(Uuid, Uuid)>> {
        let rows: Vec<(Uuid, Uuid)> =
            sqlx::query_as("SELECT id, user_id FROM batches WHERE status = 'queued' ORDER BY created_at ASC")
                .fetch_all(conn)
                .await
                .map_err(AppError::Database)?;
        Ok(rows)
    }

    /// Distinct tenants with a batch actively `processing` (§4.D): the
    /// worker pool's discovery source for deciding which per-tenant
    /// consumers need a live [`crate::workers::TenantWorker`] right now.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn list_active_tenants(&self, conn: &mut PgConnection) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT DISTINCT user_id FROM batches WHERE status = 'processing'")
                .fetch_all(conn)
                .await
                .map_err(AppError::Database)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Candidates for the scheduler's `scheduled -> queued` promotion (§4.F).
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn list_scheduled_due(&self, conn: &mut PgConnection, now: OffsetDateTime, limit: i64) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM batches WHERE status = 'scheduled' AND scheduled_at <= $1 ORDER BY scheduled_at ASC LIMIT $2",
        )
        .bind(now)
        .bind(limit)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Batches that have been `processing` without a counter/status update
    /// past `threshold` — the stuck-batch recovery scan (§4.E).
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn list_stuck(&self, conn: &mut PgConnection, threshold: OffsetDateTime, limit: i64) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM batches WHERE status = 'processing' AND updated_at < $1 ORDER BY updated_at ASC LIMIT $2",
        )
        .bind(threshold)
        .bind(limit)
        .fetch_all(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Conditional `queued -> processing` transition, stamping `started_at`.
    /// Returns `true` iff this caller won the race.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn begin_processing(&self, conn: &mut PgConnection, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE batches SET status = 'processing', started_at = now(), updated_at = now() \
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Any conditional transition described by §4.E's edge list, guarded by
    /// `WHERE status = expected` so concurrent writers converge.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn transition(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        expected: BatchStatus,
        next: BatchStatus,
    ) -> Result<bool> {
        if !expected.can_transition_to(next) {
            return Ok(false);
        }

        let result = sqlx::query("UPDATE batches SET status = $3, updated_at = now() WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(expected)
            .bind(next)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// `draft|scheduled -> queued`, the "send" / "schedule-fires" entry point.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    pub async fn mark_queued_from(&self, conn: &mut PgConnection, id: Uuid, from: BatchStatus) -> Result<bool> {
        self.transition(conn, id, from, BatchStatus::Queued).await
    }

    /// Applies per-recipient send-outcome counter deltas (§4.D step 6) with
    /// `LEAST(new, total)` clamping so a logic error can never push a
    /// counter past `total_recipients`.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn apply_send_outcome(&self, conn: &mut PgConnection, batch_id: Uuid, sent: i64, failed: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE batches SET \
                sent_count = LEAST(sent_count + $2, total_recipients), \
                failed_count = LEAST(failed_count + $3, total_recipients), \
                updated_at = now() \
             WHERE id = $1",
        )
        .bind(batch_id)
        .bind(sent)
        .bind(failed)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Applies aggregated webhook-reconciliation counter deltas (§4.H step
    /// 4), again clamped via `LEAST`.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn apply_webhook_deltas(&self, conn: &mut PgConnection, batch_id: Uuid, deltas: BatchCounters) -> Result<()> {
        sqlx::query(
            "UPDATE batches SET \
                delivered_count = LEAST(delivered_count + $2, total_recipients), \
                bounced_count = LEAST(bounced_count + $3, total_recipients), \
                complained_count = LEAST(complained_count + $4, total_recipients), \
                failed_count = LEAST(failed_count + $5, total_recipients), \
                updated_at = now() \
             WHERE id = $1",
        )
        .bind(batch_id)
        .bind(deltas.delivered)
        .bind(deltas.bounced)
        .bind(deltas.complained)
        .bind(deltas.failed)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(())
    }

    /// Atomic completion write (§4.B `isBatchComplete` → §4.E
    /// `processing -> completed`). Returns `true` iff this call performed
    /// the transition.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn try_complete(&self, conn: &mut PgConnection, batch_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE batches SET status = 'completed', completed_at = now(), updated_at = now() \
             WHERE id = $1 AND status = 'processing' \
               AND sent_count + delivered_count + bounced_count + complained_count + failed_count >= total_recipients",
        )
        .bind(batch_id)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Bumps the recovery counter and transitions to `failed` once it
    /// exceeds `max_retries` (§4.E stuck-batch recovery).
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn record_recovery_attempt(&self, conn: &mut PgConnection, batch_id: Uuid, max_retries: u32) -> Result<bool> {
        let row: (i32,) = sqlx::query_as(
            "UPDATE batches SET recovery_count = recovery_count + 1, updated_at = now() \
             WHERE id = $1 RETURNING recovery_count",
        )
        .bind(batch_id)
        .fetch_one(conn)
        .await
        .map_err(AppError::Database)?;

        #[allow(clippy::cast_sign_loss)]
        let exceeded = row.0 as u32 > max_retries;
        if exceeded {
            sqlx::query("UPDATE batches SET status = 'failed', updated_at = now() WHERE id = $1 AND status = 'processing'")
                .bind(batch_id)
                .execute(conn)
                .await
                .map_err(AppError::Database)?;
        }
        Ok(exceeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_rejects_edges_not_in_the_lifecycle_table() {
        let repo = BatchRepository::new();
        // can't assert DB behaviour without a live pool, but the guard
        // short-circuits before ever issuing a query, so this documents the
        // contract without a connection.
        let _ = repo;
        assert!(!BatchStatus::Completed.can_transition_to(BatchStatus::Queued));
    }
}

use crate::adapters::database::records::RecipientRecord;
use crate::domain::{Recipient, RecipientStatus};
use crate::error::{AppError, Result};
use serde_json::Value as JsonValue;
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct RecipientRepository {}

impl RecipientRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// Bulk-inserts a batch's recipient rows in `pending` state. Used when a
    /// batch is created from its payload, before it is ever queued.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, rows))]
    pub async fn insert_many(
        &self,
        conn: &mut PgConnection,
        batch_id: Uuid,
        rows: &[(String, Option<String>, JsonValue)],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let identifiers: Vec<String> = rows.iter().map(|(identifier, _, _)| identifier.clone()).collect();
        let names: Vec<Option<String>> = rows.iter().map(|(_, name, _)| name.clone()).collect();
        let variables: Vec<JsonValue> = rows.iter().map(|(_, _, vars)| vars.clone()).collect();

        let result = sqlx::query(
            "INSERT INTO recipients (batch_id, identifier, name, variables, status) \
             SELECT $1, * FROM UNNEST($2::text[], $3::text[], $4::jsonb[]) AS t(identifier, name, variables) \
             CROSS JOIN LATERAL (SELECT 'pending'::recipient_status) AS s(status)",
        )
        .bind(batch_id)
        .bind(&identifiers)
        .bind(&names)
        .bind(&variables)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    /// Cursor page of recipients ordered by `id`, the shape the per-tenant
    /// worker and the processor stream consume (§4.D, §4.E). `page_size`
    /// comes from `OrchestratorConfig` rather than a fixed constant, so it
    /// can be tuned per deployment without a rebuild.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn page(
        &self,
        conn: &mut PgConnection,
        batch_id: Uuid,
        after: Option<Uuid>,
        page_size: i64,
    ) -> Result<Vec<Recipient>> {
        let records: Vec<RecipientRecord> = match after {
            Some(cursor) => {
                sqlx::query_as(
                    "SELECT * FROM recipients WHERE batch_id = $1 AND id > $2 ORDER BY id ASC LIMIT $3",
                )
                .bind(batch_id)
                .bind(cursor)
                .bind(page_size)
                .fetch_all(conn)
                .await
            }
            None => {
                sqlx::query_as("SELECT * FROM recipients WHERE batch_id = $1 ORDER BY id ASC LIMIT $2")
                    .bind(batch_id)
                    .bind(page_size)
                    .fetch_all(conn)
                    .await
            }
        }
        .map_err(AppError::Database)?;
        Ok(records.into_iter().map(Into::into).collect())
    }

    /// Conditional `pending -> queued` claim, mirroring the batch-level
    /// transition guard so two workers can't double-dispatch a recipient.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn claim_for_send(&self, conn: &mut PgConnection, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE recipients SET status = 'queued', updated_at = now() WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Records the terminal outcome of a single send attempt (§4.D step 6):
    /// `queued -> sent` with the provider message id, or `queued -> failed`
    /// with the error. Returns whether the `WHERE status = 'queued'` guard
    /// actually matched a row — the caller must not count a send, write the
    /// message index, or bump batch counters when it didn't, since that
    /// means a redelivered job found the recipient already past `queued`.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, error_message))]
    pub async fn record_send_outcome(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        outcome: &Recipient,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let rows_affected = match outcome.status {
            RecipientStatus::Sent => {
                sqlx::query(
                    "UPDATE recipients SET status = 'sent', provider_message_id = $2, sent_at = now(), updated_at = now() \
                     WHERE id = $1 AND status = 'queued'",
                )
                .bind(id)
                .bind(&outcome.provider_message_id)
                .execute(conn)
                .await
                .map_err(AppError::Database)?
                .rows_affected()
            }
            RecipientStatus::Failed => {
                sqlx::query(
                    "UPDATE recipients SET status = 'failed', error_message = $2, updated_at = now() \
                     WHERE id = $1 AND status = 'queued'",
                )
                .bind(id)
                .bind(error_message)
                .execute(conn)
                .await
                .map_err(AppError::Database)?
                .rows_affected()
            }
            other => {
                return Err(AppError::Validation(format!("{other:?} is not a valid send outcome")));
            }
        };
        Ok(rows_affected > 0)
    }

    /// Looks a recipient up by id for the webhook reconciler, which already
    /// resolved `provider_message_id -> recipient_id` via the message index.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn find_by_id(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<Recipient>> {
        let record = sqlx::query_as::<_, RecipientRecord>("SELECT * FROM recipients WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(record.map(Into::into))
    }

    /// Applies a webhook-driven transition (§4.H step 3), guarded by
    /// [`RecipientStatus::can_transition_to`] so a stray redelivery can't
    /// regress or loop a recipient's state.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn apply_webhook_transition(&self, conn: &mut PgConnection, id: Uuid, next: RecipientStatus) -> Result<bool> {
        let current = self.find_by_id(conn, id).await?;
        let Some(current) = current else { return Ok(false) };
        if !current.status.can_transition_to(next) {
            return Ok(false);
        }

        let timestamp_column = match next {
            RecipientStatus::Delivered => Some("delivered_at"),
            RecipientStatus::Bounced => Some("bounced_at"),
            RecipientStatus::Complained => Some("complained_at"),
            // §4.H step 3's `failed` webhook: the recipients table has no
            // dedicated `failed_at` column (a `sent -> failed` redirect is
            // the exception, not a timestamped refinement), so only
            // `status`/`updated_at` move.
            RecipientStatus::Failed => None,
            _ => {
                return Err(AppError::Validation(format!("{next:?} is not a webhook-driven transition")));
            }
        };

        let sql = match timestamp_column {
            Some(column) => format!(
                "UPDATE recipients SET status = $2, {column} = now(), updated_at = now() \
                 WHERE id = $1 AND status = $3"
            ),
            None => "UPDATE recipients SET status = $2, updated_at = now() WHERE id = $1 AND status = $3".to_owned(),
        };
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(next)
            .bind(current.status)
            .execute(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_transition_columns_cover_every_webhook_driven_status() {
        for status in [RecipientStatus::Delivered, RecipientStatus::Bounced, RecipientStatus::Complained] {
            assert!(RecipientStatus::Sent.can_transition_to(status) || status == RecipientStatus::Complained);
        }
        let repo = RecipientRepository::new();
        let _ = repo;
    }
}

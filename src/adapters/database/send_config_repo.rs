use crate::adapters::database::records::SendConfigRecord;
use crate::domain::{ModuleKind, SendConfig};
use crate::error::{AppError, Result};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct SendConfigRepository {}

impl SendConfigRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn find_by_id(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<SendConfig>> {
        let record =
            sqlx::query_as::<_, SendConfigRecord>("SELECT * FROM send_configs WHERE id = $1 AND is_active")
                .bind(id)
                .fetch_optional(conn)
                .await
                .map_err(AppError::Database)?;
        Ok(record.map(Into::into))
    }

    /// Resolves the active default config for `(user, module)` when a batch
    /// is created without an explicit `sendConfigId` (§4.C precedence).
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn find_default(&self, conn: &mut PgConnection, user_id: Uuid, module: ModuleKind) -> Result<Option<SendConfig>> {
        let record = sqlx::query_as::<_, SendConfigRecord>(
            "SELECT * FROM send_configs WHERE user_id = $1 AND module = $2 AND is_default AND is_active",
        )
        .bind(user_id)
        .bind(module)
        .fetch_optional(conn)
        .await
        .map_err(AppError::Database)?;
        Ok(record.map(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_without_a_connection() {
        let repo = SendConfigRepository::new();
        let _ = repo;
    }
}

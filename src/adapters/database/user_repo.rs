use crate::adapters::database::records::{ApiKeyRecord, UserRecord};
use crate::domain::{ApiKey, User};
use crate::error::{AppError, Result};
use sha2::{Digest, Sha256};
use sqlx::PgConnection;
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
pub struct UserRepository {}

impl UserRepository {
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn))]
    pub async fn find_by_id(&self, conn: &mut PgConnection, id: Uuid) -> Result<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await
            .map_err(AppError::Database)?;
        Ok(record.map(Into::into))
    }

    /// Resolves the bearer credential on every authenticated request (§6).
    /// Hashes `raw_key` with SHA-256 and looks the digest up directly, so the
    /// plaintext key never needs to round-trip through the database.
    ///
    /// # Errors
    /// Returns `AppError::Database` if the query fails.
    #[tracing::instrument(level = "debug", skip(self, conn, raw_key))]
    pub async fn find_api_key_by_raw(&self, conn: &mut PgConnection, raw_key: &str) -> Result<Option<ApiKey>> {
        let digest = Sha256::digest(raw_key.as_bytes()).to_vec();
        let record = sqlx::query_as::<_, ApiKeyRecord>("SELECT * FROM api_keys WHERE hash = $1")
            .bind(&digest)
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
    fn hashing_is_deterministic() {
        let a = Sha256::digest(b"bsk_live_abc123").to_vec();
        let b = Sha256::digest(b"bsk_live_abc123").to_vec();
        assert_eq!(a, b);
    }
}

use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub display_name: String,
    pub created_at: OffsetDateTime,
}

/// A bearer credential a user presents on every request. Only the hash is
/// ever persisted; `prefix` is shown back to the user for key management UIs
/// and doubles as the dry-run marker (`bsk_test_*`).
#[derive(Debug, Clone)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub hash: Vec<u8>,
    pub prefix: String,
    pub label: String,
    pub created_at: OffsetDateTime,
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
}

const TEST_KEY_PREFIX: &str = "bsk_test_";

impl ApiKey {
    /// A test key forces every batch created with it into `dry_run`, per
    /// invariant 8: test keys and dry-run batches issue zero provider calls.
    #[must_use]
    pub fn is_test_key(&self) -> bool {
        self.prefix.starts_with(TEST_KEY_PREFIX)
    }

    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    #[must_use]
    pub fn is_usable(&self, now: OffsetDateTime) -> bool {
        self.revoked_at.is_none() && !self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(prefix: &str) -> ApiKey {
        ApiKey {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            hash: vec![0; 32],
            prefix: prefix.to_string(),
            label: "test".to_string(),
            created_at: OffsetDateTime::now_utc(),
            expires_at: None,
            revoked_at: None,
        }
    }

    #[test]
    fn test_prefix_forces_dry_run() {
        assert!(key("bsk_test_abc123").is_test_key());
        assert!(!key("bsk_live_abc123").is_test_key());
    }

    #[test]
    fn revoked_key_is_unusable() {
        let mut k = key("bsk_live_abc123");
        k.revoked_at = Some(OffsetDateTime::now_utc());
        assert!(!k.is_usable(OffsetDateTime::now_utc()));
    }

    #[test]
    fn expired_key_is_unusable() {
        let mut k = key("bsk_live_abc123");
        let now = OffsetDateTime::now_utc();
        k.expires_at = Some(now - time::Duration::seconds(1));
        assert!(!k.is_usable(now));
    }
}

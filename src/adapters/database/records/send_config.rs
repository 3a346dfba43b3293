use crate::domain::{ModuleKind, RateLimitPolicy, SendConfig};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SendConfigRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub module: ModuleKind,
    pub config: JsonValue,
    pub rate_limit: JsonValue,
    pub is_default: bool,
    pub is_active: bool,
}

impl From<SendConfigRecord> for SendConfig {
    fn from(r: SendConfigRecord) -> Self {
        let rate_limit = serde_json::from_value(r.rate_limit).unwrap_or(RateLimitPolicy {
            requests_per_second: None,
            recipients_per_request: 1,
            daily_limit: None,
        });

        Self { id: r.id, user_id: r.user_id, module: r.module, config: r.config, rate_limit, is_default: r.is_default, is_active: r.is_active }
    }
}

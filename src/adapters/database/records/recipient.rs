use crate::domain::{Recipient, RecipientStatus};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RecipientRecord {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub identifier: String,
    pub name: Option<String>,
    pub variables: JsonValue,
    pub status: RecipientStatus,
    pub provider_message_id: Option<String>,
    pub sent_at: Option<OffsetDateTime>,
    pub delivered_at: Option<OffsetDateTime>,
    pub bounced_at: Option<OffsetDateTime>,
    pub complained_at: Option<OffsetDateTime>,
    pub error_message: Option<String>,
    pub updated_at: OffsetDateTime,
}

impl From<RecipientRecord> for Recipient {
    fn from(r: RecipientRecord) -> Self {
        let variables = r
            .variables
            .as_object()
            .map(|obj| {
                obj.iter().filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string()))).collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default();

        Self {
            id: r.id,
            batch_id: r.batch_id,
            identifier: r.identifier,
            name: r.name,
            variables,
            status: r.status,
            provider_message_id: r.provider_message_id,
            sent_at: r.sent_at,
            delivered_at: r.delivered_at,
            bounced_at: r.bounced_at,
            complained_at: r.complained_at,
            error_message: r.error_message,
            updated_at: r.updated_at,
        }
    }
}

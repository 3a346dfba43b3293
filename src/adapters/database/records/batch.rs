use crate::domain::{Batch, BatchCounters, BatchStatus};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use uuid::Uuid;

/// Wire shape for a `batches` row. A plain `FromRow` struct kept distinct
/// from `Batch` so a column rename or addition doesn't ripple into the
/// domain type's call sites, the same separation the teacher draws between
/// `records::MessageRecord` and `domain::message::Message`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BatchRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub send_config_id: Uuid,
    pub name: String,
    pub payload: JsonValue,
    pub total_recipients: i64,
    pub sent_count: i64,
    pub delivered_count: i64,
    pub bounced_count: i64,
    pub complained_count: i64,
    pub failed_count: i64,
    pub status: BatchStatus,
    pub scheduled_at: Option<OffsetDateTime>,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub dry_run: bool,
    pub recovery_count: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<BatchRecord> for Batch {
    fn from(r: BatchRecord) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            send_config_id: r.send_config_id,
            name: r.name,
            payload: r.payload,
            total_recipients: r.total_recipients,
            counters: BatchCounters {
                sent: r.sent_count,
                delivered: r.delivered_count,
                bounced: r.bounced_count,
                complained: r.complained_count,
                failed: r.failed_count,
            },
            status: r.status,
            scheduled_at: r.scheduled_at,
            started_at: r.started_at,
            completed_at: r.completed_at,
            dry_run: r.dry_run,
            #[allow(clippy::cast_sign_loss)]
            recovery_count: r.recovery_count as u32,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

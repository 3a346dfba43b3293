use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    BatchEnqueued,
    Sent,
    Failed,
    Delivered,
    Bounced,
    Complained,
    Opened,
    Clicked,
    SoftBounced,
    BatchCompleted,
}

impl EventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BatchEnqueued => "batch_enqueued",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Delivered => "delivered",
            Self::Bounced => "bounced",
            Self::Complained => "complained",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::SoftBounced => "soft_bounced",
            Self::BatchCompleted => "batch_completed",
        }
    }
}

/// Append-only analytics record. One row per observable transition; written
/// through a buffered logger rather than per-event (§9 "buffered-logger").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: EventType,
    pub batch_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub user_id: Uuid,
    pub provider_message_id: Option<String>,
    pub timestamp: OffsetDateTime,
    pub metadata: JsonValue,
    pub error_message: Option<String>,
}

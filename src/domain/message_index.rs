use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `provider_message_id -> {recipient, batch, user}`, populated on send
/// success (§3). Backs webhook enrichment when the inbound event doesn't
/// carry the recipient/batch identifiers directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MessageIndexEntry {
    pub recipient_id: Uuid,
    pub batch_id: Uuid,
    pub user_id: Uuid,
}

pub mod batch;
pub mod event_record;
pub mod message_index;
pub mod recipient;
pub mod send_config;
pub mod user;
pub mod webhook;

pub use batch::{Batch, BatchCounters, BatchStatus};
pub use event_record::{EventRecord, EventType};
pub use message_index::MessageIndexEntry;
pub use recipient::{Recipient, RecipientStatus};
pub use send_config::{ConfigMode, ModuleKind, RateLimitPolicy, SendConfig, SendConfigSnapshot};
pub use user::{ApiKey, User};
pub use webhook::{Provider, WebhookEvent, WebhookEventType};

pub mod batch;
pub mod recipient;
pub mod send_config;
pub mod user;

pub use batch::BatchRecord;
pub use recipient::RecipientRecord;
pub use send_config::SendConfigRecord;
pub use user::{ApiKeyRecord, UserRecord};

pub mod fcm;
pub mod generic_webhook;
pub mod mock;
pub mod resend;
pub mod ses;
pub mod telnyx;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Synthetic provider message ids are prefixed this way so a dry-run
/// recipient can never be mistaken for a live provider response
/// (invariant 8).
pub const MOCK_MESSAGE_ID_PREFIX: &str = "mock-";

/// One outbound wire format, one struct. Every concrete provider below
/// implements this against `reqwest`, the same HTTP-client promotion the
/// teacher's dev-dependency-only `reqwest` gets here since outbound calls
/// are now core to the system rather than incidental to tests.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    /// Sends one rendered payload to one recipient and returns the
    /// provider-assigned message id.
    ///
    /// # Errors
    /// Returns `AppError::ProviderTransient` for retryable failures (5xx,
    /// timeout, connection reset) and `AppError::ProviderPermanent` for
    /// failures a retry cannot fix (4xx validation, unknown recipient).
    async fn deliver(&self, recipient_identifier: &str, payload: &JsonValue, config: &JsonValue) -> Result<String>;
}

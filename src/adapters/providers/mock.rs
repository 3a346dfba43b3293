use crate::adapters::providers::{Provider, MOCK_MESSAGE_ID_PREFIX};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// The mandatory dry-run provider (invariant 8): every `dry_run` batch and
/// every batch sent with a `bsk_test_*` API key is routed here instead of a
/// live provider, regardless of which module/provider its config names.
/// Never performs network I/O.
#[derive(Debug, Default)]
pub struct MockProvider;

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn deliver(&self, recipient_identifier: &str, _payload: &JsonValue, _config: &JsonValue) -> Result<String> {
        tracing::debug!(recipient = %recipient_identifier, "dry-run send, no provider call issued");
        Ok(format!("{MOCK_MESSAGE_ID_PREFIX}{}", Uuid::new_v4()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_message_ids_carry_the_dry_run_prefix() {
        let provider = MockProvider;
        let id = provider.deliver("user@example.com", &JsonValue::Null, &JsonValue::Null).await.expect("mock never fails");
        assert!(id.starts_with(MOCK_MESSAGE_ID_PREFIX));
    }
}

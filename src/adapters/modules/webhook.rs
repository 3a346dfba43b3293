use crate::adapters::modules::{SendJob, SendModule, SendOutcome};
use crate::adapters::providers::generic_webhook::GenericWebhookProvider;
use crate::adapters::providers::mock::MockProvider;
use crate::adapters::providers::Provider;
use crate::domain::ModuleKind;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Webhook module: delivers the rendered payload to a user-owned HTTP
/// endpoint. The "recipient" for this module is the destination URL itself
/// rather than an email address or phone number.
#[derive(Debug)]
pub struct WebhookModule {
    generic: GenericWebhookProvider,
    mock: MockProvider,
}

impl WebhookModule {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { generic: GenericWebhookProvider::new(client), mock: MockProvider }
    }
}

#[async_trait]
impl SendModule for WebhookModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Webhook
    }

    fn validate_config(&self, _config: &JsonValue) -> Result<()> {
        Ok(())
    }

    fn validate_payload(&self, payload: &JsonValue) -> Result<()> {
        if !payload.is_object() {
            return Err(AppError::Validation("webhook payload must be a JSON object".to_string()));
        }
        Ok(())
    }

    async fn execute(&self, job: SendJob) -> Result<SendOutcome> {
        if !job.recipient_identifier.starts_with("https://") && !job.recipient_identifier.starts_with("http://") {
            return Ok(SendOutcome::failed("recipient is not a valid URL"));
        }

        let provider: &dyn Provider = if job.dry_run { &self.mock } else { &self.generic };
        match provider.deliver(&job.recipient_identifier, &job.rendered_payload, &job.provider_config).await {
            Ok(message_id) => Ok(SendOutcome::ok(message_id)),
            Err(AppError::ProviderPermanent(msg)) => Ok(SendOutcome::failed(msg)),
            Err(other) => Err(other),
        }
    }
}

use crate::adapters::modules::{ModuleRegistry, SendJob, SendOutcome};
use crate::domain::{Recipient, SendConfigSnapshot};
use crate::error::{AppError, Result};
use crate::services::template;

/// The per-recipient send path (§4.D step 5): resolve the module for
/// `send_config.module`, render the batch payload template against the
/// recipient's variables, and dispatch. Dry-run resolution (batch-level or
/// forced by a `bsk_test_*` key) happens here so every module sees the same
/// `SendJob.dry_run` flag regardless of which path set it.
#[derive(Debug, Clone)]
pub struct DispatchService {
    registry: ModuleRegistry,
}

impl DispatchService {
    #[must_use]
    pub const fn new(registry: ModuleRegistry) -> Self {
        Self { registry }
    }

    /// # Errors
    /// Returns `AppError::Internal` if no module is registered for
    /// `send_config.module`, or propagates a transient provider error for
    /// the worker to retry.
    #[tracing::instrument(level = "debug", skip(self, recipient, send_config, batch_payload))]
    pub async fn send(
        &self,
        recipient: &Recipient,
        send_config: &SendConfigSnapshot,
        batch_payload: &serde_json::Value,
        dry_run: bool,
    ) -> Result<SendOutcome> {
        let module = self.registry.get(send_config.module).ok_or_else(|| {
            tracing::error!(module = ?send_config.module, "no module registered for this kind");
            AppError::Internal
        })?;

        let rendered_payload = template::render(batch_payload, &recipient.variables);

        let job = SendJob {
            recipient_identifier: recipient.identifier.clone(),
            variables: recipient.variables.clone(),
            rendered_payload,
            provider_config: send_config.config.clone(),
            dry_run,
        };

        module.execute(job).await
    }
}

use crate::adapters::modules::{SendJob, SendModule, SendOutcome};
use crate::adapters::providers::mock::MockProvider;
use crate::adapters::providers::resend::ResendProvider;
use crate::adapters::providers::ses::SesProvider;
use crate::adapters::providers::Provider;
use crate::domain::ModuleKind;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Email module: routes to `ses` or `resend` by `config.provider`, per
/// §4.C's provider-keyed dispatch.
#[derive(Debug)]
pub struct EmailModule {
    ses: SesProvider,
    resend: ResendProvider,
    mock: MockProvider,
}

impl EmailModule {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { ses: SesProvider::new(client.clone()), resend: ResendProvider::new(client), mock: MockProvider }
    }

    fn provider_for<'a>(&'a self, name: &str, dry_run: bool) -> Result<&'a (dyn Provider)> {
        if dry_run {
            return Ok(&self.mock);
        }
        match name {
            "ses" => Ok(&self.ses),
            "resend" => Ok(&self.resend),
            other => Err(AppError::Validation(format!("unknown email provider '{other}'"))),
        }
    }
}

#[async_trait]
impl SendModule for EmailModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Email
    }

    fn validate_config(&self, config: &JsonValue) -> Result<()> {
        let provider = config
            .get("provider")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AppError::Validation("email config missing 'provider'".to_string()))?;
        if !matches!(provider, "ses" | "resend") {
            return Err(AppError::Validation(format!("unknown email provider '{provider}'")));
        }
        Ok(())
    }

    fn validate_payload(&self, payload: &JsonValue) -> Result<()> {
        if payload.get("subject").and_then(JsonValue::as_str).is_none() {
            return Err(AppError::Validation("email payload missing 'subject'".to_string()));
        }
        Ok(())
    }

    async fn execute(&self, job: SendJob) -> Result<SendOutcome> {
        let provider_name = job.provider_config.get("provider").and_then(JsonValue::as_str).unwrap_or("ses");
        let provider = self.provider_for(provider_name, job.dry_run)?;
        match provider.deliver(&job.recipient_identifier, &job.rendered_payload, &job.provider_config).await {
            Ok(message_id) => Ok(SendOutcome::ok(message_id)),
            Err(AppError::ProviderPermanent(msg)) => Ok(SendOutcome::failed(msg)),
            Err(other) => Err(other),
        }
    }
}

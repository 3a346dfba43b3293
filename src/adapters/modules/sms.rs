use crate::adapters::modules::{SendJob, SendModule, SendOutcome};
use crate::adapters::providers::mock::MockProvider;
use crate::adapters::providers::telnyx::TelnyxProvider;
use crate::adapters::providers::Provider;
use crate::domain::ModuleKind;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// SMS module: Telnyx is currently the only supported provider.
#[derive(Debug)]
pub struct SmsModule {
    telnyx: TelnyxProvider,
    mock: MockProvider,
}

impl SmsModule {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { telnyx: TelnyxProvider::new(client), mock: MockProvider }
    }

    fn provider_for<'a>(&'a self, name: &str, dry_run: bool) -> Result<&'a (dyn Provider)> {
        if dry_run {
            return Ok(&self.mock);
        }
        match name {
            "telnyx" => Ok(&self.telnyx),
            other => Err(AppError::Validation(format!("unknown sms provider '{other}'"))),
        }
    }
}

#[async_trait]
impl SendModule for SmsModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Sms
    }

    fn validate_config(&self, config: &JsonValue) -> Result<()> {
        let provider = config
            .get("provider")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AppError::Validation("sms config missing 'provider'".to_string()))?;
        if provider != "telnyx" {
            return Err(AppError::Validation(format!("unknown sms provider '{provider}'")));
        }
        if config.get("from").and_then(JsonValue::as_str).is_none() {
            return Err(AppError::Validation("sms config missing 'from'".to_string()));
        }
        Ok(())
    }

    fn validate_payload(&self, payload: &JsonValue) -> Result<()> {
        if payload.get("text").and_then(JsonValue::as_str).is_none() {
            return Err(AppError::Validation("sms payload missing 'text'".to_string()));
        }
        Ok(())
    }

    async fn execute(&self, job: SendJob) -> Result<SendOutcome> {
        let provider_name = job.provider_config.get("provider").and_then(JsonValue::as_str).unwrap_or("telnyx");
        let provider = self.provider_for(provider_name, job.dry_run)?;
        match provider.deliver(&job.recipient_identifier, &job.rendered_payload, &job.provider_config).await {
            Ok(message_id) => Ok(SendOutcome::ok(message_id)),
            Err(AppError::ProviderPermanent(msg)) => Ok(SendOutcome::failed(msg)),
            Err(other) => Err(other),
        }
    }
}

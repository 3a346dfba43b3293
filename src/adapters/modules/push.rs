use crate::adapters::modules::{SendJob, SendModule, SendOutcome};
use crate::adapters::providers::fcm::FcmProvider;
use crate::adapters::providers::mock::MockProvider;
use crate::adapters::providers::Provider;
use crate::domain::ModuleKind;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Push module: FCM is currently the only supported provider, generalizing
/// the teacher's `PushProvider` trait / `FcmPushProvider` stub into a real
/// dispatch path behind [`SendModule`].
#[derive(Debug)]
pub struct PushModule {
    fcm: FcmProvider,
    mock: MockProvider,
}

impl PushModule {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { fcm: FcmProvider::new(client), mock: MockProvider }
    }

    fn provider_for<'a>(&'a self, name: &str, dry_run: bool) -> Result<&'a (dyn Provider)> {
        if dry_run {
            return Ok(&self.mock);
        }
        match name {
            "fcm" => Ok(&self.fcm),
            other => Err(AppError::Validation(format!("unknown push provider '{other}'"))),
        }
    }
}

#[async_trait]
impl SendModule for PushModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Push
    }

    fn validate_config(&self, config: &JsonValue) -> Result<()> {
        let provider = config
            .get("provider")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AppError::Validation("push config missing 'provider'".to_string()))?;
        if provider != "fcm" {
            return Err(AppError::Validation(format!("unknown push provider '{provider}'")));
        }
        Ok(())
    }

    fn validate_payload(&self, _payload: &JsonValue) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, job: SendJob) -> Result<SendOutcome> {
        let provider_name = job.provider_config.get("provider").and_then(JsonValue::as_str).unwrap_or("fcm");
        let provider = self.provider_for(provider_name, job.dry_run)?;
        match provider.deliver(&job.recipient_identifier, &job.rendered_payload, &job.provider_config).await {
            Ok(message_id) => Ok(SendOutcome::ok(message_id)),
            Err(AppError::ProviderPermanent(msg)) => Ok(SendOutcome::failed(msg)),
            Err(other) => Err(other),
        }
    }
}

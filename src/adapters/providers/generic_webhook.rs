use crate::adapters::providers::Provider;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::Value as JsonValue;
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// A user-owned HTTP endpoint module (§4.C "webhook" module). Unlike the
/// provider-hosted email/SMS/push modules, `generic_webhook` is a BYOK
/// pass-through: this system signs the outgoing body so the recipient
/// endpoint can verify it came from us, mirroring the `X-Webhook-Signature:
/// sha256={hex}` scheme this system itself uses for inbound provider
/// webhooks.
#[derive(Debug)]
pub struct GenericWebhookProvider {
    client: reqwest::Client,
}

impl GenericWebhookProvider {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Provider for GenericWebhookProvider {
    fn name(&self) -> &'static str {
        "generic_webhook"
    }

    async fn deliver(&self, recipient_identifier: &str, payload: &JsonValue, config: &JsonValue) -> Result<String> {
        let url = recipient_identifier;
        let secret = config.get("signing_secret").and_then(JsonValue::as_str).unwrap_or_default();
        let body = serde_json::to_vec(payload)
            .map_err(|e| AppError::Validation(format!("payload not serializable: {e}")))?;

        let mut request = self.client.post(url).body(body.clone());
        if !secret.is_empty() {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .map_err(|e| AppError::Validation(format!("invalid signing secret: {e}")))?;
            mac.update(&body);
            let signature = hex::encode(mac.finalize().into_bytes());
            request = request.header("X-Webhook-Signature", format!("sha256={signature}"));
        }

        let response = request.send().await.map_err(|e| AppError::ProviderTransient(e.to_string()))?;
        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(AppError::ProviderTransient(format!("endpoint returned {status}")));
        }
        if !status.is_success() {
            return Err(AppError::ProviderPermanent(format!("endpoint returned {status}")));
        }

        // Arbitrary recipient endpoints don't hand back a message id; mint
        // one locally so downstream reconciliation still has something to
        // index on.
        Ok(format!("webhook-{}", Uuid::new_v4()))
    }
}

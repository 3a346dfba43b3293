use crate::adapters::providers::Provider;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

#[derive(Debug, Deserialize)]
struct TelnyxData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TelnyxResponse {
    data: TelnyxData,
}

/// Telnyx's messaging API (SMS). Telnyx signs its webhooks with Ed25519
/// rather than HMAC (see `services::webhook_ingestor`), but outbound sends
/// are a plain bearer-authenticated REST call.
#[derive(Debug)]
pub struct TelnyxProvider {
    client: reqwest::Client,
}

impl TelnyxProvider {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Provider for TelnyxProvider {
    fn name(&self) -> &'static str {
        "telnyx"
    }

    async fn deliver(&self, recipient_identifier: &str, payload: &JsonValue, config: &JsonValue) -> Result<String> {
        let api_key = config
            .get("api_key")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AppError::Validation("telnyx config missing 'api_key'".to_string()))?;
        let from = config
            .get("from")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AppError::Validation("telnyx config missing 'from'".to_string()))?;
        let text = payload.get("text").and_then(JsonValue::as_str).unwrap_or_default();

        let body = json!({ "from": from, "to": recipient_identifier, "text": text });

        let response = self
            .client
            .post("https://api.telnyx.com/v2/messages")
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderTransient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(AppError::ProviderTransient(format!("telnyx returned {status}")));
        }
        if !status.is_success() {
            return Err(AppError::ProviderPermanent(format!("telnyx returned {status}")));
        }

        let parsed: TelnyxResponse =
            response.json().await.map_err(|e| AppError::ProviderTransient(format!("malformed telnyx response: {e}")))?;
        Ok(parsed.data.id)
    }
}

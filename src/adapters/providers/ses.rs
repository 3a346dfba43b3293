use crate::adapters::providers::Provider;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

#[derive(Debug, Deserialize)]
struct SesResponse {
    #[serde(rename = "MessageId")]
    message_id: String,
}

/// Amazon SES v2 `SendEmail` over HTTP. Config carries the endpoint and a
/// bearer credential already scoped to the sending identity; request
/// signing is the caller's infrastructure concern (a sidecar or signing
/// proxy in front of SES), not something this module re-implements.
#[derive(Debug)]
pub struct SesProvider {
    client: reqwest::Client,
}

impl SesProvider {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Provider for SesProvider {
    fn name(&self) -> &'static str {
        "ses"
    }

    async fn deliver(&self, recipient_identifier: &str, payload: &JsonValue, config: &JsonValue) -> Result<String> {
        let endpoint = config
            .get("endpoint")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AppError::Validation("ses config missing 'endpoint'".to_string()))?;
        let auth_token = config.get("auth_token").and_then(JsonValue::as_str).unwrap_or_default();

        let body = json!({
            "Destination": { "ToAddresses": [recipient_identifier] },
            "Content": payload,
        });

        let response = self
            .client
            .post(endpoint)
            .bearer_auth(auth_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderTransient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(AppError::ProviderTransient(format!("ses returned {status}")));
        }
        if !status.is_success() {
            return Err(AppError::ProviderPermanent(format!("ses returned {status}")));
        }

        let parsed: SesResponse =
            response.json().await.map_err(|e| AppError::ProviderTransient(format!("malformed ses response: {e}")))?;
        Ok(parsed.message_id)
    }
}

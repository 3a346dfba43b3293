use crate::adapters::providers::Provider;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

#[derive(Debug, Deserialize)]
struct ResendResponse {
    id: String,
}

/// Resend's transactional email API.
#[derive(Debug)]
pub struct ResendProvider {
    client: reqwest::Client,
}

impl ResendProvider {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Provider for ResendProvider {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn deliver(&self, recipient_identifier: &str, payload: &JsonValue, config: &JsonValue) -> Result<String> {
        let api_key = config
            .get("api_key")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AppError::Validation("resend config missing 'api_key'".to_string()))?;

        let mut body = payload.clone();
        if let Some(obj) = body.as_object_mut() {
            obj.insert("to".to_string(), json!([recipient_identifier]));
        }

        let response = self
            .client
            .post("https://api.resend.com/emails")
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderTransient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(AppError::ProviderTransient(format!("resend returned {status}")));
        }
        if !status.is_success() {
            return Err(AppError::ProviderPermanent(format!("resend returned {status}")));
        }

        let parsed: ResendResponse =
            response.json().await.map_err(|e| AppError::ProviderTransient(format!("malformed resend response: {e}")))?;
        Ok(parsed.id)
    }
}

use crate::adapters::providers::Provider;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

#[derive(Debug, Deserialize)]
struct FcmResponse {
    name: String,
}

/// Firebase Cloud Messaging push delivery. The teacher's own `FcmPushProvider`
/// was a logging stub (`src/adapters/push/fcm.rs`); this fills in the real
/// HTTP v1 call it stood in for.
#[derive(Debug)]
pub struct FcmProvider {
    client: reqwest::Client,
}

impl FcmProvider {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Provider for FcmProvider {
    fn name(&self) -> &'static str {
        "fcm"
    }

    async fn deliver(&self, recipient_identifier: &str, payload: &JsonValue, config: &JsonValue) -> Result<String> {
        let project_id = config
            .get("project_id")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AppError::Validation("fcm config missing 'project_id'".to_string()))?;
        let access_token = config
            .get("access_token")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| AppError::Validation("fcm config missing 'access_token'".to_string()))?;

        let url = format!("https://fcm.googleapis.com/v1/projects/{project_id}/messages:send");
        let body = json!({ "message": { "token": recipient_identifier, "data": payload } });

        let response = self
            .client
            .post(url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::ProviderTransient(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(AppError::ProviderTransient(format!("fcm returned {status}")));
        }
        if !status.is_success() {
            return Err(AppError::ProviderPermanent(format!("fcm returned {status}")));
        }

        let parsed: FcmResponse =
            response.json().await.map_err(|e| AppError::ProviderTransient(format!("malformed fcm response: {e}")))?;
        Ok(parsed.name)
    }
}

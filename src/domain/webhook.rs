use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Ses,
    Resend,
    Telnyx,
}

impl Provider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ses => "ses",
            Self::Resend => "resend",
            Self::Telnyx => "telnyx",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ses" => Some(Self::Ses),
            "resend" => Some(Self::Resend),
            "telnyx" => Some(Self::Telnyx),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    Delivered,
    Bounced,
    Complained,
    Opened,
    Clicked,
    Failed,
    SoftBounced,
}

impl WebhookEventType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Bounced => "bounced",
            Self::Complained => "complained",
            Self::Opened => "opened",
            Self::Clicked => "clicked",
            Self::Failed => "failed",
            Self::SoftBounced => "soft_bounced",
        }
    }
}

/// The neutral shape every provider-specific envelope parser (§4.G step 2)
/// converges on before the reconciler ever sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub provider: Provider,
    pub provider_message_id: String,
    pub event_type: WebhookEventType,
    pub timestamp: OffsetDateTime,
    pub metadata: JsonValue,
    pub raw_payload: JsonValue,
}

impl WebhookEvent {
    /// The dedup key from §4.B: `webhook:dedup:{provider}:{providerMessageId}:{eventType}`.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        format!("{}:{}:{}", self.provider.as_str(), self.provider_message_id, self.event_type.as_str())
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "module_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Email,
    Sms,
    Webhook,
    Push,
}

impl ModuleKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
            Self::Webhook => "webhook",
            Self::Push => "push",
        }
    }
}

/// Managed credentials draw from the platform's shared provider bucket
/// (`managed:{provider}`); BYOK sends only go through the per-config bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "config_mode", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConfigMode {
    Managed,
    Byok,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub requests_per_second: Option<u32>,
    pub recipients_per_request: u32,
    pub daily_limit: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SendConfig {
    pub id: Uuid,
    pub user_id: Uuid,
    pub module: ModuleKind,
    /// Opaque, channel-specific (credentials, provider name, mode).
    pub config: JsonValue,
    pub rate_limit: RateLimitPolicy,
    pub is_default: bool,
    pub is_active: bool,
}

impl SendConfig {
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.config.get("provider").and_then(JsonValue::as_str)
    }

    #[must_use]
    pub fn mode(&self) -> ConfigMode {
        match self.config.get("mode").and_then(JsonValue::as_str) {
            Some("byok") => ConfigMode::Byok,
            _ => ConfigMode::Managed,
        }
    }

    /// Reduced snapshot embedded into per-recipient jobs so workers don't
    /// need a join back to the send_configs table for every recipient (§4.E).
    #[must_use]
    pub fn snapshot(&self) -> SendConfigSnapshot {
        SendConfigSnapshot {
            id: self.id,
            module: self.module,
            config: self.config.clone(),
            rate_limit: self.rate_limit.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendConfigSnapshot {
    pub id: Uuid,
    pub module: ModuleKind,
    pub config: JsonValue,
    pub rate_limit: RateLimitPolicy,
}

impl SendConfigSnapshot {
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.config.get("provider").and_then(JsonValue::as_str)
    }

    #[must_use]
    pub fn mode(&self) -> ConfigMode {
        match self.config.get("mode").and_then(JsonValue::as_str) {
            Some("byok") => ConfigMode::Byok,
            _ => ConfigMode::Managed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_to_managed_mode() {
        let cfg = SendConfig {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            module: ModuleKind::Email,
            config: json!({"provider": "ses"}),
            rate_limit: RateLimitPolicy { requests_per_second: None, recipients_per_request: 1, daily_limit: None },
            is_default: true,
            is_active: true,
        };
        assert_eq!(cfg.mode(), ConfigMode::Managed);
        assert_eq!(cfg.provider(), Some("ses"));
    }

    #[test]
    fn byok_mode_is_read_from_config() {
        let cfg = SendConfig {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            module: ModuleKind::Sms,
            config: json!({"provider": "telnyx", "mode": "byok"}),
            rate_limit: RateLimitPolicy { requests_per_second: Some(5), recipients_per_request: 1, daily_limit: None },
            is_default: false,
            is_active: true,
        };
        assert_eq!(cfg.mode(), ConfigMode::Byok);
    }
}

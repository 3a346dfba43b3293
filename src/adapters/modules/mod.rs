pub mod email;
pub mod push;
pub mod sms;
pub mod webhook;

use crate::domain::ModuleKind;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a module needs to actually send one recipient: the rendered,
/// template-filled payload and the provider-specific config (§4.C,
/// precedence-merged by the per-tenant worker before dispatch).
#[derive(Debug, Clone)]
pub struct SendJob {
    pub recipient_identifier: String,
    pub variables: BTreeMap<String, String>,
    pub rendered_payload: JsonValue,
    pub provider_config: JsonValue,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub provider_message_id: Option<String>,
    pub succeeded: bool,
    pub error_message: Option<String>,
}

impl SendOutcome {
    #[must_use]
    pub fn ok(provider_message_id: String) -> Self {
        Self { provider_message_id: Some(provider_message_id), succeeded: true, error_message: None }
    }

    #[must_use]
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self { provider_message_id: None, succeeded: false, error_message: Some(error_message.into()) }
    }
}

/// The capability every send module exposes, generalized from the
/// teacher's single-method `PushProvider` trait to cover config/payload
/// validation as well as dispatch, since §4.C requires both at config-save
/// time and at send time.
#[async_trait]
pub trait SendModule: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ModuleKind;

    /// Rejects a `SendConfig.config` this module can't act on (unknown
    /// provider, missing credentials key, etc.) before it's ever persisted.
    ///
    /// # Errors
    /// Returns `AppError::Validation` if the config is invalid for this module.
    fn validate_config(&self, config: &JsonValue) -> Result<()>;

    /// Rejects a batch payload this module can't render (missing template
    /// fields the provider requires, malformed recipient shape).
    ///
    /// # Errors
    /// Returns `AppError::Validation` if the payload is invalid for this module.
    fn validate_payload(&self, payload: &JsonValue) -> Result<()>;

    /// Dispatches a single job to whichever provider `job.provider_config`
    /// names. Dry-run batches never reach this — the worker intercepts them
    /// upstream with the mock provider (invariant 8) — but modules still
    /// honor `job.dry_run` defensively.
    ///
    /// # Errors
    /// Returns `AppError::ProviderTransient`/`ProviderPermanent` on a
    /// provider-reported failure; never returns `Err` for a send that the
    /// provider itself accepted.
    async fn execute(&self, job: SendJob) -> Result<SendOutcome>;
}

/// Process-local registry mapping [`ModuleKind`] to its module
/// implementation, the same shape as the teacher's `Workers` struct holding
/// one handle per worker type, but for dispatch instead of lifecycle.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: Arc<DashMap<ModuleKind, Arc<dyn SendModule>>>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { modules: Arc::new(DashMap::new()) }
    }

    pub fn register(&self, module: Arc<dyn SendModule>) {
        self.modules.insert(module.kind(), module);
    }

    #[must_use]
    pub fn get(&self, kind: ModuleKind) -> Option<Arc<dyn SendModule>> {
        self.modules.get(&kind).map(|entry| Arc::clone(entry.value()))
    }
}

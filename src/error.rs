use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// The error taxonomy from §7. Names are descriptive of the observable kind,
/// not of the underlying transport — a reviewer reading a NAK/ack decision
/// or an HTTP status code should be able to match it back to one of these.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),
    #[error("Broker error: {0}")]
    Broker(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Authentication failed")]
    Auth,
    #[error("Not found")]
    NotFound,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Rate limit wait exceeded job timeout")]
    RateLimitTimeout,
    #[error("Provider transient failure: {0}")]
    ProviderTransient(String),
    #[error("Provider permanent failure: {0}")]
    ProviderPermanent(String),
    #[error("Storage transiently unavailable: {0}")]
    StorageTransient(String),
    #[error("Webhook signature invalid")]
    WebhookSignatureInvalid,
    #[error("Webhook event could not be matched to a recipient")]
    WebhookUnmatchable,
    #[error("Batch stuck and unrecoverable: {0}")]
    BatchStuck(String),
    #[error("Internal server error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            Self::Cache(e) => {
                tracing::warn!(error = %e, "Cache error (fail-open path should have absorbed this upstream)");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            Self::Broker(e) => {
                tracing::error!(error = %e, "Broker error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            Self::Validation(msg) => {
                tracing::debug!(message = %msg, "Validation failure");
                (StatusCode::BAD_REQUEST, msg)
            }
            Self::Auth => {
                tracing::debug!("Authentication failed");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            Self::NotFound => {
                tracing::debug!("Resource not found");
                (StatusCode::NOT_FOUND, "Not found".to_string())
            }
            Self::Conflict(msg) => {
                tracing::debug!(message = %msg, "Conflict");
                (StatusCode::CONFLICT, msg)
            }
            Self::RateLimitTimeout => {
                tracing::warn!("Rate limit acquisition timed out");
                (StatusCode::TOO_MANY_REQUESTS, "Rate limited".to_string())
            }
            Self::ProviderTransient(msg) => {
                tracing::warn!(message = %msg, "Provider transient failure");
                (StatusCode::BAD_GATEWAY, msg)
            }
            Self::ProviderPermanent(msg) => {
                tracing::info!(message = %msg, "Provider permanent failure");
                (StatusCode::UNPROCESSABLE_ENTITY, msg)
            }
            Self::StorageTransient(msg) => {
                tracing::warn!(message = %msg, "Storage transiently unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, msg)
            }
            Self::WebhookSignatureInvalid => {
                tracing::warn!("Webhook signature verification failed");
                (StatusCode::UNAUTHORIZED, "Invalid signature".to_string())
            }
            Self::WebhookUnmatchable => {
                tracing::debug!("Webhook event unmatchable, skipped");
                (StatusCode::OK, "skipped".to_string())
            }
            Self::BatchStuck(msg) => {
                tracing::error!(message = %msg, "Batch stuck and unrecoverable");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

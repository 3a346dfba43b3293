pub mod health;
pub mod webhooks;

use crate::adapters::broker::BrokerClient;
use crate::adapters::cache::CacheClient;
use crate::adapters::database::DbPool;
use crate::config::WebhookConfig;
use crate::services::ip_rate_limit::{parse_trusted_proxies, IpRateLimitService};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use opentelemetry::{global, KeyValue};
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::GovernorLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// State for the public webhook ingress router.
#[derive(Clone, Debug)]
pub struct AppState {
    pub broker: BrokerClient,
    pub webhook_config: WebhookConfig,
}

/// State for the internal health/readiness router, mirroring the
/// teacher's `MgmtState` shape.
#[derive(Clone, Debug)]
pub struct MgmtState {
    pub pool: DbPool,
    pub cache: CacheClient,
    pub broker: BrokerClient,
    pub health_check_timeout_ms: u64,
}

/// Builds the public-facing router: the webhook ingress, behind a
/// per-IP `GovernorLayer` so a flood of forged provider callbacks can't
/// starve the reconciliation pipeline (§4.G/§6).
#[must_use]
pub fn app_router(state: AppState, rate_limit: &IpRateLimitService) -> Router {
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(20)
            .burst_size(50)
            .key_extractor(rate_limit.extractor.clone())
            .finish()
            .expect("webhook ingress governor configuration is valid"),
    );

    Router::new()
        .route("/webhooks/{provider}", post(webhooks::receive))
        .layer(GovernorLayer { config: governor_conf })
        .layer(middleware::from_fn(log_rate_limit_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the internal management router: liveness/readiness only, never
/// exposed on the public listener.
#[must_use]
pub fn mgmt_router(state: MgmtState) -> Router {
    Router::new()
        .route("/livez", get(health::livez))
        .route("/readyz", get(health::readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Re-maps `tower_governor`'s `x-ratelimit-after` header onto the standard
/// `Retry-After` header and records a decision counter, the same shape as
/// the teacher's own rate-limit logging middleware.
async fn log_rate_limit_events(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;

    let meter = global::meter("outbound-core");
    let counter =
        meter.u64_counter("webhook_ingress_rate_limit_decisions_total").with_description("Rate limit decisions (allowed/throttled)").build();

    if response.status() == StatusCode::TOO_MANY_REQUESTS {
        counter.add(1, &[KeyValue::new("status", "throttled")]);

        let retry_after = if let Some(after) = response.headers().get("x-ratelimit-after") {
            let after = after.clone();
            response.headers_mut().insert("retry-after", after.clone());
            after.to_str().unwrap_or("?").to_string()
        } else {
            "unknown".to_string()
        };

        warn!("Webhook ingress rate limit exceeded (retry allowed after {}s)", retry_after);
    } else {
        counter.add(1, &[KeyValue::new("status", "allowed")]);
    }

    response
}

#[must_use]
pub fn trusted_proxies_from(raw: &str) -> Vec<ipnetwork::IpNetwork> {
    parse_trusted_proxies(raw)
}

use super::MgmtState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use opentelemetry::{global, KeyValue};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: checks connectivity to Postgres, Redis, and NATS.
pub async fn readyz(State(state): State<MgmtState>) -> impl IntoResponse {
    let check_timeout = Duration::from_millis(state.health_check_timeout_ms);
    let meter = global::meter("outbound-core");
    let histogram = meter.f64_histogram("health_check_duration_seconds").with_description("Duration of health checks").build();

    let db_check = async {
        let start = Instant::now();
        let res = match timeout(check_timeout, sqlx::query("SELECT 1").execute(&state.pool)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(format!("database connection failed: {e:?}")),
            Err(_) => Err("database connection timed out".to_string()),
        };
        histogram.record(start.elapsed().as_secs_f64(), &[KeyValue::new("component", "database")]);
        res
    };

    let cache_check = async {
        let start = Instant::now();
        let res = match timeout(check_timeout, state.cache.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("cache connection failed: {e}")),
            Err(_) => Err("cache connection timed out".to_string()),
        };
        histogram.record(start.elapsed().as_secs_f64(), &[KeyValue::new("component", "cache")]);
        res
    };

    let broker_check = async {
        let start = Instant::now();
        let res = match timeout(check_timeout, state.broker.client().rtt()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(format!("broker connection failed: {e}")),
            Err(_) => Err("broker connection timed out".to_string()),
        };
        histogram.record(start.elapsed().as_secs_f64(), &[KeyValue::new("component", "broker")]);
        res
    };

    let (db_res, cache_res, broker_res) = tokio::join!(db_check, cache_check, broker_check);

    let mut status_code = StatusCode::OK;
    let mut component_status = |res: Result<(), String>, component: &'static str| -> &'static str {
        if let Err(e) = res {
            tracing::warn!(error = %e, component, "readiness probe failed");
            status_code = StatusCode::SERVICE_UNAVAILABLE;
            "error"
        } else {
            "ok"
        }
    };

    let database = component_status(db_res, "database");
    let cache = component_status(cache_res, "cache");
    let broker = component_status(broker_res, "broker");

    (
        status_code,
        Json(json!({
            "status": if status_code == StatusCode::OK { "ok" } else { "error" },
            "database": database,
            "cache": cache,
            "broker": broker,
        })),
    )
}

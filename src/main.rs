#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use outbound_core::adapters::broker::BrokerClient;
use outbound_core::adapters::cache::CacheClient;
use outbound_core::adapters::database;
use outbound_core::api::{AppState, MgmtState};
use outbound_core::config::{Config, Role};
use outbound_core::AppBuilder;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    outbound_core::telemetry::init_telemetry(&config.telemetry)?;
    outbound_core::setup_panic_hook();

    let runs_api = matches!(config.role, Role::All | Role::Api);

    let boot_span = tracing::info_span!("boot_server");
    let (mgmt_listener, api_listener, mgmt_app, app_router, shutdown_tx, shutdown_rx, workers) = async {
        // Phase 1: Infrastructure Setup (Resources)
        let pool = database::init_pool(&config.database.database_url).await?;
        outbound_core::run_migrations(&pool).await?;

        let cache = CacheClient::connect(&config.cache.redis_url).await?;
        let broker = BrokerClient::connect(&config.broker).await?;
        outbound_core::ensure_streams(&broker).await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        outbound_core::spawn_signal_handler(shutdown_tx.clone());

        // Phase 2: Component Wiring (pure logic, no side effects beyond
        // the connections already established above)
        let app = AppBuilder::new(config.clone())
            .with_database(pool.clone())
            .with_cache(cache.clone())
            .with_broker(broker.clone())
            .initialize()
            .await?;

        // Phase 3: Runtime Setup (Listeners and Routers)
        let mgmt_state = MgmtState {
            pool: pool.clone(),
            cache: cache.clone(),
            broker: broker.clone(),
            health_check_timeout_ms: 2_000,
        };
        let mgmt_app = outbound_core::api::mgmt_router(mgmt_state);

        let mgmt_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.mgmt_port).parse()?;
        tracing::info!(address = %mgmt_addr, "management server listening");
        let mgmt_listener = tokio::net::TcpListener::bind(mgmt_addr).await?;

        let (api_listener, app_router) = if runs_api {
            let app_state = AppState { broker: broker.clone(), webhook_config: config.webhook.clone() };
            let router = outbound_core::api::app_router(app_state, &app.services.ip_rate_limit);
            let api_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
            tracing::info!(address = %api_addr, "listening");
            (Some(tokio::net::TcpListener::bind(api_addr).await?), Some(router))
        } else {
            (None, None)
        };

        Ok::<_, anyhow::Error>((
            mgmt_listener,
            api_listener,
            mgmt_app,
            app_router,
            shutdown_tx,
            shutdown_rx,
            app.workers,
        ))
    }
    .instrument(boot_span)
    .await?;

    // Phase 4: Start Runtime (Explicit Spawning and Listening)
    let worker_tasks = workers.spawn_all(shutdown_rx.clone());

    let mut mgmt_rx = shutdown_rx.clone();
    let mgmt_server = axum::serve(mgmt_listener, mgmt_app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = mgmt_rx.wait_for(|&s| s).await;
        });

    let result = if let (Some(api_listener), Some(app_router)) = (api_listener, app_router) {
        let mut api_rx = shutdown_rx.clone();
        let api_server = axum::serve(api_listener, app_router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                let _ = api_rx.wait_for(|&s| s).await;
            });
        tokio::try_join!(api_server, mgmt_server).map(|_| ())
    } else {
        mgmt_server.await
    };

    if let Err(error) = result {
        tracing::error!(%error, "server error");
    }

    // Phase 5: Graceful Shutdown Orchestration
    let _ = shutdown_tx.send(true);
    tokio::select! {
        () = async {
            futures::future::join_all(worker_tasks).await;
        } => {
            tracing::info!("background tasks finished");
        }
        () = tokio::time::sleep(std::time::Duration::from_secs(config.server.shutdown_timeout_secs)) => {
            tracing::warn!("timeout waiting for background tasks to finish");
        }
    }

    Ok(())
}

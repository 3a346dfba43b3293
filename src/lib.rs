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

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod telemetry;
pub mod workers;

use crate::adapters::broker::BrokerClient;
use crate::adapters::cache::leader_lease::LeaderLease;
use crate::adapters::cache::rate_limit::RateLimiter as RateLimitBackend;
use crate::adapters::cache::{CacheClient, HotStateStore};
use crate::adapters::database::DbPool;
use crate::adapters::modules::email::EmailModule;
use crate::adapters::modules::push::PushModule;
use crate::adapters::modules::sms::SmsModule;
use crate::adapters::modules::webhook::WebhookModule;
use crate::adapters::modules::ModuleRegistry;
use crate::config::{Config, Role};
use crate::services::dispatch::DispatchService;
use crate::services::event_logger::{EventLogger, EventLoggerHandle};
use crate::services::ip_rate_limit::IpRateLimitService;
use crate::services::leader_election::LeaderElection;
use crate::services::rate_limiter::RateLimiterService;
use crate::workers::{Archiver, Discoverer, Processor, Recovery, Scheduler, TenantWorkerPool, WebhookReconciler};
use std::sync::Arc;
use tokio::sync::watch;

/// The handles every role needs a live connection to, regardless of which
/// workers or routers it ends up running (§"Process topology").
#[derive(Clone, Debug)]
pub struct Resources {
    pub pool: DbPool,
    pub cache: CacheClient,
    pub broker: BrokerClient,
}

/// Stateless/cheaply-cloneable services shared between the HTTP routers and
/// the background workers.
#[derive(Clone, Debug)]
pub struct Services {
    pub hot_state: HotStateStore,
    pub rate_limiter: RateLimiterService,
    pub dispatch: DispatchService,
    pub event_logger: EventLoggerHandle,
    pub ip_rate_limit: IpRateLimitService,
}

#[derive(Debug)]
pub struct App {
    pub resources: Resources,
    pub services: Services,
    pub workers: Workers,
}

/// Background task set, built role-conditionally by [`AppBuilder::initialize`]
/// per SPEC_FULL.md's process topology: `Discoverer`/`Scheduler`/`Recovery`
/// are the leader-only singletons (gated by one shared [`LeaderElection`]
/// per process), while the per-tenant worker pool, webhook reconciler, and
/// orchestration processor scale horizontally across however many processes
/// run that role.
#[derive(Debug)]
pub struct Workers {
    event_logger: Option<EventLogger>,
    leader_election: Option<LeaderElection>,
    is_leader_rx: Option<watch::Receiver<bool>>,
    discoverer: Option<Discoverer>,
    processor: Option<Processor>,
    scheduler: Option<Scheduler>,
    recovery: Option<Recovery>,
    archiver: Option<Archiver>,
    tenant_pool: Option<TenantWorkerPool>,
    webhook_reconciler: Option<WebhookReconciler>,
}

impl Workers {
    /// Spawns every worker this process's role enabled and returns their
    /// join handles, mirroring the teacher's `Workers::spawn_all`
    /// generalized from a fixed set to a role-conditional one.
    #[must_use]
    pub fn spawn_all(self, shutdown_rx: watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut tasks = Vec::new();

        if let Some(event_logger) = self.event_logger {
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                event_logger.run(rx).await;
            }));
        }

        if let Some(leader_election) = self.leader_election {
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                leader_election.run(rx).await;
            }));
        }

        if let Some(discoverer) = self.discoverer {
            let rx = shutdown_rx.clone();
            let leader_rx = self.is_leader_rx.clone().expect("discoverer requires a leader election watch");
            tasks.push(tokio::spawn(async move {
                discoverer.run(rx, leader_rx).await;
            }));
        }

        if let Some(processor) = self.processor {
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                processor.run(rx).await;
            }));
        }

        if let Some(scheduler) = self.scheduler {
            let rx = shutdown_rx.clone();
            let leader_rx = self.is_leader_rx.clone().expect("scheduler requires a leader election watch");
            tasks.push(tokio::spawn(async move {
                scheduler.run(rx, leader_rx).await;
            }));
        }

        if let Some(recovery) = self.recovery {
            let rx = shutdown_rx.clone();
            let leader_rx = self.is_leader_rx.clone().expect("recovery requires a leader election watch");
            tasks.push(tokio::spawn(async move {
                recovery.run(rx, leader_rx).await;
            }));
        }

        if let Some(archiver) = self.archiver {
            let rx = shutdown_rx.clone();
            let leader_rx = self.is_leader_rx.clone().expect("archiver requires a leader election watch");
            tasks.push(tokio::spawn(async move {
                archiver.run(rx, leader_rx).await;
            }));
        }

        if let Some(tenant_pool) = self.tenant_pool {
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                tenant_pool.run(rx).await;
            }));
        }

        if let Some(webhook_reconciler) = self.webhook_reconciler {
            let rx = shutdown_rx;
            tasks.push(tokio::spawn(async move {
                webhook_reconciler.run(rx).await;
            }));
        }

        tasks
    }
}

/// Builder for constructing and wiring the application object graph,
/// generalized from the teacher's fixed single-role `AppBuilder` to one
/// that wires only the components `config.role` calls for.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    pool: Option<DbPool>,
    cache: Option<CacheClient>,
    broker: Option<BrokerClient>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config, pool: None, cache: None, broker: None }
    }

    #[must_use]
    pub fn with_database(mut self, pool: DbPool) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: CacheClient) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_broker(mut self, broker: BrokerClient) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Builds the application components by wiring all services, adapters,
    /// and the role-conditional set of workers.
    ///
    /// # Errors
    /// Returns an error if a mandatory resource (pool, cache, broker) was
    /// never supplied.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(self) -> anyhow::Result<App> {
        let pool = self.pool.ok_or_else(|| anyhow::anyhow!("database pool is required"))?;
        let cache = self.cache.ok_or_else(|| anyhow::anyhow!("cache client is required"))?;
        let broker = self.broker.ok_or_else(|| anyhow::anyhow!("broker client is required"))?;
        let config = self.config;

        let resources = Resources { pool: pool.clone(), cache: cache.clone(), broker: broker.clone() };

        let hot_state =
            HotStateStore::new(cache.clone(), config.worker.recipient_status_ttl_secs, config.worker.msgindex_ttl_secs);
        let rate_limit_backend = RateLimitBackend::new(cache.clone());
        let rate_limiter = RateLimiterService::new(rate_limit_backend, config.rate_limit.clone());

        let http_client = reqwest::Client::new();
        let registry = ModuleRegistry::new();
        registry.register(Arc::new(EmailModule::new(http_client.clone())));
        registry.register(Arc::new(SmsModule::new(http_client.clone())));
        registry.register(Arc::new(PushModule::new(http_client.clone())));
        registry.register(Arc::new(WebhookModule::new(http_client)));
        let dispatch = DispatchService::new(registry);

        let (event_logger, event_logger_handle) =
            EventLogger::new(pool.clone(), 200, std::time::Duration::from_secs(2));

        let ip_rate_limit = IpRateLimitService::new(crate::api::trusted_proxies_from(&config.server.trusted_proxies));

        let services = Services {
            hot_state: hot_state.clone(),
            rate_limiter: rate_limiter.clone(),
            dispatch: dispatch.clone(),
            event_logger: event_logger_handle.clone(),
            ip_rate_limit,
        };

        let needs_leader_election =
            matches!(config.role, Role::All | Role::Orchestrator | Role::Leader);
        let (leader_election, is_leader_rx) = if needs_leader_election {
            let lease = LeaderLease::new(cache.clone(), config.leader.lease_ttl_secs);
            let (election, rx) = LeaderElection::new(lease, config.leader.renew_interval_secs);
            (Some(election), Some(rx))
        } else {
            (None, None)
        };

        let (discoverer, processor) = if matches!(config.role, Role::All | Role::Orchestrator) {
            (
                Some(Discoverer::new(pool.clone(), broker.clone(), &config.orchestrator)),
                Some(Processor::new(
                    pool.clone(),
                    broker.clone(),
                    i64::try_from(config.worker.max_ack_pending).unwrap_or(i64::MAX),
                    i64::from(config.worker.max_deliver),
                    config.orchestrator.page_size,
                )),
            )
        } else {
            (None, None)
        };

        let (scheduler, recovery, archiver) = if matches!(config.role, Role::All | Role::Leader) {
            (
                Some(Scheduler::new(pool.clone(), &config.scheduler)),
                Some(Recovery::new(pool.clone(), broker.clone(), &config.recovery)),
                Some(Archiver::new(pool.clone(), &config.archiver)),
            )
        } else {
            (None, None, None)
        };

        let tenant_pool = if matches!(config.role, Role::All | Role::Worker) {
            Some(TenantWorkerPool::new(
                pool.clone(),
                broker.clone(),
                hot_state.clone(),
                rate_limiter.clone(),
                dispatch.clone(),
                event_logger_handle.clone(),
                config.worker.clone(),
            ))
        } else {
            None
        };

        let webhook_reconciler = if matches!(config.role, Role::All | Role::Worker) {
            Some(WebhookReconciler::new(
                pool,
                broker,
                hot_state,
                event_logger_handle,
                config.webhook.clone(),
                i64::try_from(config.worker.max_ack_pending).unwrap_or(i64::MAX),
                i64::from(config.worker.max_deliver),
            ))
        } else {
            None
        };

        // Event logging is only needed wherever a worker actually produces
        // events; every non-API role does.
        let event_logger = if matches!(config.role, Role::All | Role::Worker | Role::Orchestrator | Role::Leader) {
            Some(event_logger)
        } else {
            None
        };

        let workers = Workers {
            event_logger,
            leader_election,
            is_leader_rx,
            discoverer,
            processor,
            scheduler,
            recovery,
            archiver,
            tenant_pool,
            webhook_reconciler,
        };

        Ok(App { resources, services, workers })
    }
}

/// Runs database migrations.
///
/// # Errors
/// Returns an error if migrations fail.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!().run(pool).await.map_err(Into::into)
}

/// Idempotently provisions the `ORCHESTRATION`/`JOBS`/`WEBHOOKS` streams.
/// Every role calls this on boot; `get_or_create_stream` makes repeated
/// calls from many processes harmless.
///
/// # Errors
/// Returns an error if stream provisioning fails.
#[tracing::instrument(skip(broker))]
pub async fn ensure_streams(broker: &BrokerClient) -> anyhow::Result<()> {
    broker.ensure_streams().await.map_err(Into::into)
}

/// Sets up a panic hook that logs the panic message and location instead of
/// writing to stderr.
pub fn setup_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let msg = payload
            .downcast_ref::<&str>()
            .map_or_else(|| payload.downcast_ref::<String>().map_or_else(|| "Box<Any>", String::as_str), |s| *s);

        let location = panic_info.location().map_or_else(
            || "unknown".to_string(),
            |location| format!("{}:{}:{}", location.file(), location.line(), location.column()),
        );

        tracing::error!(
            panic.message = %msg,
            panic.location = %location,
            "Application panicked"
        );
    }));
}

/// Returns a future that completes when a termination signal is received.
///
/// # Panics
/// Panics if the signal handlers cannot be installed.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}

/// Spawns a task that listens for OS signals and broadcasts a shutdown signal.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });
}

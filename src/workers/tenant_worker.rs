use crate::adapters::broker::BrokerClient;
use crate::adapters::cache::HotStateStore;
use crate::adapters::database::batch_repo::BatchRepository;
use crate::adapters::database::message_index_repo::MessageIndexRepository;
use crate::adapters::database::recipient_repo::RecipientRepository;
use crate::adapters::database::DbPool;
use crate::config::WorkerConfig;
use crate::domain::{BatchCounters, EventRecord, EventType, MessageIndexEntry, Recipient, RecipientStatus, SendConfigSnapshot};
use crate::services::dispatch::DispatchService;
use crate::services::event_logger::EventLoggerHandle;
use crate::services::rate_limiter::RateLimiterService;
use async_nats::jetstream::AckKind;
use futures::StreamExt;
use opentelemetry::{global, metrics::Counter, KeyValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::Instrument;
use uuid::Uuid;

/// Wire shape of a single per-recipient job (§4.D step 2), the payload the
/// orchestrator's processor stage publishes onto `jobs.user.{userId}.send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendJobPayload {
    pub recipient_id: Uuid,
    pub batch_id: Uuid,
    pub user_id: Uuid,
    pub send_config: SendConfigSnapshot,
    pub batch_payload: serde_json::Value,
    pub dry_run: bool,
}

#[derive(Clone, Debug)]
struct Metrics {
    sent: Counter<u64>,
    failed: Counter<u64>,
    rate_limited: Counter<u64>,
    duplicate: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("outbound-core");
        Self {
            sent: meter.u64_counter("recipient_sent_total").build(),
            failed: meter.u64_counter("recipient_failed_total").build(),
            rate_limited: meter.u64_counter("recipient_rate_limit_timeout_total").build(),
            duplicate: meter.u64_counter("recipient_duplicate_job_total").build(),
        }
    }
}

/// Processes one tenant's send jobs (§4.D): idempotency gate, rate-limit
/// acquisition, module dispatch, and the atomic outcome write, bounded by a
/// semaphore the same way the teacher's push worker bounds concurrent
/// dispatch.
#[derive(Debug)]
pub struct TenantWorker {
    user_id: Uuid,
    pool: DbPool,
    broker: BrokerClient,
    hot_state: HotStateStore,
    recipient_repo: RecipientRepository,
    batch_repo: BatchRepository,
    message_index_repo: MessageIndexRepository,
    rate_limiter: RateLimiterService,
    dispatch: DispatchService,
    event_logger: EventLoggerHandle,
    config: WorkerConfig,
    semaphore: Arc<Semaphore>,
    metrics: Metrics,
}

impl TenantWorker {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        pool: DbPool,
        broker: BrokerClient,
        hot_state: HotStateStore,
        rate_limiter: RateLimiterService,
        dispatch: DispatchService,
        event_logger: EventLoggerHandle,
        config: WorkerConfig,
        concurrency: usize,
    ) -> Self {
        Self {
            user_id,
            pool,
            broker,
            hot_state,
            recipient_repo: RecipientRepository::new(),
            batch_repo: BatchRepository::new(),
            message_index_repo: MessageIndexRepository::new(),
            rate_limiter,
            dispatch,
            event_logger,
            config,
            semaphore: Arc::new(Semaphore::new(concurrency)),
            metrics: Metrics::new(),
        }
    }

    #[tracing::instrument(level = "info", skip(self, shutdown), fields(user_id = %self.user_id))]
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let consumer = match self
            .broker
            .tenant_job_consumer(
                self.user_id,
                i64::try_from(self.config.max_ack_pending).unwrap_or(i64::MAX),
                i64::from(self.config.max_deliver),
                self.config.tenant_consumer_idle_secs,
            )
            .await
        {
            Ok(consumer) => consumer,
            Err(error) => {
                tracing::error!(%error, "failed to create tenant job consumer, worker exiting");
                return;
            }
        };

        let mut messages = match consumer.messages().await {
            Ok(messages) => messages,
            Err(error) => {
                tracing::error!(%error, "failed to open consumer message stream, worker exiting");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("tenant worker shutting down");
                    return;
                }
                next = messages.next() => {
                    let Some(message) = next else {
                        tracing::warn!("tenant job consumer stream ended, worker exiting");
                        return;
                    };
                    let message = match message {
                        Ok(message) => message,
                        Err(error) => {
                            tracing::error!(%error, "error pulling from tenant job consumer");
                            continue;
                        }
                    };

                    let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else { return };
                    let worker = Arc::clone(&self);
                    tokio::spawn(
                        async move {
                            let _permit = permit;
                            worker.handle_message(message).await;
                        }
                        .instrument(tracing::debug_span!("dispatch_job")),
                    );
                }
            }
        }
    }

    async fn handle_message(&self, message: async_nats::jetstream::Message) {
        let payload: SendJobPayload = match serde_json::from_slice(&message.payload) {
            Ok(payload) => payload,
            Err(error) => {
                tracing::error!(%error, "malformed job payload, dropping (cannot retry a parse error)");
                let _ = message.ack().await;
                return;
            }
        };

        match self.process(&payload).await {
            Outcome::Acked => {
                let _ = message.ack().await;
            }
            Outcome::Retry => {
                let _ = message.ack_with(AckKind::Nak(Some(Duration::from_millis(500)))).await;
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self, payload), fields(recipient_id = %payload.recipient_id))]
    async fn process(&self, payload: &SendJobPayload) -> Outcome {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(error) => {
                tracing::error!(%error, "database unavailable, retrying job");
                return Outcome::Retry;
            }
        };

        let recipient = match self.recipient_repo.find_by_id(&mut conn, payload.recipient_id).await {
            Ok(Some(recipient)) => recipient,
            Ok(None) => {
                tracing::warn!("recipient not found, dropping job");
                return Outcome::Acked;
            }
            Err(error) => {
                tracing::error!(%error, "failed to load recipient, retrying job");
                return Outcome::Retry;
            }
        };

        // Anything past `queued` means this recipient already went through
        // dispatch once — a redelivered job finding it `sent` (successful
        // send, unacked before the crash/redelivery) must not dispatch a
        // second real provider call (invariant 3, §1's at-most-once-call
        // contract), not just the terminal statuses.
        if !matches!(recipient.status, RecipientStatus::Pending | RecipientStatus::Queued) {
            self.metrics.duplicate.add(1, &[]);
            tracing::debug!(status = ?recipient.status, "recipient already past queued, skipping duplicate job");
            return Outcome::Acked;
        }

        // `record_send_outcome` guards on `status = 'queued'`, so a fresh
        // job must claim the recipient first; a redelivered job (still
        // `queued` from a prior attempt that crashed before acking) skips
        // straight to dispatch.
        if recipient.status == RecipientStatus::Pending {
            match self.recipient_repo.claim_for_send(&mut conn, payload.recipient_id).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!("recipient claimed by another delivery, skipping duplicate job");
                    return Outcome::Acked;
                }
                Err(error) => {
                    tracing::error!(%error, "failed to claim recipient for send, retrying job");
                    return Outcome::Retry;
                }
            }
        }

        if let Err(error) = self.rate_limiter.acquire(payload.recipient_id, &payload.send_config).await {
            self.metrics.rate_limited.add(1, &[]);
            tracing::debug!(%error, "rate limit not acquired within timeout, will retry");
            return Outcome::Retry;
        }

        let outcome = match self.dispatch.send(&recipient, &payload.send_config, &payload.batch_payload, payload.dry_run).await
        {
            Ok(outcome) => outcome,
            Err(error) => {
                tracing::warn!(%error, "transient dispatch failure, will retry");
                return Outcome::Retry;
            }
        };

        match self.record_outcome(payload, &recipient, &outcome).await {
            Ok(()) => Outcome::Acked,
            Err(error) => {
                tracing::error!(%error, "failed to commit send outcome, retrying job");
                Outcome::Retry
            }
        }
    }

    /// §4.D step 6: the recipient status update, message-index write, and
    /// batch counter increment commit atomically in one transaction — a
    /// partial write here (e.g. the recipient lands `sent` but the counter
    /// never increments) would leave the batch unable to ever saturate to
    /// `completed`. Returning `Err` tells `process` to NAK so the whole
    /// outcome is retried from scratch rather than silently dropped; the
    /// `WHERE status = 'queued'` guard inside `record_send_outcome` makes
    /// that retry idempotent. Cache writes, the event log, and the
    /// completion check run after commit as best-effort side effects, same
    /// as the webhook reconciler's `reconcile`.
    async fn record_outcome(
        &self,
        payload: &SendJobPayload,
        recipient: &Recipient,
        outcome: &crate::adapters::modules::SendOutcome,
    ) -> crate::error::Result<()> {
        let mut terminal = recipient.clone();
        let event_type;
        let mut deltas = BatchCounters::default();

        if outcome.succeeded {
            terminal.status = RecipientStatus::Sent;
            terminal.provider_message_id = outcome.provider_message_id.clone();
            deltas.sent = 1;
            event_type = EventType::Sent;
        } else {
            terminal.status = RecipientStatus::Failed;
            deltas.failed = 1;
            event_type = EventType::Failed;
        }

        let mut tx = self.pool.begin().await?;

        let transitioned = self
            .recipient_repo
            .record_send_outcome(&mut *tx, recipient.id, &terminal, outcome.error_message.as_deref())
            .await?;

        if transitioned {
            if let (true, Some(provider_message_id)) = (outcome.succeeded, &outcome.provider_message_id) {
                let entry = MessageIndexEntry { recipient_id: recipient.id, batch_id: payload.batch_id, user_id: payload.user_id };
                self.message_index_repo.insert(&mut *tx, &entry, provider_message_id).await?;
            }
            self.batch_repo.apply_send_outcome(&mut *tx, payload.batch_id, deltas.sent, deltas.failed).await?;
        }

        tx.commit().await?;

        if !transitioned {
            tracing::debug!(status = ?recipient.status, "send outcome redelivered after recipient already left queued, skipping counters");
            return Ok(());
        }

        if outcome.succeeded {
            self.metrics.sent.add(1, &[KeyValue::new("module", payload.send_config.module.as_str())]);
        } else {
            self.metrics.failed.add(1, &[KeyValue::new("module", payload.send_config.module.as_str())]);
        }

        let _ = self.hot_state.set_recipient_status(payload.batch_id, recipient.id, terminal.status).await;
        if let (true, Some(provider_message_id)) = (outcome.succeeded, &outcome.provider_message_id) {
            let entry = MessageIndexEntry { recipient_id: recipient.id, batch_id: payload.batch_id, user_id: payload.user_id };
            let _ = self.hot_state.set_message_index(entry, provider_message_id).await;
        }
        let _ = self.hot_state.incr_counters(payload.batch_id, deltas).await;

        self.event_logger.log(EventRecord {
            event_type,
            batch_id: payload.batch_id,
            recipient_id: Some(recipient.id),
            user_id: payload.user_id,
            provider_message_id: terminal.provider_message_id.clone(),
            timestamp: time::OffsetDateTime::now_utc(),
            metadata: serde_json::Value::Null,
            error_message: outcome.error_message.clone(),
        });

        let mut conn = self.pool.acquire().await?;
        match self.batch_repo.try_complete(&mut conn, payload.batch_id).await {
            Ok(true) => {
                self.event_logger.log(EventRecord {
                    event_type: EventType::BatchCompleted,
                    batch_id: payload.batch_id,
                    recipient_id: None,
                    user_id: payload.user_id,
                    provider_message_id: None,
                    timestamp: time::OffsetDateTime::now_utc(),
                    metadata: serde_json::Value::Null,
                    error_message: None,
                });
            }
            Ok(false) => {}
            Err(error) => tracing::error!(%error, "failed to check/apply batch completion"),
        }

        Ok(())
    }
}

enum Outcome {
    Acked,
    Retry,
}

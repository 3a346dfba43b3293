use crate::adapters::broker::BrokerClient;
use crate::adapters::database::batch_repo::BatchRepository;
use crate::adapters::database::recipient_repo::RecipientRepository;
use crate::adapters::database::send_config_repo::SendConfigRepository;
use crate::adapters::database::DbPool;
use crate::config::OrchestratorConfig;
use crate::workers::tenant_worker::SendJobPayload;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::watch;
use uuid::Uuid;

/// Leader-gated discoverer half of §4.E: polls `batches` for rows stuck at
/// `queued` and republishes them onto the orchestration stream so the
/// processor (any replica) picks them up. A batch that's already queued on
/// the stream but not yet `processing` is simply republished — JetStream's
/// `Nats-Msg-Id` dedup on the batch id absorbs the redundant publish.
#[derive(Debug, Clone)]
pub struct Discoverer {
    pool: DbPool,
    broker: BrokerClient,
    batch_repo: BatchRepository,
    poll_interval: std::time::Duration,
}

impl Discoverer {
    #[must_use]
    pub fn new(pool: DbPool, broker: BrokerClient, config: &OrchestratorConfig) -> Self {
        Self {
            pool,
            broker,
            batch_repo: BatchRepository::new(),
            poll_interval: std::time::Duration::from_secs(config.discoverer_poll_interval_secs),
        }
    }

    /// Runs only while `is_leader` reports `true` (§4.I); on every tick it
    /// re-checks leadership rather than latching it once, so a lease loss
    /// mid-run stops publishing within one tick.
    #[tracing::instrument(level = "info", skip_all, name = "discoverer")]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>, mut is_leader: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => {
                    if !*is_leader.borrow() {
                        continue;
                    }
                    if let Err(error) = self.discover_once().await {
                        tracing::error!(%error, "discoverer pass failed");
                    }
                }
                _ = is_leader.changed() => {}
            }
        }
    }

    async fn discover_once(&self) -> crate::error::Result<()> {
        let mut conn = self.pool.acquire().await.map_err(crate::error::AppError::Database)?;
        let queued = self.batch_repo.list_queued(&mut conn).await?;
        drop(conn);

        for (batch_id, _user_id) in queued {
            let payload = Bytes::from(serde_json::to_vec(&batch_id).unwrap_or_default());
            if let Err(error) = self.broker.publish_orchestration(batch_id, payload).await {
                tracing::error!(%error, %batch_id, "failed to publish batch onto orchestration stream");
            }
        }
        Ok(())
    }
}

/// Processor half of §4.E: any replica consumes the orchestration stream,
/// claims `queued -> processing`, pages the batch's recipients, and fans
/// them out as per-recipient jobs onto the tenant's subject (§4.D).
#[derive(Debug, Clone)]
pub struct Processor {
    pool: DbPool,
    broker: BrokerClient,
    batch_repo: BatchRepository,
    recipient_repo: RecipientRepository,
    send_config_repo: SendConfigRepository,
    max_ack_pending: i64,
    max_deliver: i64,
    page_size: i64,
}

impl Processor {
    #[must_use]
    pub fn new(pool: DbPool, broker: BrokerClient, max_ack_pending: i64, max_deliver: i64, page_size: i64) -> Self {
        Self {
            pool,
            broker,
            batch_repo: BatchRepository::new(),
            recipient_repo: RecipientRepository::new(),
            send_config_repo: SendConfigRepository::new(),
            max_ack_pending,
            max_deliver,
            page_size,
        }
    }

    #[tracing::instrument(level = "info", skip_all, name = "orchestration_processor")]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let consumer = match self.broker.orchestration_consumer(self.max_ack_pending, self.max_deliver).await {
            Ok(consumer) => consumer,
            Err(error) => {
                tracing::error!(%error, "failed to create orchestration consumer, processor exiting");
                return;
            }
        };
        let mut messages = match consumer.messages().await {
            Ok(messages) => messages,
            Err(error) => {
                tracing::error!(%error, "failed to open orchestration consumer stream, processor exiting");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                next = messages.next() => {
                    let Some(message) = next else { return };
                    match message {
                        Ok(message) => {
                            let Ok(batch_id) = serde_json::from_slice::<Uuid>(&message.payload) else {
                                tracing::error!("malformed orchestration message, dropping");
                                let _ = message.ack().await;
                                continue;
                            };
                            if self.process_batch(batch_id).await {
                                let _ = message.ack().await;
                            } else {
                                let _ = message.ack_with(async_nats::jetstream::AckKind::Nak(None)).await;
                            }
                        }
                        Err(error) => tracing::error!(%error, "error pulling from orchestration consumer"),
                    }
                }
            }
        }
    }

    /// Returns `true` if the message should be acked (work is done or
    /// already handled by another replica), `false` to retry.
    async fn process_batch(&self, batch_id: Uuid) -> bool {
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(error) => {
                tracing::error!(%error, "database unavailable, retrying orchestration message");
                return false;
            }
        };

        let Ok(Some(batch)) = self.batch_repo.find_by_id(&mut conn, batch_id).await else {
            tracing::warn!(%batch_id, "batch not found, dropping orchestration message");
            return true;
        };

        if batch.status != crate::domain::BatchStatus::Queued {
            // Already claimed (or past processing) by another replica.
            return true;
        }
        match self.batch_repo.begin_processing(&mut conn, batch_id).await {
            Ok(true) => {}
            Ok(false) => return true,
            Err(error) => {
                tracing::error!(%error, %batch_id, "failed to begin processing");
                return false;
            }
        }

        let Ok(Some(send_config)) = self.send_config_repo.find_by_id(&mut conn, batch.send_config_id).await else {
            tracing::error!(%batch_id, "send config missing or inactive, failing batch");
            let _ = self
                .batch_repo
                .transition(&mut conn, batch_id, crate::domain::BatchStatus::Processing, crate::domain::BatchStatus::Failed)
                .await;
            return true;
        };
        let snapshot = send_config.snapshot();

        let mut cursor = None;
        loop {
            // Between pages, re-read the batch's status: a pause or cancel
            // issued mid-pagination must stop further enqueuing without
            // failing the message (§5 "Cancellation & timeouts").
            match self.batch_repo.find_by_id(&mut conn, batch_id).await {
                Ok(Some(current)) if current.status == crate::domain::BatchStatus::Paused
                    || current.status == crate::domain::BatchStatus::Cancelled =>
                {
                    tracing::info!(%batch_id, status = ?current.status, "batch paused or cancelled mid-pagination, stopping");
                    return true;
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::error!(%error, %batch_id, "failed to re-check batch status between pages");
                    return false;
                }
            }

            let page = match self.recipient_repo.page(&mut conn, batch_id, cursor, self.page_size).await {
                Ok(page) => page,
                Err(error) => {
                    tracing::error!(%error, %batch_id, "failed to page recipients");
                    return false;
                }
            };
            if page.is_empty() {
                break;
            }
            cursor = page.last().map(|r| r.id);

            for recipient in &page {
                if recipient.status != crate::domain::RecipientStatus::Pending {
                    continue;
                }
                let job = SendJobPayload {
                    recipient_id: recipient.id,
                    batch_id,
                    user_id: batch.user_id,
                    send_config: snapshot.clone(),
                    batch_payload: batch.payload.clone(),
                    dry_run: batch.dry_run,
                };
                let Ok(payload) = serde_json::to_vec(&job) else {
                    tracing::error!(recipient_id = %recipient.id, "failed to serialize job payload");
                    continue;
                };
                if let Err(error) =
                    self.broker.publish_job(batch.user_id, &recipient.id.to_string(), Bytes::from(payload)).await
                {
                    tracing::error!(%error, recipient_id = %recipient.id, "failed to publish send job");
                }
            }
        }

        true
    }
}

use crate::adapters::broker::BrokerClient;
use crate::adapters::database::batch_repo::BatchRepository;
use crate::adapters::database::DbPool;
use crate::config::RecoveryConfig;
use bytes::Bytes;
use tokio::sync::watch;

/// Stuck-batch recovery scan (§4.E): any `processing` batch whose counters
/// haven't moved in `threshold_ms` gets a recovery attempt recorded and is
/// re-enqueued onto the orchestration stream so a processor picks it back
/// up; once `max_retries` is exceeded the batch is failed outright rather
/// than retried forever. Leader-gated for the same reason the scheduler is —
/// the write itself is idempotent, but there's no need for every replica to
/// scan.
#[derive(Debug, Clone)]
pub struct Recovery {
    pool: DbPool,
    broker: BrokerClient,
    batch_repo: BatchRepository,
    interval: std::time::Duration,
    threshold: std::time::Duration,
    max_per_scan: i64,
    max_retries: u32,
}

impl Recovery {
    #[must_use]
    pub fn new(pool: DbPool, broker: BrokerClient, config: &RecoveryConfig) -> Self {
        Self {
            pool,
            broker,
            batch_repo: BatchRepository::new(),
            interval: std::time::Duration::from_millis(config.interval_ms),
            threshold: std::time::Duration::from_millis(config.threshold_ms),
            max_per_scan: config.max_per_scan,
            max_retries: config.max_retries,
        }
    }

    #[tracing::instrument(level = "info", skip_all, name = "recovery")]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>, mut is_leader: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => {
                    if !*is_leader.borrow() {
                        continue;
                    }
                    if let Err(error) = self.scan_once().await {
                        tracing::error!(%error, "recovery scan failed");
                    }
                }
                _ = is_leader.changed() => {}
            }
        }
    }

    async fn scan_once(&self) -> crate::error::Result<()> {
        let mut conn = self.pool.acquire().await.map_err(crate::error::AppError::Database)?;
        let threshold_at = time::OffsetDateTime::now_utc() - self.threshold;
        let stuck = self.batch_repo.list_stuck(&mut conn, threshold_at, self.max_per_scan).await?;

        for batch_id in stuck {
            match self.batch_repo.record_recovery_attempt(&mut conn, batch_id, self.max_retries).await {
                Ok(failed) => {
                    if failed {
                        tracing::warn!(%batch_id, "batch exceeded max recovery attempts, marked failed");
                        continue;
                    }
                    tracing::info!(%batch_id, "recorded a recovery attempt on stuck batch, re-enqueuing orchestration");
                    let payload = Bytes::from(serde_json::to_vec(&batch_id).unwrap_or_default());
                    if let Err(error) = self.broker.publish_orchestration(batch_id, payload).await {
                        tracing::error!(%error, %batch_id, "failed to re-publish stuck batch onto orchestration stream");
                    }
                }
                Err(error) => tracing::error!(%error, %batch_id, "failed to record recovery attempt"),
            }
        }
        Ok(())
    }
}

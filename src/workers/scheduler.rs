use crate::adapters::database::batch_repo::BatchRepository;
use crate::adapters::database::DbPool;
use crate::config::SchedulerConfig;
use crate::domain::BatchStatus;
use tokio::sync::watch;

/// Leader-gated `scheduled -> queued` promotion (§4.F): polls for batches
/// whose `scheduled_at` has passed and flips them onto the discoverer's
/// path. Runs on the same "re-check leadership every tick" posture as the
/// discoverer rather than latching a leadership snapshot.
#[derive(Debug, Clone)]
pub struct Scheduler {
    pool: DbPool,
    batch_repo: BatchRepository,
    interval: std::time::Duration,
    batch_limit: i64,
}

impl Scheduler {
    #[must_use]
    pub fn new(pool: DbPool, config: &SchedulerConfig) -> Self {
        Self {
            pool,
            batch_repo: BatchRepository::new(),
            interval: std::time::Duration::from_secs(config.interval_secs),
            batch_limit: config.batch_limit,
        }
    }

    #[tracing::instrument(level = "info", skip_all, name = "scheduler")]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>, mut is_leader: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => {
                    if !*is_leader.borrow() {
                        continue;
                    }
                    if let Err(error) = self.promote_due_batches().await {
                        tracing::error!(%error, "scheduler pass failed");
                    }
                }
                _ = is_leader.changed() => {}
            }
        }
    }

    async fn promote_due_batches(&self) -> crate::error::Result<()> {
        let mut conn = self.pool.acquire().await.map_err(crate::error::AppError::Database)?;
        let now = time::OffsetDateTime::now_utc();
        let due = self.batch_repo.list_scheduled_due(&mut conn, now, self.batch_limit).await?;

        for batch_id in due {
            match self.batch_repo.mark_queued_from(&mut conn, batch_id, BatchStatus::Scheduled).await {
                Ok(true) => tracing::info!(%batch_id, "promoted scheduled batch to queued"),
                Ok(false) => {}
                Err(error) => tracing::error!(%error, %batch_id, "failed to promote scheduled batch"),
            }
        }
        Ok(())
    }
}

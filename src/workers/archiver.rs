use crate::adapters::database::event_record_repo::EventRecordRepository;
use crate::adapters::database::message_index_repo::MessageIndexRepository;
use crate::adapters::database::DbPool;
use crate::config::ArchiverConfig;
use tokio::sync::watch;

/// Leader-gated analytics-archiver (§4.I, §3 "Ownership & lifecycle"):
/// purges `event_records` and `message_index` rows that have aged past
/// their configured retention window. Same "re-check leadership every
/// tick" posture as [`super::scheduler::Scheduler`] and
/// [`super::recovery::Recovery`] — the deletes themselves are unconditional
/// and idempotent, so a lease handoff mid-sweep is harmless.
#[derive(Debug, Clone)]
pub struct Archiver {
    pool: DbPool,
    event_record_repo: EventRecordRepository,
    message_index_repo: MessageIndexRepository,
    interval: std::time::Duration,
    event_record_retention: time::Duration,
    message_index_retention: time::Duration,
    batch_limit: i64,
}

impl Archiver {
    #[must_use]
    pub fn new(pool: DbPool, config: &ArchiverConfig) -> Self {
        Self {
            pool,
            event_record_repo: EventRecordRepository::new(),
            message_index_repo: MessageIndexRepository::new(),
            interval: std::time::Duration::from_secs(config.interval_secs),
            event_record_retention: time::Duration::days(i64::from(config.event_record_retention_days)),
            message_index_retention: time::Duration::hours(i64::from(config.message_index_retention_hours)),
            batch_limit: config.batch_limit,
        }
    }

    #[tracing::instrument(level = "info", skip_all, name = "archiver")]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>, mut is_leader: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => {
                    if !*is_leader.borrow() {
                        continue;
                    }
                    if let Err(error) = self.sweep_once().await {
                        tracing::error!(%error, "archiver sweep failed");
                    }
                }
                _ = is_leader.changed() => {}
            }
        }
    }

    async fn sweep_once(&self) -> crate::error::Result<()> {
        let mut conn = self.pool.acquire().await.map_err(crate::error::AppError::Database)?;
        let now = time::OffsetDateTime::now_utc();

        let event_cutoff = now - self.event_record_retention;
        let deleted_events =
            self.event_record_repo.delete_older_than(&mut conn, event_cutoff, self.batch_limit).await?;
        if deleted_events > 0 {
            tracing::info!(deleted = deleted_events, cutoff = %event_cutoff, "archived stale event records");
        }

        let msgindex_cutoff = now - self.message_index_retention;
        let deleted_entries =
            self.message_index_repo.delete_older_than(&mut conn, msgindex_cutoff, self.batch_limit).await?;
        if deleted_entries > 0 {
            tracing::info!(deleted = deleted_entries, cutoff = %msgindex_cutoff, "archived stale message index entries");
        }

        Ok(())
    }
}

use crate::adapters::database::event_record_repo::EventRecordRepository;
use crate::adapters::database::DbPool;
use crate::domain::EventRecord;
use tokio::sync::mpsc;
use tokio::sync::watch;

/// Buffered append-only event writer (§9 "buffered-logger"): callers push
/// events onto an unbounded channel and return immediately; a background
/// task drains it in size- or time-bounded batches via `UNNEST`, the same
/// amortized-write shape the teacher's audit log takes.
#[derive(Debug, Clone)]
pub struct EventLoggerHandle {
    sender: mpsc::UnboundedSender<EventRecord>,
}

impl EventLoggerHandle {
    pub fn log(&self, event: EventRecord) {
        if self.sender.send(event).is_err() {
            tracing::error!("event logger channel closed, dropping event");
        }
    }
}

#[derive(Debug)]
pub struct EventLogger {
    pool: DbPool,
    repo: EventRecordRepository,
    receiver: mpsc::UnboundedReceiver<EventRecord>,
    flush_size: usize,
    flush_interval: std::time::Duration,
}

impl EventLogger {
    #[must_use]
    pub fn new(pool: DbPool, flush_size: usize, flush_interval: std::time::Duration) -> (Self, EventLoggerHandle) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { pool, repo: EventRecordRepository::new(), receiver, flush_size, flush_interval }, EventLoggerHandle { sender })
    }

    /// Drains the channel, flushing whenever `flush_size` events have
    /// accumulated or `flush_interval` elapses, and once more on shutdown
    /// so no buffered event is silently lost.
    #[tracing::instrument(level = "info", skip_all, name = "event_logger")]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut buffer = Vec::with_capacity(self.flush_size);
        let mut ticker = tokio::time::interval(self.flush_interval);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    self.flush(&mut buffer).await;
                    return;
                }
                _ = ticker.tick() => {
                    self.flush(&mut buffer).await;
                }
                event = self.receiver.recv() => {
                    match event {
                        Some(event) => {
                            buffer.push(event);
                            if buffer.len() >= self.flush_size {
                                self.flush(&mut buffer).await;
                            }
                        }
                        None => {
                            self.flush(&mut buffer).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn flush(&self, buffer: &mut Vec<EventRecord>) {
        if buffer.is_empty() {
            return;
        }
        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(error) => {
                tracing::error!(%error, "failed to acquire connection to flush event log, events will be lost");
                buffer.clear();
                return;
            }
        };
        match self.repo.insert_many(&mut conn, buffer).await {
            Ok(count) => tracing::debug!(count, "flushed event log"),
            Err(error) => tracing::error!(%error, "failed to flush event log"),
        }
        buffer.clear();
    }
}

use crate::adapters::broker::BrokerClient;
use crate::adapters::cache::HotStateStore;
use crate::adapters::database::batch_repo::BatchRepository;
use crate::adapters::database::message_index_repo::MessageIndexRepository;
use crate::adapters::database::recipient_repo::RecipientRepository;
use crate::adapters::database::DbPool;
use crate::config::WebhookConfig;
use crate::domain::{BatchCounters, EventRecord, EventType, RecipientStatus, WebhookEvent, WebhookEventType};
use crate::services::event_logger::EventLoggerHandle;
use async_nats::jetstream::AckKind;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::watch;

/// Maps an inbound webhook's event type onto the recipient-status edge it
/// drives, if any (§4.H step 3). `Failed` redirects a `sent` recipient to
/// `failed` (the provider gave up after accepting the send). `Opened`/
/// `Clicked`/`SoftBounced` have no corresponding edge in
/// [`RecipientStatus::can_transition_to`] — they're recorded as events only,
/// never applied to recipient status.
const fn transition_for(event_type: WebhookEventType) -> Option<RecipientStatus> {
    match event_type {
        WebhookEventType::Delivered => Some(RecipientStatus::Delivered),
        WebhookEventType::Bounced => Some(RecipientStatus::Bounced),
        WebhookEventType::Complained => Some(RecipientStatus::Complained),
        WebhookEventType::Failed => Some(RecipientStatus::Failed),
        WebhookEventType::Opened | WebhookEventType::Clicked | WebhookEventType::SoftBounced => None,
    }
}

const fn event_type_for(webhook_event_type: WebhookEventType) -> EventType {
    match webhook_event_type {
        WebhookEventType::Delivered => EventType::Delivered,
        WebhookEventType::Bounced => EventType::Bounced,
        WebhookEventType::Complained => EventType::Complained,
        WebhookEventType::Opened => EventType::Opened,
        WebhookEventType::Clicked => EventType::Clicked,
        WebhookEventType::Failed => EventType::Failed,
        WebhookEventType::SoftBounced => EventType::SoftBounced,
    }
}

/// Consumes the webhook stream and applies §4.H's reconciliation algorithm:
/// dedup, resolve `providerMessageId -> recipient`, apply the status
/// transition, aggregate the batch counter delta, and check for batch
/// completion.
#[derive(Debug, Clone)]
pub struct WebhookReconciler {
    pool: DbPool,
    broker: BrokerClient,
    hot_state: HotStateStore,
    recipient_repo: RecipientRepository,
    batch_repo: BatchRepository,
    message_index_repo: MessageIndexRepository,
    event_logger: EventLoggerHandle,
    config: WebhookConfig,
    max_ack_pending: i64,
    max_deliver: i64,
}

impl WebhookReconciler {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: DbPool,
        broker: BrokerClient,
        hot_state: HotStateStore,
        event_logger: EventLoggerHandle,
        config: WebhookConfig,
        max_ack_pending: i64,
        max_deliver: i64,
    ) -> Self {
        Self {
            pool,
            broker,
            hot_state,
            recipient_repo: RecipientRepository::new(),
            batch_repo: BatchRepository::new(),
            message_index_repo: MessageIndexRepository::new(),
            event_logger,
            config,
            max_ack_pending,
            max_deliver,
        }
    }

    /// Pulls a bounded micro-batch (`batchSize ≤ 100`, linger `≤ 250 ms`,
    /// per §4.H) at a time rather than reconciling messages one by one:
    /// each batch's events are reconciled concurrently, then acked/naked
    /// individually so a single bad event never blocks the rest.
    #[tracing::instrument(level = "info", skip_all, name = "webhook_reconciler")]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let consumer = match self.broker.webhook_consumer(self.max_ack_pending, self.max_deliver).await {
            Ok(consumer) => consumer,
            Err(error) => {
                tracing::error!(%error, "failed to create webhook consumer, reconciler exiting");
                return;
            }
        };

        loop {
            let batch = tokio::select! {
                _ = shutdown.changed() => return,
                batch = consumer
                    .fetch()
                    .max_messages(self.config.micro_batch_size)
                    .expires(Duration::from_millis(self.config.linger_ms))
                    .messages() => batch,
            };
            let mut messages = match batch {
                Ok(messages) => messages,
                Err(error) => {
                    tracing::error!(%error, "failed to pull webhook micro-batch");
                    continue;
                }
            };

            let mut drained = Vec::with_capacity(self.config.micro_batch_size);
            while let Some(next) = messages.next().await {
                match next {
                    Ok(message) => drained.push(message),
                    Err(error) => tracing::error!(%error, "error pulling from webhook consumer"),
                }
            }
            if drained.is_empty() {
                continue;
            }

            let outcomes = futures::future::join_all(drained.into_iter().map(|message| async {
                let Ok(event) = serde_json::from_slice::<WebhookEvent>(&message.payload) else {
                    tracing::error!("malformed webhook event payload, dropping");
                    let _ = message.ack().await;
                    return;
                };
                if self.reconcile(&event).await {
                    let _ = message.ack().await;
                } else {
                    let _ = message.ack_with(AckKind::Nak(None)).await;
                }
            }))
            .await;
            let _: Vec<()> = outcomes;
        }
    }

    /// Returns `true` to ack (handled, including a deliberate skip), `false`
    /// to retry.
    async fn reconcile(&self, event: &WebhookEvent) -> bool {
        let claimed = match self
            .hot_state
            .claim_webhook_dedup(
                event.provider.as_str(),
                &event.provider_message_id,
                event.event_type.as_str(),
                self.config.distributed_dedup_ttl_secs,
            )
            .await
        {
            Ok(claimed) => claimed,
            Err(error) => {
                tracing::warn!(%error, "dedup claim failed, proceeding fail-open (cache is advisory, DB transition is still guarded)");
                true
            }
        };
        if !claimed {
            tracing::debug!(dedup_key = %event.dedup_key(), "webhook event already reconciled, skipping duplicate delivery");
            return true;
        }

        let mut conn = match self.pool.acquire().await {
            Ok(conn) => conn,
            Err(error) => {
                tracing::error!(%error, "database unavailable, retrying webhook event");
                return false;
            }
        };

        let index_entry = match self.hot_state.get_message_index(&event.provider_message_id).await {
            Ok(Some(entry)) => Some(entry),
            Ok(None) => match self.message_index_repo.find(&mut conn, &event.provider_message_id).await {
                Ok(entry) => entry,
                Err(error) => {
                    tracing::error!(%error, "failed to look up message index entry");
                    return false;
                }
            },
            Err(error) => {
                tracing::warn!(%error, "message index cache read failed, falling back to database");
                match self.message_index_repo.find(&mut conn, &event.provider_message_id).await {
                    Ok(entry) => entry,
                    Err(error) => {
                        tracing::error!(%error, "failed to look up message index entry");
                        return false;
                    }
                }
            }
        };

        let Some(index_entry) = index_entry else {
            tracing::warn!(provider_message_id = %event.provider_message_id, "webhook event unmatchable to any recipient, dropping");
            return true;
        };

        if let Some(next_status) = transition_for(event.event_type) {
            match self.recipient_repo.apply_webhook_transition(&mut conn, index_entry.recipient_id, next_status).await {
                Ok(true) => {
                    let _ = self.hot_state.set_recipient_status(index_entry.batch_id, index_entry.recipient_id, next_status).await;
                    let deltas = counters_for(next_status);
                    if let Err(error) = self.batch_repo.apply_webhook_deltas(&mut conn, index_entry.batch_id, deltas).await {
                        tracing::error!(%error, "failed to apply webhook counter deltas");
                        return false;
                    }
                    let _ = self.hot_state.incr_counters(index_entry.batch_id, deltas).await;
                }
                Ok(false) => {
                    tracing::debug!(recipient_id = %index_entry.recipient_id, "webhook transition rejected (stale or out-of-order), treating as idempotent replay");
                }
                Err(error) => {
                    tracing::error!(%error, "failed to apply webhook transition");
                    return false;
                }
            }
        }

        self.event_logger.log(EventRecord {
            event_type: event_type_for(event.event_type),
            batch_id: index_entry.batch_id,
            recipient_id: Some(index_entry.recipient_id),
            user_id: index_entry.user_id,
            provider_message_id: Some(event.provider_message_id.clone()),
            timestamp: event.timestamp,
            metadata: event.metadata.clone(),
            error_message: None,
        });

        match self.batch_repo.try_complete(&mut conn, index_entry.batch_id).await {
            Ok(true) => {
                self.event_logger.log(EventRecord {
                    event_type: EventType::BatchCompleted,
                    batch_id: index_entry.batch_id,
                    recipient_id: None,
                    user_id: index_entry.user_id,
                    provider_message_id: None,
                    timestamp: time::OffsetDateTime::now_utc(),
                    metadata: serde_json::Value::Null,
                    error_message: None,
                });
            }
            Ok(false) => {}
            Err(error) => tracing::error!(%error, "failed to check/apply batch completion"),
        }

        true
    }
}

const fn counters_for(status: RecipientStatus) -> BatchCounters {
    match status {
        RecipientStatus::Delivered => BatchCounters { sent: 0, delivered: 1, bounced: 0, complained: 0, failed: 0 },
        RecipientStatus::Bounced => BatchCounters { sent: 0, delivered: 0, bounced: 1, complained: 0, failed: 0 },
        RecipientStatus::Complained => BatchCounters { sent: 0, delivered: 0, bounced: 0, complained: 1, failed: 0 },
        RecipientStatus::Failed => BatchCounters { sent: 0, delivered: 0, bounced: 0, complained: 0, failed: 1 },
        _ => BatchCounters { sent: 0, delivered: 0, bounced: 0, complained: 0, failed: 0 },
    }
}

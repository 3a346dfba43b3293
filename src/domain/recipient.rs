use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "recipient_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecipientStatus {
    Pending,
    Queued,
    Sent,
    Delivered,
    Bounced,
    Complained,
    Failed,
}

impl RecipientStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Bounced | Self::Complained | Self::Failed)
    }

    /// The recipient-status DAG from §3, extended with the `sent -> failed`
    /// edge §4.H step 3 requires for a provider's `failed` webhook
    /// (`WHERE status='sent'`) — genuinely absent from §3's DAG diagram,
    /// which only draws `failed` off of `queued` (exhausted retries at
    /// send time). `sent` is not terminal otherwise — it may still refine
    /// into delivered/bounced/complained via webhook.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Queued)
                | (Self::Queued, Self::Sent)
                | (Self::Queued, Self::Failed)
                | (Self::Sent, Self::Delivered)
                | (Self::Sent, Self::Bounced)
                | (Self::Sent, Self::Complained)
                | (Self::Sent, Self::Failed)
                // SES can retrospectively suppress a previously-delivered
                // message; permitted per the spec's open question (§9),
                // unchanged from the source behaviour pending operator
                // sign-off.
                | (Self::Delivered, Self::Complained)
        )
    }

    /// Invariant 5 ("webhook monotonicity"): does `next` strictly refine
    /// `self`, or is it the same status (idempotent re-application)?
    #[must_use]
    pub fn refines(self, next: Self) -> bool {
        self == next || self.can_transition_to(next)
    }
}

#[derive(Debug, Clone)]
pub struct Recipient {
    pub id: Uuid,
    pub batch_id: Uuid,
    /// Opaque to the core: an email address, phone number, webhook URL, or
    /// push token depending on the batch's module.
    pub identifier: String,
    pub name: Option<String>,
    pub variables: BTreeMap<String, String>,
    pub status: RecipientStatus,
    pub provider_message_id: Option<String>,
    pub sent_at: Option<OffsetDateTime>,
    pub delivered_at: Option<OffsetDateTime>,
    pub bounced_at: Option<OffsetDateTime>,
    pub complained_at: Option<OffsetDateTime>,
    pub error_message: Option<String>,
    pub updated_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use RecipientStatus::{Bounced, Complained, Delivered, Failed, Pending, Queued, Sent};

    #[test]
    fn happy_path_dag() {
        assert!(Pending.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Sent));
        assert!(Sent.can_transition_to(Delivered));
        assert!(Sent.can_transition_to(Bounced));
        assert!(Sent.can_transition_to(Complained));
        assert!(Queued.can_transition_to(Failed));
    }

    #[test]
    fn terminal_statuses_refuse_further_transitions() {
        assert!(!Delivered.can_transition_to(Sent));
        assert!(!Bounced.can_transition_to(Delivered));
        assert!(!Failed.can_transition_to(Sent));
    }

    #[test]
    fn monotonicity_rejects_regression_but_allows_idempotent_replay() {
        assert!(Delivered.refines(Delivered));
        assert!(!Delivered.refines(Sent));
        assert!(Sent.refines(Delivered));
    }

    #[test]
    fn sent_to_failed_is_a_recognised_edge() {
        // §4.H step 3: a provider `failed` webhook after a successful send
        // redirects the recipient to `failed` rather than being dropped.
        assert!(Sent.can_transition_to(Failed));
    }

    #[test]
    fn delivered_to_bounced_is_not_a_recognised_edge() {
        // Codifies the open question in §9: a `bounced` arriving after
        // `delivered` is dropped by the reconciler's `WHERE status='sent'`
        // clause, not represented as a DAG edge here.
        assert!(!Delivered.can_transition_to(Bounced));
    }
}

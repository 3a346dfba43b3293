use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "batch_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Draft,
    Scheduled,
    Queued,
    Processing,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// The lifecycle edges from §4.E. Every caller transitions via a
    /// conditional `UPDATE ... WHERE status = expected`; this table is the
    /// single source of truth for which transitions that `expected` may be.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Queued)
                | (Self::Draft, Self::Scheduled)
                | (Self::Scheduled, Self::Queued)
                | (Self::Queued, Self::Processing)
                | (Self::Processing, Self::Paused)
                | (Self::Paused, Self::Queued)
                | (Self::Processing, Self::Cancelled)
                | (Self::Queued, Self::Cancelled)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

/// The five observable counters on a batch. All invariants (bounds,
/// monotonicity, completion) live on this type so they're exercised the same
/// way regardless of whether the mutation came from a send outcome (§4.D) or
/// a webhook reconciliation (§4.H).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchCounters {
    pub sent: i64,
    pub delivered: i64,
    pub bounced: i64,
    pub complained: i64,
    pub failed: i64,
}

impl BatchCounters {
    #[must_use]
    pub const fn applied_total(self) -> i64 {
        self.sent + self.delivered + self.bounced + self.complained + self.failed
    }

    /// Adds `delta` to `current`, clamped so the result never exceeds
    /// `total`. Returns `(new_value, clamped)` — `clamped` is true when the
    /// naive sum would have overshot, so callers can surface the
    /// operator-visible warning the spec's open question calls for.
    #[must_use]
    pub const fn clamp_add(current: i64, delta: i64, total: i64) -> (i64, bool) {
        let naive = current + delta;
        if naive > total { (total, true) } else { (naive, false) }
    }

    #[must_use]
    pub const fn in_bounds(self, total: i64) -> bool {
        self.sent >= 0
            && self.delivered >= 0
            && self.bounced >= 0
            && self.complained >= 0
            && self.failed >= 0
            && self.sent <= total
            && self.delivered <= total
            && self.bounced <= total
            && self.complained <= total
            && self.failed <= total
            && self.applied_total() <= total
    }

    /// §4.B: a batch is complete once the applied counters saturate
    /// `total_recipients`.
    #[must_use]
    pub const fn is_saturated(self, total: i64) -> bool {
        self.applied_total() >= total
    }
}

#[derive(Debug, Clone)]
pub struct Batch {
    pub id: Uuid,
    pub user_id: Uuid,
    pub send_config_id: Uuid,
    pub name: String,
    pub payload: JsonValue,
    pub total_recipients: i64,
    pub counters: BatchCounters,
    pub status: BatchStatus,
    pub scheduled_at: Option<OffsetDateTime>,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
    pub dry_run: bool,
    pub recovery_count: u32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Batch {
    /// Pre-webhook completion predicate from §3: `sent + failed ==
    /// total_recipients`. Webhooks subsequently redistribute `sent` into
    /// `{delivered, bounced, complained}` without changing this sum.
    #[must_use]
    pub const fn send_phase_complete(&self) -> bool {
        self.counters.sent + self.counters.failed + self.counters.delivered + self.counters.bounced
            + self.counters.complained
            >= self.total_recipients
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BatchStatus::{Cancelled, Completed, Draft, Failed, Paused, Processing, Queued, Scheduled};

    #[test]
    fn lifecycle_allows_only_documented_edges() {
        assert!(Draft.can_transition_to(Queued));
        assert!(Draft.can_transition_to(Scheduled));
        assert!(Scheduled.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Queued));
        assert!(Processing.can_transition_to(Cancelled));
        assert!(Queued.can_transition_to(Cancelled));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Draft.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Queued));
        assert!(!Paused.can_transition_to(Cancelled));
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for terminal in [Completed, Failed, Cancelled] {
            assert!(terminal.is_terminal());
            for candidate in
                [Draft, Scheduled, Queued, Processing, Paused, Completed, Failed, Cancelled]
            {
                assert!(!terminal.can_transition_to(candidate));
            }
        }
    }

    #[test]
    fn clamp_add_never_overshoots_total() {
        let (val, clamped) = BatchCounters::clamp_add(98, 5, 100);
        assert_eq!(val, 100);
        assert!(clamped);

        let (val, clamped) = BatchCounters::clamp_add(10, 5, 100);
        assert_eq!(val, 15);
        assert!(!clamped);
    }

    #[test]
    fn counters_bounds_invariant() {
        let counters = BatchCounters { sent: 3, delivered: 2, bounced: 1, complained: 1, failed: 0 };
        assert!(counters.in_bounds(10));
        assert!(!counters.in_bounds(5));
    }

    #[test]
    fn saturation_triggers_completion() {
        let counters = BatchCounters { sent: 0, delivered: 2, bounced: 1, complained: 1, failed: 0 };
        assert!(counters.is_saturated(4));
        assert!(!counters.is_saturated(5));
    }
}

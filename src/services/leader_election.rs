use crate::adapters::cache::leader_lease::LeaderLease;
use std::time::Duration;
use tokio::sync::watch;

/// Runs the acquire/renew loop for the standing leader lease (§4.I) and
/// exposes the current leadership state as a `watch` channel, the same
/// broadcast-a-boolean idiom the teacher uses for its shutdown signal —
/// here signaling "am I allowed to run leader-only work" instead.
#[derive(Debug)]
pub struct LeaderElection {
    lease: LeaderLease,
    renew_interval: Duration,
    is_leader_tx: watch::Sender<bool>,
}

impl LeaderElection {
    #[must_use]
    pub fn new(lease: LeaderLease, renew_interval_secs: u64) -> (Self, watch::Receiver<bool>) {
        let (is_leader_tx, is_leader_rx) = watch::channel(false);
        (Self { lease, renew_interval: Duration::from_secs(renew_interval_secs), is_leader_tx }, is_leader_rx)
    }

    #[tracing::instrument(level = "info", skip_all, name = "leader_election")]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.renew_interval);
        let mut is_leader = false;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if is_leader {
                        self.lease.release().await;
                    }
                    return;
                }
                _ = ticker.tick() => {
                    let won = if is_leader { self.lease.renew().await } else { self.lease.try_acquire().await };
                    if won != is_leader {
                        tracing::info!(leader = won, "leadership state changed");
                    }
                    is_leader = won;
                    let _ = self.is_leader_tx.send(is_leader);
                }
            }
        }
    }
}

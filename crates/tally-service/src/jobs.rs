//! Background jobs.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use tally_store::Ledger;

/// Spawn the periodic snapshot job.
///
/// Every `interval` the job snapshots each registered user's balance. The first run
/// happens one full interval after start. A failed run is logged and the job keeps
/// going.
#[must_use]
pub fn spawn_snapshot_job(ledger: Ledger, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = interval.as_secs(), "Snapshot job started");

        loop {
            ticker.tick().await;

            match ledger.record_all_snapshots().await {
                Ok(run) if run.is_complete() => {
                    tracing::info!(recorded = run.recorded.len(), "Periodic snapshot run complete");
                }
                Ok(run) => {
                    tracing::warn!(
                        recorded = run.recorded.len(),
                        failed = run.failed.len(),
                        "Periodic snapshot run finished with failures"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Periodic snapshot run failed");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tally_core::UserId;
    use tally_store::MemoryStore;

    #[tokio::test(start_paused = true)]
    async fn snapshots_on_each_tick() {
        let ledger = Ledger::new(Arc::new(MemoryStore::new()));
        let user = UserId::generate();
        ledger.open_account(user, "ticker").await.unwrap();
        ledger.charge(&user, 25).await.unwrap();

        let handle = spawn_snapshot_job(ledger.clone(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(ledger.list_snapshots(&user).await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(100)).await;
        let snapshots = ledger.list_snapshots(&user).await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert!(snapshots.iter().all(|s| s.balance == 25));

        handle.abort();
    }
}

// Background sweeper
//
// Periodically drives the deadline machinery: expires active wagers past
// expires_at, applies the default void to overdue disputes, evicts stale
// queue entries, and re-runs pairing. Each transition is status-guarded,
// so concurrent sweeper instances never double-apply anything. The sweep
// also snapshots state so queue places survive a restart.

use std::time::Duration;

use chrono::Utc;

use crate::app_state::SharedState;

pub fn spawn(state: SharedState, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; use it to catch up on
        // deadlines that passed while the process was down.
        loop {
            ticker.tick().await;

            let summary = {
                let mut state = state.lock().unwrap();
                let summary = state.sweep(Utc::now());
                if let Err(e) = state.save_to_disk() {
                    tracing::warn!(error = %e, "state snapshot failed");
                }
                summary
            };

            if !summary.is_empty() {
                tracing::info!(
                    expired = summary.expired_wagers,
                    voided = summary.voided_disputes,
                    evicted = summary.evicted_entries,
                    paired = summary.pairs_created,
                    "sweep pass applied deadline transitions"
                );
            }
        }
    })
}

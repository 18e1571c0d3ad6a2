// Internal polling loop: runs a batch every `poll_interval_secs`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error};

use scorecast_core::notify::Notifier;

/// Tick forever, running a batch each period. A tick that lands while a
/// batch (for example a cron-triggered one) is still running is skipped.
pub async fn run(notifier: Arc<Notifier>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match notifier.try_run_batch(Utc::now()).await {
            Some(Ok(report)) => debug!(
                games = report.games_checked,
                sent = report.notifications_sent,
                "scheduled batch complete"
            ),
            Some(Err(e)) => error!("scheduled batch failed: {e:#}"),
            None => debug!("scheduled tick skipped, batch in flight"),
        }
    }
}

// Batch driver: one pass over every enabled settings record.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use super::engine::{GameOutcome, Notifier};
use super::settings::NotificationSettings;

/// Tallies for one batch run. Serialized as the cron endpoint's response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub settings_processed: usize,
    pub games_checked: usize,
    pub notifications_sent: usize,
    pub unchanged: usize,
    pub superseded: usize,
    pub fetch_failures: usize,
    pub errors: usize,
    pub states_pruned: usize,
}

impl BatchReport {
    fn record(&mut self, company_id: &str, game_id: &str, outcome: Result<GameOutcome>) {
        self.games_checked += 1;
        match outcome {
            Ok(GameOutcome::Unchanged) => self.unchanged += 1,
            Ok(GameOutcome::Notified { .. }) => self.notifications_sent += 1,
            Ok(GameOutcome::Superseded) => self.superseded += 1,
            Ok(GameOutcome::SourceUnavailable) => self.fetch_failures += 1,
            Err(e) => {
                error!(company_id, game_id, "game processing failed: {e:#}");
                self.errors += 1;
            }
        }
    }
}

impl Notifier {
    /// Run one batch, waiting for any batch already in flight to finish.
    pub async fn run_batch(&self, now: DateTime<Utc>) -> Result<BatchReport> {
        let _guard = self.batch_lock.lock().await;
        self.run_batch_locked(now).await
    }

    /// Run one batch unless another is already in flight, in which case
    /// `None` is returned and nothing is done.
    pub async fn try_run_batch(&self, now: DateTime<Utc>) -> Option<Result<BatchReport>> {
        let Ok(_guard) = self.batch_lock.try_lock() else {
            info!("batch already running, skipping trigger");
            return None;
        };
        Some(self.run_batch_locked(now).await)
    }

    async fn run_batch_locked(&self, now: DateTime<Utc>) -> Result<BatchReport> {
        let all_settings = self
            .db
            .list_enabled_settings()
            .context("failed to list enabled notification settings")?;

        let mut report = BatchReport::default();
        for settings in &all_settings {
            self.process_settings(settings, now, &mut report).await;
            report.settings_processed += 1;
        }

        info!(
            settings = report.settings_processed,
            games = report.games_checked,
            sent = report.notifications_sent,
            fetch_failures = report.fetch_failures,
            errors = report.errors,
            "notification batch complete"
        );
        Ok(report)
    }

    async fn process_settings(
        &self,
        settings: &NotificationSettings,
        now: DateTime<Utc>,
        report: &mut BatchReport,
    ) {
        let company_id = settings.company_id.as_str();
        if settings.channel_ids.is_empty() {
            warn!(company_id, sport = settings.sport.as_str(), "enabled settings have no channels");
        }

        let outcomes: Vec<(String, Result<GameOutcome>)> =
            stream::iter(settings.tracked_games.iter().cloned())
                .map(|game_id| async move {
                    let outcome = self.process_game(settings, &game_id, now).await;
                    (game_id, outcome)
                })
                .buffer_unordered(self.options.max_concurrent_games.max(1))
                .collect()
                .await;

        for (game_id, outcome) in outcomes {
            report.record(company_id, &game_id, outcome);
        }

        if self.options.prune_untracked_states {
            match self
                .db
                .prune_untracked_states(company_id, settings.sport, &settings.tracked_games)
            {
                Ok(removed) => report.states_pruned += removed,
                Err(e) => {
                    error!(company_id, "failed to prune untracked game states: {e:#}");
                    report.errors += 1;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

// Per-game notification pipeline: fetch, diff against stored state, commit,
// format and dispatch.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::decision::{decide, DecisionInput, EventKind};
use super::dispatch::{dispatch, ChatApi};
use super::format::format_message;
use super::settings::NotificationSettings;
use crate::config::Config;
use crate::db::Database;
use crate::game::source::GameStateSource;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Knobs the engine and batch driver read from config.
#[derive(Debug, Clone)]
pub struct NotifierOptions {
    pub max_concurrent_games: usize,
    pub prune_untracked_states: bool,
}

impl NotifierOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent_games: config.scheduler.max_concurrent_games,
            prune_untracked_states: config.retention.prune_untracked_states,
        }
    }
}

impl Default for NotifierOptions {
    fn default() -> Self {
        Self {
            max_concurrent_games: 8,
            prune_untracked_states: true,
        }
    }
}

/// What happened to one (settings, game) pair in one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum GameOutcome {
    /// Nothing the settings care about changed; state untouched.
    Unchanged,
    /// An event was committed and handed to the dispatcher.
    Notified {
        kind: EventKind,
        message: String,
        delivered: usize,
        failed: usize,
    },
    /// Another invocation committed this transition first; nothing sent.
    Superseded,
    /// The game state source failed; the game is skipped this cycle.
    SourceUnavailable,
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Owns the collaborators the notification pipeline needs.
pub struct Notifier {
    pub(crate) db: Arc<Database>,
    source: Arc<dyn GameStateSource>,
    chat: Arc<dyn ChatApi>,
    pub(crate) options: NotifierOptions,
    /// Serializes batch runs inside this process.
    pub(crate) batch_lock: tokio::sync::Mutex<()>,
}

impl Notifier {
    pub fn new(
        db: Arc<Database>,
        source: Arc<dyn GameStateSource>,
        chat: Arc<dyn ChatApi>,
        options: NotifierOptions,
    ) -> Self {
        Self {
            db,
            source,
            chat,
            options,
            batch_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn source(&self) -> &dyn GameStateSource {
        self.source.as_ref()
    }

    /// Run one decision for `game_id` under `settings` at instant `now`.
    ///
    /// Source failures are logged and reported as
    /// [`GameOutcome::SourceUnavailable`]. Persistence failures are returned
    /// as errors. The new state is committed before any message is sent, and
    /// only the invocation whose conditional write succeeds dispatches.
    pub async fn process_game(
        &self,
        settings: &NotificationSettings,
        game_id: &str,
        now: DateTime<Utc>,
    ) -> Result<GameOutcome> {
        let company_id = settings.company_id.as_str();

        let current = match self.source.fetch_game_state(settings.sport, game_id).await {
            Ok(game) => game,
            Err(e) => {
                warn!(company_id, game_id, "skipping game, state fetch failed: {e}");
                return Ok(GameOutcome::SourceUnavailable);
            }
        };

        let stored = self
            .db
            .load_or_init_state(company_id, game_id, settings.sport)
            .with_context(|| format!("failed to load state for {company_id}/{game_id}"))?;

        let Some(decision) = decide(DecisionInput {
            settings,
            prior: &stored.state,
            current: &current,
            now,
        }) else {
            debug!(company_id, game_id, "no notifiable change");
            return Ok(GameOutcome::Unchanged);
        };

        let committed = self
            .db
            .commit_state(company_id, game_id, stored.version, &decision.next_state)
            .with_context(|| format!("failed to commit state for {company_id}/{game_id}"))?;
        if !committed {
            info!(
                company_id,
                game_id,
                kind = decision.kind.as_str(),
                "transition already committed by another run"
            );
            return Ok(GameOutcome::Superseded);
        }

        let message = format_message(&current, decision.kind);
        let report = dispatch(self.chat.as_ref(), &settings.channel_ids, &message).await;

        info!(
            company_id,
            game_id,
            kind = decision.kind.as_str(),
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "notification dispatched"
        );

        Ok(GameOutcome::Notified {
            kind: decision.kind,
            message,
            delivered: report.delivered.len(),
            failed: report.failed.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

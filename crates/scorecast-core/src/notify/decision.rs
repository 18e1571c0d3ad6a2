// Diff & decision engine: compare a fresh game snapshot with the last state
// we notified about and decide which single event, if any, to emit.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::settings::{NotificationSettings, UpdateFrequency};
use crate::game::{GameState, GameStatus};

/// Minimum spacing, in seconds, between score posts under `every_minute`.
pub const SCORE_THROTTLE_SECS: i64 = 60;

/// What the service last told a company's channels about one game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameNotificationState {
    pub home_score: u32,
    pub away_score: u32,
    pub period: u32,
    /// `None` until the first notification for this game.
    pub status: Option<GameStatus>,
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl GameNotificationState {
    /// The state to persist once an event for `current` has been decided.
    pub fn advanced_to(current: &GameState, now: DateTime<Utc>) -> Self {
        Self {
            home_score: current.home_score,
            away_score: current.away_score,
            period: current.period,
            status: Some(current.status),
            last_notified_at: Some(now),
        }
    }
}

/// The kinds of notification the engine can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    GameStart,
    GameEnd,
    QuarterEnd,
    Score,
}

impl EventKind {
    /// Evaluation order. The first kind whose rule matches wins, so a poll
    /// that sees both a period change and a score change reports only the
    /// period change.
    pub const PRIORITY: [EventKind; 4] = [
        EventKind::GameStart,
        EventKind::GameEnd,
        EventKind::QuarterEnd,
        EventKind::Score,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::GameStart => "game_start",
            EventKind::GameEnd => "game_end",
            EventKind::QuarterEnd => "quarter_end",
            EventKind::Score => "score",
        }
    }

    fn fires(self, input: &DecisionInput<'_>) -> bool {
        match self {
            EventKind::GameStart => game_start_fires(input),
            EventKind::GameEnd => game_end_fires(input),
            EventKind::QuarterEnd => quarter_end_fires(input),
            EventKind::Score => score_fires(input),
        }
    }
}

/// Everything one decision looks at.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub settings: &'a NotificationSettings,
    pub prior: &'a GameNotificationState,
    pub current: &'a GameState,
    pub now: DateTime<Utc>,
}

/// A decided event together with the state that records it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub kind: EventKind,
    pub next_state: GameNotificationState,
}

/// Decide at most one event for this poll. `None` means nothing changed that
/// the settings care about, and the stored state must stay as it is.
pub fn decide(input: DecisionInput<'_>) -> Option<Decision> {
    EventKind::PRIORITY
        .into_iter()
        .find(|kind| kind.fires(&input))
        .map(|kind| Decision {
            kind,
            next_state: GameNotificationState::advanced_to(input.current, input.now),
        })
}

fn game_start_fires(input: &DecisionInput<'_>) -> bool {
    input.settings.notify_game_start
        && input.current.status == GameStatus::Live
        && input.prior.status != Some(GameStatus::Live)
}

fn game_end_fires(input: &DecisionInput<'_>) -> bool {
    input.settings.notify_game_end
        && input.current.status == GameStatus::Final
        && input.prior.status != Some(GameStatus::Final)
}

// A prior period of 0 is the default for a game we have never notified
// about; moving off it is the first fetch, not a period ending.
fn quarter_end_fires(input: &DecisionInput<'_>) -> bool {
    input.settings.notify_quarter_end
        && input.prior.period > 0
        && input.current.period > input.prior.period
}

fn score_fires(input: &DecisionInput<'_>) -> bool {
    let score_changed = input.current.home_score != input.prior.home_score
        || input.current.away_score != input.prior.away_score;
    if !input.current.is_live() || !score_changed {
        return false;
    }

    match input.settings.update_frequency {
        UpdateFrequency::EveryPoint => true,
        UpdateFrequency::EveryMinute => match input.prior.last_notified_at {
            Some(last) => input.now - last >= Duration::seconds(SCORE_THROTTLE_SECS),
            None => true,
        },
        UpdateFrequency::EveryQuarter => false,
    }
}

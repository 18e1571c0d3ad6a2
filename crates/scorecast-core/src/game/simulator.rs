// Deterministic, wall-clock driven test games.
//
// A test game loops forever through pregame, regulation and postgame. The
// phase within the loop is derived from the current time plus a stable
// per-id offset, so two polls at the same instant always agree and different
// ids are spread across the cycle.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{GameState, GameStatus, Sport};

const PREGAME_SECS: u64 = 60;
const POSTGAME_SECS: u64 = 60;

const NBA_TEAMS: &[&str] = &[
    "Boston Celtics",
    "Denver Nuggets",
    "Golden State Warriors",
    "Los Angeles Lakers",
    "Miami Heat",
    "Milwaukee Bucks",
];
const NFL_TEAMS: &[&str] = &[
    "Buffalo Bills",
    "Dallas Cowboys",
    "Detroit Lions",
    "Green Bay Packers",
    "Kansas City Chiefs",
    "San Francisco 49ers",
];
const UCL_TEAMS: &[&str] = &[
    "Arsenal",
    "Bayern Munich",
    "Inter",
    "Paris Saint-Germain",
    "Real Madrid",
    "Manchester City",
];

#[derive(Debug, Clone)]
pub struct TestGameSimulator {
    prefix: String,
    period_length: Duration,
}

impl TestGameSimulator {
    pub fn new(prefix: String, period_length: Duration) -> Self {
        Self {
            prefix,
            period_length,
        }
    }

    fn period_secs(&self) -> u64 {
        self.period_length.as_secs().max(1)
    }

    fn regulation_secs(&self, sport: Sport) -> u64 {
        u64::from(sport.regulation_periods()) * self.period_secs()
    }

    /// Length of one full pregame-to-postgame loop.
    pub fn cycle_secs(&self, sport: Sport) -> u64 {
        PREGAME_SECS + self.regulation_secs(sport) + POSTGAME_SECS
    }

    /// Offset into the cycle for `game_id`; stable across processes.
    pub fn phase_offset(&self, sport: Sport, game_id: &str) -> u64 {
        seed(game_id) % self.cycle_secs(sport)
    }

    /// Demo games listed on the simulated scoreboard.
    pub fn scoreboard(&self, sport: Sport, now: DateTime<Utc>) -> Vec<GameState> {
        let game_id = format!("{}{}-1", self.prefix, sport);
        vec![self.state_at(sport, &game_id, now)]
    }

    /// State of `game_id` at instant `now`.
    pub fn state_at(&self, sport: Sport, game_id: &str, now: DateTime<Utc>) -> GameState {
        let cycle = self.cycle_secs(sport);
        let now_secs = now.timestamp().max(0) as u64;
        let t = (now_secs + self.phase_offset(sport, game_id)) % cycle;

        let seed = seed(game_id);
        let (home_team, away_team) = teams(sport, seed);
        let mut game = GameState {
            game_id: game_id.to_string(),
            sport,
            home_team,
            away_team,
            home_score: 0,
            away_score: 0,
            period: 0,
            status: GameStatus::Scheduled,
            clock: String::new(),
        };

        if t < PREGAME_SECS {
            return game;
        }

        let regulation = self.regulation_secs(sport);
        let elapsed = (t - PREGAME_SECS).min(regulation);
        let (home_rate, away_rate) = scoring_rates(sport, seed);
        game.home_score = (elapsed * home_rate / regulation) as u32;
        game.away_score = (elapsed * away_rate / regulation) as u32;

        if t - PREGAME_SECS >= regulation {
            game.status = GameStatus::Final;
            game.period = sport.regulation_periods();
            game.clock = "0:00".to_string();
        } else {
            let period_secs = self.period_secs();
            game.status = GameStatus::Live;
            game.period = (elapsed / period_secs) as u32 + 1;
            let remaining = period_secs - elapsed % period_secs;
            game.clock = format!("{}:{:02}", remaining / 60, remaining % 60);
        }

        game
    }
}

/// FNV-1a over the id bytes.
fn seed(game_id: &str) -> u64 {
    game_id.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn teams(sport: Sport, seed: u64) -> (String, String) {
    let pool = match sport {
        Sport::Nba => NBA_TEAMS,
        Sport::Nfl => NFL_TEAMS,
        Sport::Ucl => UCL_TEAMS,
    };
    let home = (seed % pool.len() as u64) as usize;
    let away = (home + 1 + (seed / 7 % (pool.len() as u64 - 1)) as usize) % pool.len();
    (pool[home].to_string(), pool[away].to_string())
}

/// Final-score totals for each side; the score grows linearly toward them.
fn scoring_rates(sport: Sport, seed: u64) -> (u64, u64) {
    match sport {
        Sport::Nba => (95 + seed % 30, 95 + (seed >> 8) % 30),
        Sport::Nfl => (10 + seed % 28, 10 + (seed >> 8) % 28),
        Sport::Ucl => (seed % 4, (seed >> 8) % 4),
    }
}

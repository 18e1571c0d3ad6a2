// Game model shared by the sources, the decision engine and the formatter.

pub mod simulator;
pub mod source;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A league the service can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Nba,
    Nfl,
    Ucl,
}

impl Sport {
    pub fn as_str(self) -> &'static str {
        match self {
            Sport::Nba => "nba",
            Sport::Nfl => "nfl",
            Sport::Ucl => "ucl",
        }
    }

    /// Number of regulation periods (quarters or halves).
    pub fn regulation_periods(self) -> u32 {
        match self {
            Sport::Nba | Sport::Nfl => 4,
            Sport::Ucl => 2,
        }
    }

    /// Human label for a period number, e.g. `Q3`, `OT2`, `2nd half`.
    pub fn period_label(self, period: u32) -> String {
        match self {
            Sport::Nba | Sport::Nfl => match period {
                0 => "Pregame".to_string(),
                1..=4 => format!("Q{period}"),
                5 => "OT".to_string(),
                n => format!("OT{}", n - 4),
            },
            Sport::Ucl => match period {
                0 => "Pregame".to_string(),
                1 => "1st half".to_string(),
                2 => "2nd half".to_string(),
                3 | 4 => "Extra time".to_string(),
                _ => "Penalties".to_string(),
            },
        }
    }

    fn emoji(self) -> &'static str {
        match self {
            Sport::Nba => "\u{1F3C0}",
            Sport::Nfl => "\u{1F3C8}",
            Sport::Ucl => "\u{26BD}",
        }
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nba" => Ok(Sport::Nba),
            "nfl" => Ok(Sport::Nfl),
            "ucl" => Ok(Sport::Ucl),
            other => Err(format!("unknown sport: {other}")),
        }
    }
}

/// Lifecycle of a game as reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Scheduled,
    Live,
    Final,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::Scheduled => "scheduled",
            GameStatus::Live => "live",
            GameStatus::Final => "final",
        }
    }

    /// Parse a stored status string. Empty or unrecognised values mean "never
    /// seen", which is how a freshly initialised state row starts out.
    pub fn from_stored(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(GameStatus::Scheduled),
            "live" => Some(GameStatus::Live),
            "final" => Some(GameStatus::Final),
            _ => None,
        }
    }
}

/// A point-in-time snapshot of one game, produced fresh on every poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub game_id: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u32,
    pub away_score: u32,
    pub period: u32,
    pub status: GameStatus,
    /// Display clock, e.g. `7:42`. Empty when the source has none.
    pub clock: String,
}

impl GameState {
    pub fn is_live(&self) -> bool {
        self.status == GameStatus::Live
    }

    /// `Away 48 - 52 Home` with the sport marker in front.
    pub fn score_line(&self) -> String {
        format!(
            "{} {} {} - {} {}",
            self.sport.emoji(),
            self.away_team,
            self.away_score,
            self.home_score,
            self.home_team
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sport_parses_case_insensitively() {
        assert_eq!("NBA".parse::<Sport>().unwrap(), Sport::Nba);
        assert_eq!("ucl".parse::<Sport>().unwrap(), Sport::Ucl);
        assert!("mlb".parse::<Sport>().is_err());
    }

    #[test]
    fn basketball_period_labels() {
        assert_eq!(Sport::Nba.period_label(1), "Q1");
        assert_eq!(Sport::Nba.period_label(4), "Q4");
        assert_eq!(Sport::Nba.period_label(5), "OT");
        assert_eq!(Sport::Nba.period_label(7), "OT3");
    }

    #[test]
    fn soccer_period_labels() {
        assert_eq!(Sport::Ucl.period_label(1), "1st half");
        assert_eq!(Sport::Ucl.period_label(2), "2nd half");
        assert_eq!(Sport::Ucl.period_label(3), "Extra time");
        assert_eq!(Sport::Ucl.period_label(5), "Penalties");
    }

    #[test]
    fn game_state_serializes_camel_case() {
        let game = GameState {
            game_id: "401".into(),
            sport: Sport::Nfl,
            home_team: "Detroit Lions".into(),
            away_team: "Green Bay Packers".into(),
            home_score: 14,
            away_score: 10,
            period: 2,
            status: GameStatus::Live,
            clock: "3:12".into(),
        };
        let json = serde_json::to_value(&game).unwrap();
        assert_eq!(json["gameId"], "401");
        assert_eq!(json["homeTeam"], "Detroit Lions");
        assert_eq!(json["awayScore"], 10);
        assert_eq!(json["sport"], "nfl");
        assert_eq!(json["status"], "live");
    }

    #[test]
    fn stored_status_round_trip() {
        for status in [GameStatus::Scheduled, GameStatus::Live, GameStatus::Final] {
            assert_eq!(GameStatus::from_stored(status.as_str()), Some(status));
        }
        assert_eq!(GameStatus::from_stored(""), None);
        assert_eq!(GameStatus::from_stored("halftime"), None);
    }
}

// Game state sources: the ESPN site API and the routing wrapper that sends
// test-game ids to the simulator.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::simulator::TestGameSimulator;
use super::{GameState, GameStatus, Sport};
use crate::config::SourcesConfig;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected payload for game {game_id}: {message}")]
    Malformed { game_id: String, message: String },

    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

// ---------------------------------------------------------------------------
// Source trait
// ---------------------------------------------------------------------------

/// Anything that can report the current state of a game.
#[async_trait]
pub trait GameStateSource: Send + Sync {
    /// Current score, period, status and clock for one game.
    async fn fetch_game_state(&self, sport: Sport, game_id: &str)
        -> Result<GameState, SourceError>;

    /// Every game on today's board for `sport`.
    async fn fetch_scoreboard(&self, sport: Sport) -> Result<Vec<GameState>, SourceError>;
}

// ---------------------------------------------------------------------------
// ESPN site API
// ---------------------------------------------------------------------------

/// Client for the public ESPN site API.
pub struct EspnSource {
    http: reqwest::Client,
    base_url: String,
}

impl EspnSource {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SourceError::Client)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn league_path(sport: Sport) -> &'static str {
        match sport {
            Sport::Nba => "basketball/nba",
            Sport::Nfl => "football/nfl",
            Sport::Ucl => "soccer/uefa.champions",
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value, SourceError> {
        debug!(url, "fetching game data");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| SourceError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(|source| SourceError::Http {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl GameStateSource for EspnSource {
    async fn fetch_game_state(
        &self,
        sport: Sport,
        game_id: &str,
    ) -> Result<GameState, SourceError> {
        let url = format!(
            "{}/{}/summary?event={}",
            self.base_url,
            Self::league_path(sport),
            game_id
        );
        let body = self.get_json(&url).await?;
        parse_summary(&body, sport, game_id).ok_or_else(|| SourceError::Malformed {
            game_id: game_id.to_string(),
            message: "incomplete competition in summary header".to_string(),
        })
    }

    async fn fetch_scoreboard(&self, sport: Sport) -> Result<Vec<GameState>, SourceError> {
        let url = format!("{}/{}/scoreboard", self.base_url, Self::league_path(sport));
        let body = self.get_json(&url).await?;
        Ok(parse_scoreboard(&body, sport))
    }
}

// ---------------------------------------------------------------------------
// Routing source
// ---------------------------------------------------------------------------

/// Sends ids carrying the test-game prefix to the simulator and everything
/// else to the live API.
pub struct GameSources {
    live: EspnSource,
    simulator: TestGameSimulator,
    test_prefix: String,
}

impl GameSources {
    pub fn new(live: EspnSource, simulator: TestGameSimulator, test_prefix: String) -> Self {
        Self {
            live,
            simulator,
            test_prefix,
        }
    }

    pub fn from_config(config: &SourcesConfig) -> Result<Self, SourceError> {
        let live = EspnSource::new(
            config.espn_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )?;
        let simulator = TestGameSimulator::new(
            config.test_game_prefix.clone(),
            Duration::from_secs(config.test_period_secs),
        );
        Ok(Self::new(live, simulator, config.test_game_prefix.clone()))
    }

    fn is_test_game(&self, game_id: &str) -> bool {
        game_id.starts_with(&self.test_prefix)
    }
}

#[async_trait]
impl GameStateSource for GameSources {
    async fn fetch_game_state(
        &self,
        sport: Sport,
        game_id: &str,
    ) -> Result<GameState, SourceError> {
        if self.is_test_game(game_id) {
            Ok(self.simulator.state_at(sport, game_id, chrono::Utc::now()))
        } else {
            self.live.fetch_game_state(sport, game_id).await
        }
    }

    /// Live board plus the simulator's demo game. A failing live API still
    /// yields the demo game so the read path stays usable.
    async fn fetch_scoreboard(&self, sport: Sport) -> Result<Vec<GameState>, SourceError> {
        let mut games = match self.live.fetch_scoreboard(sport).await {
            Ok(games) => games,
            Err(e) => {
                warn!(%sport, "live scoreboard unavailable: {e}");
                Vec::new()
            }
        };
        games.extend(self.simulator.scoreboard(sport, chrono::Utc::now()));
        Ok(games)
    }
}

// ---------------------------------------------------------------------------
// ESPN JSON parsing helpers
// ---------------------------------------------------------------------------

/// Parse a `summary` response.
///
/// Expected shape: `{ "header": { "competitions": [ { "competitors", "status" } ] } }`
pub(crate) fn parse_summary(body: &Value, sport: Sport, game_id: &str) -> Option<GameState> {
    let competition = body.get("header")?.get("competitions")?.get(0)?;
    parse_competition(competition, sport, game_id)
}

/// Parse a `scoreboard` response. Events that fail to parse are skipped.
pub(crate) fn parse_scoreboard(body: &Value, sport: Sport) -> Vec<GameState> {
    let Some(events) = body.get("events").and_then(Value::as_array) else {
        return Vec::new();
    };

    events
        .iter()
        .filter_map(|event| {
            let id = event.get("id")?.as_str()?;
            let competition = event.get("competitions")?.get(0)?;
            let parsed = parse_competition(competition, sport, id);
            if parsed.is_none() {
                warn!(%sport, event_id = id, "skipping unparsable scoreboard event");
            }
            parsed
        })
        .collect()
}

fn parse_competition(competition: &Value, sport: Sport, game_id: &str) -> Option<GameState> {
    let competitors = competition.get("competitors")?.as_array()?;
    let home = competitors
        .iter()
        .find(|c| c.get("homeAway").and_then(Value::as_str) == Some("home"))?;
    let away = competitors
        .iter()
        .find(|c| c.get("homeAway").and_then(Value::as_str) == Some("away"))?;

    let status = competition.get("status")?;
    let game_status = status_from_espn(status.get("type")?.get("state")?.as_str()?);

    // Before kickoff ESPN often omits scores; once play starts a missing score
    // would read as a real 0-0 and trigger a bogus update.
    let (home_score, away_score) = match (score(home), score(away)) {
        (Some(h), Some(a)) => (h, a),
        _ if game_status == GameStatus::Scheduled => (0, 0),
        _ => return None,
    };

    let period = match status.get("period") {
        None => 0,
        Some(p) => u32::try_from(p.as_u64()?).ok()?,
    };

    Some(GameState {
        game_id: game_id.to_string(),
        sport,
        home_team: team_name(home)?,
        away_team: team_name(away)?,
        home_score,
        away_score,
        period,
        status: game_status,
        clock: status
            .get("displayClock")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

fn team_name(competitor: &Value) -> Option<String> {
    let team = competitor.get("team")?;
    team.get("displayName")
        .or_else(|| team.get("name"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// ESPN sends scores as strings on most endpoints and as numbers on a few.
/// `None` when the score is absent or unreadable.
fn score(competitor: &Value) -> Option<u32> {
    match competitor.get("score")? {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => u32::try_from(n.as_u64()?).ok(),
        _ => None,
    }
}

fn status_from_espn(state: &str) -> GameStatus {
    match state {
        "in" => GameStatus::Live,
        "post" => GameStatus::Final,
        _ => GameStatus::Scheduled,
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn competition(state: &str, period: u64, home: &str, away: &str) -> Value {
        json!({
            "competitors": [
                { "homeAway": "home", "score": home, "team": { "displayName": "Boston Celtics" } },
                { "homeAway": "away", "score": away, "team": { "displayName": "New York Knicks" } }
            ],
            "status": {
                "period": period,
                "displayClock": "7:42",
                "type": { "state": state }
            }
        })
    }

    #[test]
    fn parse_live_summary() {
        let body = json!({ "header": { "competitions": [competition("in", 2, "52", "48")] } });
        let game = parse_summary(&body, Sport::Nba, "401").unwrap();
        assert_eq!(game.game_id, "401");
        assert_eq!(game.home_team, "Boston Celtics");
        assert_eq!(game.away_team, "New York Knicks");
        assert_eq!(game.home_score, 52);
        assert_eq!(game.away_score, 48);
        assert_eq!(game.period, 2);
        assert_eq!(game.status, GameStatus::Live);
        assert_eq!(game.clock, "7:42");
    }

    #[test]
    fn parse_summary_maps_pre_and_post_states() {
        let pre = json!({ "header": { "competitions": [competition("pre", 0, "0", "0")] } });
        let post = json!({ "header": { "competitions": [competition("post", 4, "101", "99")] } });
        assert_eq!(
            parse_summary(&pre, Sport::Nba, "1").unwrap().status,
            GameStatus::Scheduled
        );
        assert_eq!(
            parse_summary(&post, Sport::Nba, "1").unwrap().status,
            GameStatus::Final
        );
    }

    #[test]
    fn parse_summary_accepts_numeric_scores() {
        let body = json!({ "header": { "competitions": [{
            "competitors": [
                { "homeAway": "home", "score": 3, "team": { "name": "Arsenal" } },
                { "homeAway": "away", "score": 1, "team": { "name": "Inter" } }
            ],
            "status": { "period": 2, "type": { "state": "in" } }
        }] } });
        let game = parse_summary(&body, Sport::Ucl, "9").unwrap();
        assert_eq!(game.home_score, 3);
        assert_eq!(game.away_score, 1);
        assert_eq!(game.home_team, "Arsenal");
        assert!(game.clock.is_empty());
    }

    #[test]
    fn parse_summary_missing_competitors() {
        let body = json!({ "header": { "competitions": [{ "status": {} }] } });
        assert!(parse_summary(&body, Sport::Nba, "1").is_none());
        assert!(parse_summary(&json!({}), Sport::Nba, "1").is_none());
    }

    #[test]
    fn live_game_without_readable_scores_is_rejected() {
        let body = json!({ "header": { "competitions": [{
            "competitors": [
                { "homeAway": "home", "score": "", "team": { "name": "Home" } },
                { "homeAway": "away", "team": { "name": "Away" } }
            ],
            "status": { "period": 2, "type": { "state": "in" } }
        }] } });
        assert!(parse_summary(&body, Sport::Nba, "1").is_none());

        let final_game = json!({ "header": { "competitions": [{
            "competitors": [
                { "homeAway": "home", "score": "abc", "team": { "name": "Home" } },
                { "homeAway": "away", "score": "3", "team": { "name": "Away" } }
            ],
            "status": { "period": 4, "type": { "state": "post" } }
        }] } });
        assert!(parse_summary(&final_game, Sport::Nfl, "2").is_none());
    }

    #[test]
    fn scheduled_game_without_scores_reads_as_zero() {
        let body = json!({ "header": { "competitions": [{
            "competitors": [
                { "homeAway": "home", "team": { "name": "Home" } },
                { "homeAway": "away", "team": { "name": "Away" } }
            ],
            "status": { "type": { "state": "pre" } }
        }] } });
        let game = parse_summary(&body, Sport::Nba, "1").unwrap();
        assert_eq!((game.home_score, game.away_score, game.period), (0, 0, 0));
        assert_eq!(game.status, GameStatus::Scheduled);
    }

    #[test]
    fn out_of_range_numbers_are_rejected() {
        let body = json!({ "header": { "competitions": [{
            "competitors": [
                { "homeAway": "home", "score": 5_000_000_000u64, "team": { "name": "Home" } },
                { "homeAway": "away", "score": 1, "team": { "name": "Away" } }
            ],
            "status": { "period": 1, "type": { "state": "in" } }
        }] } });
        assert!(parse_summary(&body, Sport::Ucl, "1").is_none());
    }

    #[test]
    fn parse_scoreboard_skips_broken_events() {
        let body = json!({ "events": [
            { "id": "a", "competitions": [competition("in", 1, "10", "8")] },
            { "id": "b", "competitions": [{ "competitors": [] }] },
            { "id": "c", "competitions": [competition("pre", 0, "0", "0")] }
        ] });
        let games = parse_scoreboard(&body, Sport::Nba);
        let ids: Vec<&str> = games.iter().map(|g| g.game_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn parse_scoreboard_without_events_is_empty() {
        assert!(parse_scoreboard(&json!({ "leagues": [] }), Sport::Nfl).is_empty());
    }
}

// Chat text for decided events.

use super::decision::EventKind;
use crate::game::GameState;

/// Render the chat message for `kind` about `game`.
///
/// The first line is always the score line; the second line depends on the
/// event.
pub fn format_message(game: &GameState, kind: EventKind) -> String {
    let suffix = match kind {
        EventKind::GameStart => "Game started!".to_string(),
        EventKind::GameEnd => "FINAL".to_string(),
        EventKind::QuarterEnd => {
            // The period that just ended is the one before the current period.
            let ended = game.period.saturating_sub(1).max(1);
            format!("End of {}", game.sport.period_label(ended))
        }
        EventKind::Score => {
            let label = game.sport.period_label(game.period);
            if game.clock.is_empty() {
                label
            } else {
                format!("{label} {}", game.clock)
            }
        }
    };

    format!("{}\n{}", game.score_line(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GameStatus, Sport};

    fn game(sport: Sport, period: u32, clock: &str) -> GameState {
        GameState {
            game_id: "g".into(),
            sport,
            home_team: "Boston Celtics".into(),
            away_team: "New York Knicks".into(),
            home_score: 52,
            away_score: 48,
            period,
            status: GameStatus::Live,
            clock: clock.into(),
        }
    }

    #[test]
    fn score_update_has_teams_scores_and_clock() {
        let text = format_message(&game(Sport::Nba, 2, "7:42"), EventKind::Score);
        assert!(text.contains("New York Knicks 48 - 52 Boston Celtics"));
        assert!(text.ends_with("\nQ2 7:42"));
    }

    #[test]
    fn score_update_without_clock() {
        let text = format_message(&game(Sport::Nba, 3, ""), EventKind::Score);
        assert!(text.ends_with("\nQ3"));
    }

    #[test]
    fn quarter_end_names_the_finished_period() {
        let text = format_message(&game(Sport::Nba, 3, "12:00"), EventKind::QuarterEnd);
        assert!(text.ends_with("End of Q2"));

        let text = format_message(&game(Sport::Ucl, 2, "45:00"), EventKind::QuarterEnd);
        assert!(text.ends_with("End of 1st half"));

        let text = format_message(&game(Sport::Nfl, 5, "10:00"), EventKind::QuarterEnd);
        assert!(text.ends_with("End of Q4"));
    }

    #[test]
    fn start_and_final_banners() {
        let start = format_message(&game(Sport::Nfl, 1, "15:00"), EventKind::GameStart);
        assert!(start.ends_with("Game started!"));
        assert!(start.contains("52") && start.contains("48"));

        let end = format_message(&game(Sport::Nfl, 4, "0:00"), EventKind::GameEnd);
        assert!(end.ends_with("FINAL"));
    }
}

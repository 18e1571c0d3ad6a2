// SQLite persistence for notification settings and per-game notification state.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::error;

use crate::game::{GameStatus, Sport};
use crate::notify::decision::GameNotificationState;
use crate::notify::settings::NotificationSettings;

/// A state row together with the version it was read at. The version is the
/// token for [`Database::commit_state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredState {
    pub state: GameNotificationState,
    pub version: i64,
}

/// SQLite-backed store for notification settings and game notification state.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS notification_settings (
                company_id         TEXT NOT NULL,
                sport              TEXT NOT NULL,
                enabled            INTEGER NOT NULL DEFAULT 0,
                channel_ids        TEXT NOT NULL DEFAULT '[]',
                update_frequency   TEXT NOT NULL DEFAULT 'every_point',
                notify_game_start  INTEGER NOT NULL DEFAULT 1,
                notify_game_end    INTEGER NOT NULL DEFAULT 1,
                notify_quarter_end INTEGER NOT NULL DEFAULT 1,
                tracked_games      TEXT NOT NULL DEFAULT '[]',
                updated_at         TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                PRIMARY KEY (company_id, sport)
            );

            CREATE INDEX IF NOT EXISTS idx_notification_settings_enabled
                ON notification_settings(enabled);

            CREATE TABLE IF NOT EXISTS game_notification_state (
                company_id       TEXT NOT NULL,
                game_id          TEXT NOT NULL,
                sport            TEXT NOT NULL,
                home_score       INTEGER NOT NULL DEFAULT 0,
                away_score       INTEGER NOT NULL DEFAULT 0,
                period           INTEGER NOT NULL DEFAULT 0,
                status           TEXT NOT NULL DEFAULT '',
                last_notified_at TEXT,
                version          INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (company_id, game_id)
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// Every enabled settings row across all companies, ordered by company
    /// and sport. Rows that cannot be decoded are logged and left out.
    pub fn list_enabled_settings(&self) -> Result<Vec<NotificationSettings>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT company_id, sport, enabled, channel_ids, update_frequency,
                        notify_game_start, notify_game_end, notify_quarter_end, tracked_games
                 FROM notification_settings
                 WHERE enabled = 1
                 ORDER BY company_id, sport",
            )
            .context("failed to prepare list_enabled_settings query")?;

        let rows = stmt
            .query_map([], SettingsRow::from_row)
            .context("failed to query enabled settings")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map settings rows")?;

        // A row that fails to decode is skipped so other companies still run.
        let settings = rows
            .into_iter()
            .filter_map(|row| {
                let company_id = row.company_id.clone();
                match row.into_settings() {
                    Ok(settings) => Some(settings),
                    Err(e) => {
                        error!(
                            company_id = %company_id,
                            "skipping unreadable notification settings: {e:#}"
                        );
                        None
                    }
                }
            })
            .collect();
        Ok(settings)
    }

    /// Settings for a company and sport, created with defaults on first read.
    pub fn load_settings(&self, company_id: &str, sport: Sport) -> Result<NotificationSettings> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO notification_settings (company_id, sport) VALUES (?1, ?2)",
            params![company_id, sport.as_str()],
        )
        .context("failed to create default settings")?;

        let row = conn
            .query_row(
                "SELECT company_id, sport, enabled, channel_ids, update_frequency,
                        notify_game_start, notify_game_end, notify_quarter_end, tracked_games
                 FROM notification_settings
                 WHERE company_id = ?1 AND sport = ?2",
                params![company_id, sport.as_str()],
                SettingsRow::from_row,
            )
            .context("failed to load settings")?;
        row.into_settings()
    }

    /// Insert or replace the settings row for `settings.company_id` and
    /// `settings.sport`.
    pub fn save_settings(&self, settings: &NotificationSettings) -> Result<()> {
        let conn = self.conn();
        let channel_ids =
            serde_json::to_string(&settings.channel_ids).context("failed to serialize channels")?;
        let tracked_games = serde_json::to_string(&settings.tracked_games)
            .context("failed to serialize tracked games")?;

        conn.execute(
            "INSERT INTO notification_settings
                (company_id, sport, enabled, channel_ids, update_frequency,
                 notify_game_start, notify_game_end, notify_quarter_end, tracked_games)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(company_id, sport) DO UPDATE SET
                enabled            = excluded.enabled,
                channel_ids        = excluded.channel_ids,
                update_frequency   = excluded.update_frequency,
                notify_game_start  = excluded.notify_game_start,
                notify_game_end    = excluded.notify_game_end,
                notify_quarter_end = excluded.notify_quarter_end,
                tracked_games      = excluded.tracked_games,
                updated_at         = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![
                settings.company_id,
                settings.sport.as_str(),
                settings.enabled,
                channel_ids,
                settings.update_frequency.as_str(),
                settings.notify_game_start,
                settings.notify_game_end,
                settings.notify_quarter_end,
                tracked_games,
            ],
        )
        .context("failed to save settings")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Game notification state
    // ------------------------------------------------------------------

    /// Load the state row for (company, game), inserting the zeroed default
    /// row on first sight.
    pub fn load_or_init_state(
        &self,
        company_id: &str,
        game_id: &str,
        sport: Sport,
    ) -> Result<StoredState> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO game_notification_state (company_id, game_id, sport)
             VALUES (?1, ?2, ?3)",
            params![company_id, game_id, sport.as_str()],
        )
        .context("failed to initialize game notification state")?;

        read_state(&conn, company_id, game_id)?
            .context("game notification state missing after initialization")
    }

    /// Read a state row without creating it.
    pub fn get_state(&self, company_id: &str, game_id: &str) -> Result<Option<StoredState>> {
        let conn = self.conn();
        read_state(&conn, company_id, game_id)
    }

    /// Write `state` only if the row is still at `expected_version`, bumping
    /// the version. Returns `false` when another writer got there first.
    pub fn commit_state(
        &self,
        company_id: &str,
        game_id: &str,
        expected_version: i64,
        state: &GameNotificationState,
    ) -> Result<bool> {
        let conn = self.conn();
        let changed = conn
            .execute(
                "UPDATE game_notification_state
                 SET home_score = ?1,
                     away_score = ?2,
                     period = ?3,
                     status = ?4,
                     last_notified_at = ?5,
                     version = version + 1
                 WHERE company_id = ?6 AND game_id = ?7 AND version = ?8",
                params![
                    state.home_score,
                    state.away_score,
                    state.period,
                    state.status.map(GameStatus::as_str).unwrap_or_default(),
                    state.last_notified_at.map(|t| t.to_rfc3339()),
                    company_id,
                    game_id,
                    expected_version,
                ],
            )
            .context("failed to commit game notification state")?;
        Ok(changed == 1)
    }

    /// Delete state rows of `company_id`/`sport` whose game is not in
    /// `tracked`. Returns the number of rows removed.
    pub fn prune_untracked_states(
        &self,
        company_id: &str,
        sport: Sport,
        tracked: &[String],
    ) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin prune transaction")?;

        let stored: Vec<String> = {
            let mut stmt = tx
                .prepare(
                    "SELECT game_id FROM game_notification_state
                     WHERE company_id = ?1 AND sport = ?2",
                )
                .context("failed to prepare prune query")?;
            let ids = stmt
                .query_map(params![company_id, sport.as_str()], |row| row.get(0))
                .context("failed to query stored game ids")?
                .collect::<std::result::Result<Vec<String>, _>>()
                .context("failed to map stored game ids")?;
            ids
        };

        let tracked: HashSet<&str> = tracked.iter().map(String::as_str).collect();
        let mut removed = 0;
        for game_id in stored.iter().filter(|id| !tracked.contains(id.as_str())) {
            removed += tx
                .execute(
                    "DELETE FROM game_notification_state WHERE company_id = ?1 AND game_id = ?2",
                    params![company_id, game_id],
                )
                .context("failed to delete untracked game state")?;
        }

        tx.commit().context("failed to commit prune")?;
        Ok(removed)
    }
}

/// Raw settings columns; converted outside the rusqlite closure so parse
/// failures surface as `anyhow` errors with context.
struct SettingsRow {
    company_id: String,
    sport: String,
    enabled: bool,
    channel_ids: String,
    update_frequency: String,
    notify_game_start: bool,
    notify_game_end: bool,
    notify_quarter_end: bool,
    tracked_games: String,
}

impl SettingsRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            company_id: row.get(0)?,
            sport: row.get(1)?,
            enabled: row.get(2)?,
            channel_ids: row.get(3)?,
            update_frequency: row.get(4)?,
            notify_game_start: row.get(5)?,
            notify_game_end: row.get(6)?,
            notify_quarter_end: row.get(7)?,
            tracked_games: row.get(8)?,
        })
    }

    fn into_settings(self) -> Result<NotificationSettings> {
        let company = self.company_id.clone();
        Ok(NotificationSettings {
            sport: self
                .sport
                .parse()
                .map_err(|e: String| anyhow!(e))
                .with_context(|| format!("bad sport in settings for {company}"))?,
            enabled: self.enabled,
            channel_ids: serde_json::from_str(&self.channel_ids)
                .with_context(|| format!("bad channel_ids in settings for {company}"))?,
            update_frequency: self
                .update_frequency
                .parse()
                .map_err(|e: String| anyhow!(e))
                .with_context(|| format!("bad update_frequency in settings for {company}"))?,
            notify_game_start: self.notify_game_start,
            notify_game_end: self.notify_game_end,
            notify_quarter_end: self.notify_quarter_end,
            tracked_games: serde_json::from_str(&self.tracked_games)
                .with_context(|| format!("bad tracked_games in settings for {company}"))?,
            company_id: self.company_id,
        })
    }
}

fn read_state(conn: &Connection, company_id: &str, game_id: &str) -> Result<Option<StoredState>> {
    conn.query_row(
        "SELECT home_score, away_score, period, status, last_notified_at, version
         FROM game_notification_state
         WHERE company_id = ?1 AND game_id = ?2",
        params![company_id, game_id],
        |row| {
            let status: String = row.get(3)?;
            let last_notified_at: Option<String> = row.get(4)?;
            Ok(StoredState {
                state: GameNotificationState {
                    home_score: row.get(0)?,
                    away_score: row.get(1)?,
                    period: row.get(2)?,
                    status: GameStatus::from_stored(&status),
                    last_notified_at: last_notified_at.as_deref().and_then(parse_timestamp),
                },
                version: row.get(5)?,
            })
        },
    )
    .optional()
    .context("failed to load game notification state")
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::settings::UpdateFrequency;

    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn enabled(company: &str, sport: Sport, games: &[&str]) -> NotificationSettings {
        NotificationSettings {
            enabled: true,
            channel_ids: vec!["chan_1".into(), "chan_2".into()],
            tracked_games: games.iter().map(|g| g.to_string()).collect(),
            ..NotificationSettings::new(company, sport)
        }
    }

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap();
        assert!(tables.contains(&"notification_settings".to_string()));
        assert!(tables.contains(&"game_notification_state".to_string()));
    }

    #[test]
    fn load_settings_creates_defaults_on_first_read() {
        let db = test_db();
        let settings = db.load_settings("biz_1", Sport::Nba).unwrap();
        assert_eq!(settings, NotificationSettings::new("biz_1", Sport::Nba));

        // Created rows are disabled, so they are not enumerated.
        assert!(db.list_enabled_settings().unwrap().is_empty());
    }

    #[test]
    fn unreadable_settings_row_is_skipped() {
        let db = test_db();
        db.save_settings(&enabled("biz_good", Sport::Nba, &["401"])).unwrap();
        db.conn()
            .execute(
                "INSERT INTO notification_settings (company_id, sport, enabled, tracked_games)
                 VALUES ('biz_bad', 'nba', 1, 'not json')",
                [],
            )
            .unwrap();

        let listed = db.list_enabled_settings().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].company_id, "biz_good");
    }

    #[test]
    fn save_and_load_settings_round_trip() {
        let db = test_db();
        let settings = NotificationSettings {
            update_frequency: UpdateFrequency::EveryMinute,
            notify_game_end: false,
            ..enabled("biz_1", Sport::Nfl, &["401", "402"])
        };
        db.save_settings(&settings).unwrap();
        assert_eq!(db.load_settings("biz_1", Sport::Nfl).unwrap(), settings);
    }

    #[test]
    fn save_settings_overwrites_previous_value() {
        let db = test_db();
        db.save_settings(&enabled("biz_1", Sport::Nba, &["1"])).unwrap();
        db.save_settings(&enabled("biz_1", Sport::Nba, &["2", "3"])).unwrap();
        let loaded = db.load_settings("biz_1", Sport::Nba).unwrap();
        assert_eq!(loaded.tracked_games, vec!["2", "3"]);
    }

    #[test]
    fn list_enabled_settings_filters_and_orders() {
        let db = test_db();
        db.save_settings(&enabled("biz_b", Sport::Nba, &["1"])).unwrap();
        db.save_settings(&enabled("biz_a", Sport::Ucl, &["2"])).unwrap();
        db.save_settings(&NotificationSettings::new("biz_c", Sport::Nba)).unwrap();

        let listed = db.list_enabled_settings().unwrap();
        let keys: Vec<(&str, Sport)> = listed
            .iter()
            .map(|s| (s.company_id.as_str(), s.sport))
            .collect();
        assert_eq!(keys, vec![("biz_a", Sport::Ucl), ("biz_b", Sport::Nba)]);
    }

    #[test]
    fn state_is_zeroed_on_first_sight() {
        let db = test_db();
        assert!(db.get_state("biz", "g1").unwrap().is_none());

        let stored = db.load_or_init_state("biz", "g1", Sport::Nba).unwrap();
        assert_eq!(stored.state, GameNotificationState::default());
        assert_eq!(stored.version, 0);
        assert!(db.get_state("biz", "g1").unwrap().is_some());
    }

    #[test]
    fn commit_state_round_trips_and_bumps_version() {
        let db = test_db();
        let stored = db.load_or_init_state("biz", "g1", Sport::Nba).unwrap();
        let now = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
            .unwrap()
            .with_timezone(&Utc);
        let next = GameNotificationState {
            home_score: 52,
            away_score: 48,
            period: 2,
            status: Some(GameStatus::Live),
            last_notified_at: Some(now),
        };

        assert!(db.commit_state("biz", "g1", stored.version, &next).unwrap());

        let reloaded = db.get_state("biz", "g1").unwrap().unwrap();
        assert_eq!(reloaded.state, next);
        assert_eq!(reloaded.version, 1);
    }

    #[test]
    fn commit_state_rejects_stale_version() {
        let db = test_db();
        let stored = db.load_or_init_state("biz", "g1", Sport::Nba).unwrap();
        let next = GameNotificationState {
            status: Some(GameStatus::Live),
            period: 1,
            ..Default::default()
        };

        assert!(db.commit_state("biz", "g1", stored.version, &next).unwrap());
        // A second writer holding the same read loses.
        assert!(!db.commit_state("biz", "g1", stored.version, &next).unwrap());
        assert_eq!(db.get_state("biz", "g1").unwrap().unwrap().version, 1);
    }

    #[test]
    fn state_is_scoped_per_company() {
        let db = test_db();
        let a = db.load_or_init_state("biz_a", "g1", Sport::Nba).unwrap();
        let next = GameNotificationState {
            home_score: 3,
            ..Default::default()
        };
        db.commit_state("biz_a", "g1", a.version, &next).unwrap();

        let b = db.load_or_init_state("biz_b", "g1", Sport::Nba).unwrap();
        assert_eq!(b.state, GameNotificationState::default());
    }

    #[test]
    fn prune_removes_only_untracked_games_of_that_sport() {
        let db = test_db();
        db.load_or_init_state("biz", "keep", Sport::Nba).unwrap();
        db.load_or_init_state("biz", "drop", Sport::Nba).unwrap();
        db.load_or_init_state("biz", "other_sport", Sport::Nfl).unwrap();
        db.load_or_init_state("other_biz", "drop", Sport::Nba).unwrap();

        let removed = db
            .prune_untracked_states("biz", Sport::Nba, &["keep".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        assert!(db.get_state("biz", "keep").unwrap().is_some());
        assert!(db.get_state("biz", "drop").unwrap().is_none());
        assert!(db.get_state("biz", "other_sport").unwrap().is_some());
        assert!(db.get_state("other_biz", "drop").unwrap().is_some());
    }
}

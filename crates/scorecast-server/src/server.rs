// HTTP trigger surface: cron endpoint, scoreboard read path, settings admin.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use scorecast_core::game::{GameState, Sport};
use scorecast_core::notify::settings::{NotificationSettings, UpdateFrequency};
use scorecast_core::notify::{BatchReport, Notifier};

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, String)>;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub notifier: Arc<Notifier>,
    /// Bearer token the cron endpoint requires; `None` leaves it open.
    pub cron_secret: Option<String>,
}

impl AppState {
    pub fn new(notifier: Arc<Notifier>, cron_secret: Option<String>) -> Self {
        Self {
            notifier,
            cron_secret: cron_secret.filter(|s| !s.trim().is_empty()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/cron/notifications", post(run_cron))
        .route("/api/games/{sport}", get(scoreboard))
        .route(
            "/api/settings/{company_id}/{sport}",
            get(get_settings).put(put_settings),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /healthz
async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /api/cron/notifications
async fn run_cron(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<BatchReport> {
    ensure_cron_authorized(state.cron_secret.as_deref(), &headers)?;

    let report = state.notifier.run_batch(Utc::now()).await.map_err(|e| {
        error!("cron batch failed: {e:#}");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("batch failed: {e}"))
    })?;
    Ok(Json(report))
}

/// GET /api/games/{sport}
///
/// Also kicks off a background batch unless one is already running, so live
/// viewers keep notifications flowing between cron runs.
async fn scoreboard(
    State(state): State<AppState>,
    Path(sport): Path<String>,
) -> ApiResult<Vec<GameState>> {
    let sport = parse_sport(&sport)?;

    let games = state
        .notifier
        .source()
        .fetch_scoreboard(sport)
        .await
        .map_err(|e| {
            warn!(%sport, "scoreboard fetch failed: {e}");
            (StatusCode::BAD_GATEWAY, format!("scoreboard unavailable: {e}"))
        })?;

    let notifier = state.notifier.clone();
    tokio::spawn(async move {
        match notifier.try_run_batch(Utc::now()).await {
            Some(Ok(report)) => info!(
                sent = report.notifications_sent,
                "opportunistic batch complete"
            ),
            Some(Err(e)) => error!("opportunistic batch failed: {e:#}"),
            None => {}
        }
    });

    Ok(Json(games))
}

/// GET /api/settings/{company_id}/{sport}
async fn get_settings(
    State(state): State<AppState>,
    Path((company_id, sport)): Path<(String, String)>,
) -> ApiResult<NotificationSettings> {
    let sport = parse_sport(&sport)?;
    let settings = state
        .notifier
        .db()
        .load_settings(&company_id, sport)
        .map_err(internal)?;
    Ok(Json(settings))
}

/// Body of a settings save. Company and sport come from the path.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub enabled: bool,
    #[serde(default)]
    pub channel_ids: Vec<String>,
    #[serde(default)]
    pub update_frequency: UpdateFrequency,
    #[serde(default = "default_true")]
    pub notify_game_start: bool,
    #[serde(default = "default_true")]
    pub notify_game_end: bool,
    #[serde(default = "default_true")]
    pub notify_quarter_end: bool,
    #[serde(default)]
    pub tracked_games: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// PUT /api/settings/{company_id}/{sport}
async fn put_settings(
    State(state): State<AppState>,
    Path((company_id, sport)): Path<(String, String)>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<NotificationSettings> {
    let sport = parse_sport(&sport)?;

    let mut settings = NotificationSettings {
        company_id,
        sport,
        enabled: update.enabled,
        channel_ids: update.channel_ids,
        update_frequency: update.update_frequency,
        notify_game_start: update.notify_game_start,
        notify_game_end: update.notify_game_end,
        notify_quarter_end: update.notify_quarter_end,
        tracked_games: update.tracked_games,
    };
    settings.normalize();
    settings
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    state.notifier.db().save_settings(&settings).map_err(internal)?;
    info!(
        company_id = %settings.company_id,
        sport = %settings.sport,
        enabled = settings.enabled,
        games = settings.tracked_games.len(),
        "settings saved"
    );
    Ok(Json(settings))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_sport(raw: &str) -> Result<Sport, (StatusCode, String)> {
    raw.parse().map_err(|e: String| (StatusCode::BAD_REQUEST, e))
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    error!("request failed: {e:#}");
    (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
}

fn ensure_cron_authorized(
    expected: Option<&str>,
    headers: &HeaderMap,
) -> Result<(), (StatusCode, String)> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    if token == Some(expected) {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "unauthorized".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

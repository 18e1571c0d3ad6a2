// scorecast entry point.
//
// Startup sequence:
// 1. Initialize tracing
// 2. Load config
// 3. Open database
// 4. Build game sources and chat client
// 5. Spawn the polling scheduler (unless disabled)
// 6. Serve the HTTP trigger surface until Ctrl+C

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use scorecast_core::config;
use scorecast_core::db::Database;
use scorecast_core::game::source::GameSources;
use scorecast_core::notify::dispatch::ChatClient;
use scorecast_core::notify::{Notifier, NotifierOptions};
use scorecast_server::{scheduler, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("scorecast starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    let bind = config.bind_addr().context("invalid bind address")?;
    info!(
        "Config loaded: poll every {}s, up to {} games in parallel",
        config.scheduler.poll_interval_secs, config.scheduler.max_concurrent_games
    );

    // 3. Open database
    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    // 4. Game sources and chat client
    let sources =
        GameSources::from_config(&config.sources).context("failed to build game sources")?;
    let chat = ChatClient::from_config(&config).context("failed to build chat client")?;
    match &chat {
        ChatClient::Active(_) => info!("Chat client initialized (API key configured)"),
        ChatClient::Disabled => warn!("Chat client disabled (no API key); posts will fail"),
    }

    let notifier = Arc::new(Notifier::new(
        Arc::new(db),
        Arc::new(sources),
        Arc::new(chat),
        NotifierOptions::from_config(&config),
    ));

    // 5. Polling scheduler
    let scheduler_handle = if config.scheduler.poll_interval_secs > 0 {
        let period = Duration::from_secs(config.scheduler.poll_interval_secs);
        Some(tokio::spawn(scheduler::run(notifier.clone(), period)))
    } else {
        info!("Internal scheduler disabled; batches run only when triggered");
        None
    };

    // 6. HTTP surface
    let state = server::AppState::new(notifier, config.credentials.cron_secret.clone());
    if state.cron_secret.is_none() {
        warn!("No cron_secret configured; the cron endpoint is unauthenticated");
    }
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!("Listening on http://{bind}");

    axum::serve(listener, server::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    if let Some(handle) = scheduler_handle {
        handle.abort();
    }

    info!("scorecast shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {e}");
    }
}

/// Initialize tracing to stdout.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("scorecast=info,scorecast_core=info,scorecast_server=info,warn")
            }),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}

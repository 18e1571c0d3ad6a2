// Configuration loading and parsing (scorecast.toml, credentials.toml).

use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing config file {}", .path.display())]
    Missing { path: PathBuf },

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid `{field}`: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("no defaults/ or config/ under {}", .0.display())]
    NoConfigDir(PathBuf),
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub db_path: String,
    pub scheduler: SchedulerConfig,
    pub sources: SourcesConfig,
    pub chat: ChatConfig,
    pub retention: RetentionConfig,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// scorecast.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire scorecast.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ScorecastFile {
    server: ServerConfig,
    database: DatabaseSection,
    scheduler: SchedulerConfig,
    sources: SourcesConfig,
    chat: ChatConfig,
    #[serde(default)]
    retention: RetentionConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the trigger/HTTP surface binds to, e.g. `127.0.0.1:3000`.
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduled batch runs. `0` leaves triggering to cron.
    pub poll_interval_secs: u64,
    pub max_concurrent_games: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub espn_base_url: String,
    pub request_timeout_secs: u64,
    pub test_game_prefix: String,
    pub test_period_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    pub prune_untracked_states: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            prune_untracked_states: true,
        }
    }
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub chat_api_key: Option<String>,
    /// Bearer token required on the cron trigger when set.
    pub cron_secret: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/scorecast.toml` and
/// (optionally) `config/credentials.toml`, relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does that first.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    let file: ScorecastFile = read_toml(&config_dir.join("scorecast.toml"))?;

    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        read_toml(&credentials_path)?
    } else {
        CredentialsConfig::default()
    };

    let config = Config {
        server: file.server,
        db_path: file.database.path,
        scheduler: file.scheduler,
        sources: file.sources,
        chat: file.chat,
        retention: file.retention,
        credentials,
    };
    validate(&config)?;
    Ok(config)
}

/// Copy every file in `defaults/` that has no counterpart in `config/` yet.
/// `*.example` files are templates and stay behind. Returns the new paths.
///
/// Without a `defaults/` directory an existing `config/` is used as is.
pub fn seed_config_dir(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");
    if !defaults_dir.is_dir() {
        if config_dir.is_dir() {
            return Ok(Vec::new());
        }
        return Err(ConfigError::NoConfigDir(base_dir.to_path_buf()));
    }
    fs::create_dir_all(&config_dir).map_err(io_error(&config_dir))?;

    let mut seeded = Vec::new();
    for entry in fs::read_dir(&defaults_dir).map_err(io_error(&defaults_dir))? {
        let src = entry.map_err(io_error(&defaults_dir))?.path();
        if !src.is_file() || src.extension().is_some_and(|ext| ext == "example") {
            continue;
        }
        let Some(name) = src.file_name() else {
            continue;
        };
        let dest = config_dir.join(name);
        if dest.exists() {
            continue;
        }
        fs::copy(&src, &dest).map_err(io_error(&dest))?;
        seeded.push(dest);
    }
    Ok(seeded)
}

/// Load config relative to the working directory, seeding `config/` from
/// `defaults/` first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(io_error(Path::new(".")))?;
    seed_config_dir(&cwd)?;
    load_config_from(&cwd)
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError {
    let path = path.to_path_buf();
    move |source| ConfigError::Io { path, source }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => ConfigError::Missing {
            path: path.to_path_buf(),
        },
        _ => io_error(path)(source),
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

impl Config {
    /// Parsed bind address. Validated at load time.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_bind_addr(&self.server.bind)
    }
}

fn parse_bind_addr(bind: &str) -> Result<SocketAddr, ConfigError> {
    bind.parse()
        .map_err(|_| ConfigError::invalid("server.bind", format!("not a socket address: {bind}")))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    parse_bind_addr(&config.server.bind)?;

    if config.db_path.trim().is_empty() {
        return Err(ConfigError::invalid("database.path", "must not be empty"));
    }
    if config.scheduler.max_concurrent_games == 0 {
        return Err(ConfigError::invalid("scheduler.max_concurrent_games", "must be at least 1"));
    }
    if config.sources.test_game_prefix.is_empty() {
        return Err(ConfigError::invalid("sources.test_game_prefix", "must not be empty"));
    }

    let durations = [
        ("sources.request_timeout_secs", config.sources.request_timeout_secs),
        ("sources.test_period_secs", config.sources.test_period_secs),
        ("chat.request_timeout_secs", config.chat.request_timeout_secs),
    ];
    match durations.into_iter().find(|(_, secs)| *secs == 0) {
        Some((field, _)) => Err(ConfigError::invalid(field, "must be at least 1 second")),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

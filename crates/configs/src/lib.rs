//! # Settings
//!
//! Layered configuration: built-in defaults, then `config/default.toml`,
//! then `config/{RUN_ENV}.toml`, then `FORUM__*` environment variables
//! (`FORUM__PAGINATION__DEFAULT_LIMIT=50`). A `.env` file is read first
//! when present.

use config::{Config, Environment, File, FileFormat};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationSettings {
    /// Ban count at which a ban becomes permanent.
    pub max_ban_count: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationSettings {
    pub default_offset: u64,
    pub default_limit: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForumSettings {
    pub max_name_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info,services=debug`.
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawDatabase {
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSettings {
    moderation: ModerationSettings,
    pagination: PaginationSettings,
    forum: ForumSettings,
    log: LogSettings,
    #[serde(default)]
    database: RawDatabase,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub moderation: ModerationSettings,
    pub pagination: PaginationSettings,
    pub forum: ForumSettings,
    pub log: LogSettings,
    pub database: DatabaseSettings,
}

const ENV_PREFIX: &str = "FORUM";

fn with_defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
    Ok(Config::builder()
        .set_default("moderation.max_ban_count", 3)?
        .set_default("pagination.default_offset", 0)?
        .set_default("pagination.default_limit", 20)?
        .set_default("forum.max_name_length", 128)?
        .set_default("log.filter", "info")?
        .set_default("log.json", false)?)
}

impl Settings {
    /// Loads settings relative to the working directory.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let run_env = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());
        Self::load_from(Path::new("config"), &run_env)
    }

    pub fn load_from(dir: &Path, run_env: &str) -> Result<Self, ConfigError> {
        debug!(dir = %dir.display(), run_env, "loading settings");
        let config = with_defaults()?
            .add_source(File::with_name(&dir.join("default").to_string_lossy()).required(false))
            .add_source(File::with_name(&dir.join(run_env).to_string_lossy()).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Self::from_config(config)
    }

    /// Defaults overlaid with a single TOML document. No files, no environment.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config = with_defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        let raw: RawSettings = config.try_deserialize()?;
        if raw.pagination.default_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "pagination.default_limit",
                reason: "must be positive".into(),
            });
        }
        if raw.forum.max_name_length == 0 {
            return Err(ConfigError::Invalid {
                key: "forum.max_name_length",
                reason: "must be positive".into(),
            });
        }
        Ok(Self {
            moderation: raw.moderation,
            pagination: raw.pagination,
            forum: raw.forum,
            log: raw.log,
            database: DatabaseSettings {
                url: raw.database.url.filter(|u| !u.is_empty()).map(SecretString::from),
            },
        })
    }
}

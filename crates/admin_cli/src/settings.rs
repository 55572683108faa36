//! Settings for the admin CLI, read from `settings.toml` (optional) and
//! `FUNDLEDGER_*` environment variables, e.g. `FUNDLEDGER_DATABASE__URL`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

const DEFAULT_SETTINGS_PATH: &str = "settings";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub url: String,
    /// Used when the primary database cannot be reached.
    pub backup_url: Option<String>,
    pub connect_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite:./fundledger.db?mode=rwc".to_string(),
            backup_url: None,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Owner key of the admin fund.
    pub admin_owner: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            admin_owner: engine::DEFAULT_ADMIN_OWNER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub engine: EngineSettings,
    pub log: LogSettings,
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path.unwrap_or(DEFAULT_SETTINGS_PATH)).required(false))
            .add_source(
                Environment::with_prefix("FUNDLEDGER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }
}

use std::str::FromStr;

use config::Config;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Deployment target for the binary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(ConfigError::UnknownEnvironment {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown environment {value:?} (expected dev or prod)")]
    UnknownEnvironment { value: String },
    #[error(transparent)]
    Load(#[from] config::ConfigError),
}

/// Application knobs, loaded from an optional `pullbox.toml` plus
/// `PULLBOX_`-prefixed environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: String,
    #[serde(default = "default_sweep_interval_s")]
    pub sweep_interval_s: u64,
    #[serde(default = "default_status_interval_s")]
    pub status_interval_s: u64,
    #[serde(default = "default_max_entries_per_user")]
    pub default_max_entries_per_user: u32,
    #[serde(default = "default_seed_demo")]
    pub seed_demo: bool,
    #[serde(default = "default_seed_balance_cents")]
    pub seed_balance_cents: i64,
}

fn default_snapshot_path() -> String {
    "pullbox.state.json".to_string()
}

fn default_sweep_interval_s() -> u64 {
    60
}

fn default_status_interval_s() -> u64 {
    30
}

fn default_max_entries_per_user() -> u32 {
    4
}

fn default_seed_demo() -> bool {
    true
}

fn default_seed_balance_cents() -> i64 {
    50_000
}

impl AppConfig {
    pub fn load(env: Environment) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::with_name("pullbox.toml").required(false))
            .add_source(config::Environment::with_prefix("PULLBOX"))
            .build()?;
        let mut cfg: Self = settings.try_deserialize()?;
        if env == Environment::Dev && cfg.snapshot_path == default_snapshot_path() {
            cfg.snapshot_path = "pullbox.dev.state.json".to_string();
        }
        Ok(cfg)
    }
}

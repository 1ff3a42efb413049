use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::clipboard::monitor::DEFAULT_POLL_INTERVAL_MS;
use crate::storage::database::DEFAULT_HISTORY_LIMIT;

/// Default sync server URL.
/// Override at build time: SYNC_SERVER_URL=https://example.com cargo build
pub const SYNC_SERVER_URL: &str = match option_env!("SYNC_SERVER_URL") {
    Some(url) => url,
    None => "http://localhost:3000",
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("no data directory available; set CLIPSYNC_DATA_DIR")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server_url: String,
    pub data_dir: PathBuf,
    /// Local history cap. Favorites are never trimmed.
    pub history_limit: u32,
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let data_dir = match lookup("CLIPSYNC_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .map(|dir| dir.join("clipsync"))
                .ok_or(ConfigError::NoDataDir)?,
        };

        Ok(Self {
            server_url: lookup("SYNC_SERVER_URL").unwrap_or_else(|| SYNC_SERVER_URL.to_string()),
            data_dir,
            history_limit: number(&lookup, "CLIPSYNC_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?,
            poll_interval: Duration::from_millis(number(
                &lookup,
                "CLIPSYNC_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
        })
    }
}

fn number<T: std::str::FromStr + PartialOrd + Default>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    match value.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(ConfigError::InvalidNumber { name, value }),
    }
}

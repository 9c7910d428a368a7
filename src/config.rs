use dotenvy::dotenv;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub api_url: String,
    pub events_url: String,
    pub token: Option<String>,
    pub page_size: u32,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub log_level: tracing::Level,
    pub log_dir: Option<PathBuf>,
    pub alerts_enabled: bool,
}

impl Config {
    /// Load `.env` (if any) and read settings from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_vars(&env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_url = get("INBOX_API_URL").ok_or(ConfigError::Missing("INBOX_API_URL"))?;
        let events_url = get("INBOX_EVENTS_URL").unwrap_or_else(|| default_events_url(&api_url));

        Ok(Self {
            events_url,
            token: get("INBOX_TOKEN"),
            page_size: parse_nonzero(get("INBOX_PAGE_SIZE"), "INBOX_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            poll_interval: Duration::from_millis(parse_nonzero(
                get("INBOX_POLL_INTERVAL_MS"),
                "INBOX_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            request_timeout: Duration::from_secs(parse_nonzero(
                get("INBOX_REQUEST_TIMEOUT_SECS"),
                "INBOX_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            log_level: parse_or(get("INBOX_LOG_LEVEL"), "INBOX_LOG_LEVEL", tracing::Level::INFO)?,
            log_dir: get("INBOX_LOG_DIR").map(PathBuf::from),
            alerts_enabled: parse_or(get("INBOX_ALERTS"), "INBOX_ALERTS", true)?,
            api_url,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

/// Numeric settings where zero would stall or break the session.
fn parse_nonzero<T>(raw: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
{
    let value = parse_or(raw.clone(), key, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            key,
            value: raw.unwrap_or_default(),
        });
    }
    Ok(value)
}

/// `<api>/notifications/ws` with the scheme switched to ws/wss.
fn default_events_url(api_url: &str) -> String {
    let base = api_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{base}/notifications/ws")
}

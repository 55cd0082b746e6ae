use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Datelike;

use crate::error::ImportError;

/// Public Course Planner user the Melbourne API accepts without a login.
pub const DEFAULT_MELBOURNE_USER_ID: &str = "910cb597-680c-4da6-b7b4-ed32b620ad33";

#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub batch_size: usize,
    pub inter_batch_delay: Duration,
    pub max_backoff: Duration,
    /// Zero means retry a throttled item forever.
    pub max_throttle_retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            inter_batch_delay: Duration::from_millis(10_000),
            max_backoff: Duration::from_millis(120_000),
            max_throttle_retries: 8,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ImportConfig {
    pub database_url: String,
    pub fetch: FetchConfig,
    pub base_year: i32,
    pub cache_dir: Option<PathBuf>,
    pub http_timeout: Duration,
    pub melbourne_user_id: String,
    pub sydney_bearer_token: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://catalogue.db".to_string(),
            fetch: FetchConfig::default(),
            base_year: chrono::Utc::now().year(),
            cache_dir: None,
            http_timeout: Duration::from_secs(60),
            melbourne_user_id: DEFAULT_MELBOURNE_USER_ID.to_string(),
            sydney_bearer_token: String::new(),
        }
    }
}

impl ImportConfig {
    pub fn new_from_env() -> Result<Self, ImportError> {
        let defaults = Self::default();

        let fetch = FetchConfig {
            batch_size: parse_var("IMPORT_BATCH_SIZE", defaults.fetch.batch_size)?,
            inter_batch_delay: Duration::from_millis(parse_var(
                "IMPORT_INTER_BATCH_DELAY_MS",
                defaults.fetch.inter_batch_delay.as_millis() as u64,
            )?),
            max_backoff: Duration::from_millis(parse_var(
                "IMPORT_MAX_BACKOFF_MS",
                defaults.fetch.max_backoff.as_millis() as u64,
            )?),
            max_throttle_retries: parse_var(
                "IMPORT_MAX_THROTTLE_RETRIES",
                defaults.fetch.max_throttle_retries,
            )?,
        };

        if fetch.batch_size == 0 {
            return Err(ImportError::Config(
                "IMPORT_BATCH_SIZE must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            fetch,
            base_year: parse_var("IMPORT_BASE_YEAR", defaults.base_year)?,
            cache_dir: env::var("IMPORT_CACHE_DIR")
                .ok()
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from),
            http_timeout: Duration::from_secs(parse_var(
                "IMPORT_HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )?),
            melbourne_user_id: env::var("MELBOURNE_USER_ID")
                .ok()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or(defaults.melbourne_user_id),
            sydney_bearer_token: env::var("SYDNEY_BEARER_TOKEN").unwrap_or_default(),
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ImportError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ImportError::Config(format!("{} is not a valid value: {}", key, raw))),
        _ => Ok(default),
    }
}

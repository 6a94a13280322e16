use std::env;
use std::time::Duration;

use tracing::info;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// WeCom-style incoming webhook. None disables delivery (dry runs, CI).
    pub webhook_url: Option<String>,

    /// SQLite database path (or `sqlite::memory:` for throwaway runs).
    pub database_url: String,

    /// Catalog listing URL; pages are addressed as `{url}?Page={n}`.
    pub catalog_url: String,

    /// How many listing pages to fetch per run.
    pub catalog_pages: u32,

    /// Case-insensitive substring filters. Empty = track every title.
    pub keywords: Vec<String>,

    /// Minimum spacing between consecutive webhook sends.
    pub min_send_interval: Duration,

    /// Max serialized JSON payload bytes the webhook accepts per message.
    pub payload_ceiling: usize,

    /// Attempts per chunk before it is marked failed.
    pub max_send_attempts: u32,

    /// Send a one-line notice even when a run produces no facts.
    pub quiet_run_notice: bool,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing or malformed.
    pub fn from_env() -> Self {
        Self {
            webhook_url: env::var("WECOM_WEBHOOK_URL").ok().filter(|v| !v.is_empty()),
            database_url: env::var("SHELFWATCH_DB")
                .unwrap_or_else(|_| "sqlite://shelfwatch.db".to_string()),
            catalog_url: env::var("CATALOG_URL")
                .unwrap_or_else(|_| "https://www.tongli.com.tw/Search1.aspx".to_string()),
            catalog_pages: parsed_env("CATALOG_PAGES", 3),
            keywords: env::var("WATCH_KEYWORDS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|k| !k.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            min_send_interval: Duration::from_secs(parsed_env("SEND_MIN_INTERVAL_SECS", 1)),
            payload_ceiling: parsed_env("PAYLOAD_CEILING_BYTES", 4096),
            max_send_attempts: parsed_env("SEND_MAX_ATTEMPTS", 3),
            quiet_run_notice: env::var("QUIET_RUN_NOTICE")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Log the effective configuration without leaking the webhook secret.
    pub fn log_redacted(&self) {
        info!(
            webhook = if self.webhook_url.is_some() { "configured" } else { "disabled" },
            database = %self.database_url,
            catalog = %self.catalog_url,
            pages = self.catalog_pages,
            keywords = self.keywords.len(),
            min_interval_secs = self.min_send_interval.as_secs(),
            ceiling_bytes = self.payload_ceiling,
            "Configuration loaded"
        );
    }
}

fn parsed_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a number, got '{v}'")),
        Err(_) => default,
    }
}

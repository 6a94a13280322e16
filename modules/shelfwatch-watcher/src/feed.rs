//! Source feed adapter: fetches one catalog listing page and extracts the
//! period label plus the raw title cells. Deliberately thin — the page gives
//! no schema guarantee, so a structurally changed page degrades to an empty
//! title list rather than an error the run would have to care about.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use shelfwatch_common::FeedError;

/// Period label used when the page no longer exposes one.
pub const UNKNOWN_PERIOD: &str = "unknown";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// The month/period heading of the listing page.
static PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"id="ContentPlaceHolder1_DataMonth"[^>]*>\s*([^<]*?)\s*<"#).unwrap()
});

/// One title cell of the listing table.
static TITLE_CELL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<td[^>]*data-th="書名／集數"[^>]*>\s*([^<]*?)\s*</td>"#).unwrap()
});

/// One fetched listing page: its period label and raw title strings, in page
/// order.
#[derive(Debug, Clone)]
pub struct CatalogPage {
    pub period: String,
    pub titles: Vec<String>,
}

/// The per-run aggregation of every fetched page, in fetch order.
/// Ephemeral; lives for exactly one run.
#[derive(Debug, Clone, Default)]
pub struct ScrapeSnapshot {
    pub entries: Vec<SnapshotEntry>,
}

#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub raw_title: String,
    pub period: String,
}

impl ScrapeSnapshot {
    pub fn push_page(&mut self, page: CatalogPage) {
        for raw_title in page.titles {
            self.entries.push(SnapshotEntry {
                raw_title,
                period: page.period.clone(),
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct period labels, in first-seen order.
    pub fn periods(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for entry in &self.entries {
            if !out.contains(&entry.period) {
                out.push(entry.period.clone());
            }
        }
        out
    }
}

#[async_trait]
pub trait CatalogFeed: Send + Sync {
    async fn fetch(&self, page: u32) -> Result<CatalogPage, FeedError>;
}

/// Live HTTP implementation against the publisher's paginated listing.
pub struct HttpCatalogFeed {
    base_url: String,
    http: reqwest::Client,
}

impl HttpCatalogFeed {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { base_url, http }
    }

    fn extract(&self, page: u32, body: &str) -> Result<CatalogPage, FeedError> {
        let period = PERIOD
            .captures(body)
            .map(|c| c[1].trim().to_string())
            .filter(|p| !p.is_empty());

        let titles: Vec<String> = TITLE_CELL
            .captures_iter(body)
            .map(|c| c[1].trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        if period.is_none() && titles.is_empty() {
            return Err(FeedError::Malformed { page });
        }

        let period = period.unwrap_or_else(|| UNKNOWN_PERIOD.to_string());
        debug!(page, period = %period, titles = titles.len(), "Extracted listing page");
        Ok(CatalogPage { period, titles })
    }
}

#[async_trait]
impl CatalogFeed for HttpCatalogFeed {
    async fn fetch(&self, page: u32) -> Result<CatalogPage, FeedError> {
        let url = format!("{}?Page={}", self.base_url, page);
        info!(page, url = %url, "Fetching catalog page");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FeedError::Transport(Box::new(e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FeedError::BadStatus {
                page,
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .await
            .map_err(|e| FeedError::Transport(Box::new(e)))?;

        self.extract(page, &body)
    }
}

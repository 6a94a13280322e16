//! One scheduled run, end to end: fetch pages, detect changes, compose the
//! report, deliver it. Strictly sequential; the only waits are network I/O
//! and the delivery engine's explicit sleeps.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use tracing::{info, warn};

use shelfwatch_common::{Config, StoreError};
use shelfwatch_store::{HistoryStore, SendMarker};

use crate::deliver::{Deliverer, DeliveryResult};
use crate::detector::detect;
use crate::feed::{CatalogFeed, CatalogPage, ScrapeSnapshot};
use crate::notify::NotifySink;
use crate::report;

/// What a run did, for the final log line and the process exit path.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub pages_fetched: u32,
    pub pages_failed: u32,
    pub snapshot_titles: usize,
    pub new_titles: usize,
    pub published_titles: usize,
    pub delivery: Option<DeliveryResult>,
}

pub struct Watcher {
    config: Config,
    feed: Box<dyn CatalogFeed>,
    sink: Box<dyn NotifySink>,
    history: HistoryStore,
    marker: SendMarker,
}

impl Watcher {
    pub fn new(
        config: Config,
        feed: Box<dyn CatalogFeed>,
        sink: Box<dyn NotifySink>,
        pool: SqlitePool,
    ) -> Self {
        Self {
            config,
            feed,
            sink,
            history: HistoryStore::new(pool.clone()),
            marker: SendMarker::new(pool),
        }
    }

    /// Execute one run. Only `StoreError` escapes; feed and delivery
    /// failures degrade in place.
    pub async fn run(&mut self) -> Result<RunSummary, StoreError> {
        let run_at = Utc::now();
        let mut summary = RunSummary::default();

        let snapshot = self.collect_snapshot(&mut summary).await;
        summary.snapshot_titles = snapshot.entries.len();

        let outcome = match detect(&mut self.history, &snapshot, run_at.date_naive()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.history.rollback().await;
                return Err(e);
            }
        };
        summary.new_titles = outcome.new_titles.len();
        summary.published_titles = outcome.published_titles.len();

        if outcome.is_empty() {
            if self.config.quiet_run_notice {
                let doc = report::compose_quiet_notice(&snapshot.periods(), run_at);
                summary.delivery = Some(self.deliverer().deliver(&doc).await?);
            } else {
                info!("No changes detected, skipping delivery");
            }
            return Ok(summary);
        }

        let doc = report::compose(&outcome, run_at);
        let delivery = self.deliverer().deliver(&doc).await?;
        info!(delivery = %delivery, "Run delivery complete");
        summary.delivery = Some(delivery);

        Ok(summary)
    }

    /// Best-effort failure notice; never fails the caller.
    pub async fn notify_failure(&self, error: &str) {
        let doc = report::compose_failure_notice(error, Utc::now());
        match self.deliverer().deliver(&doc).await {
            Ok(result) => info!(delivery = %result, "Failure notice delivered"),
            Err(e) => warn!(error = %e, "Could not deliver failure notice"),
        }
    }

    fn deliverer(&self) -> Deliverer<'_> {
        Deliverer::new(
            self.sink.as_ref(),
            &self.marker,
            self.config.payload_ceiling,
            self.config.min_send_interval,
            self.config.max_send_attempts,
        )
    }

    /// Fetch every configured page sequentially. A failed or restructured
    /// page contributes nothing instead of aborting the run.
    async fn collect_snapshot(&self, summary: &mut RunSummary) -> ScrapeSnapshot {
        let mut snapshot = ScrapeSnapshot::default();
        for page in 1..=self.config.catalog_pages {
            match self.feed.fetch(page).await {
                Ok(listing) => {
                    summary.pages_fetched += 1;
                    info!(page, period = %listing.period, titles = listing.titles.len(), "Fetched page");
                    snapshot.push_page(self.filter_keywords(listing));
                }
                Err(e) => {
                    summary.pages_failed += 1;
                    warn!(page, error = %e, "Page fetch failed, treating as empty");
                }
            }
        }
        snapshot
    }

    /// Case-insensitive substring keyword filter on raw titles. An empty
    /// keyword list tracks the whole catalog.
    fn filter_keywords(&self, mut page: CatalogPage) -> CatalogPage {
        if self.config.keywords.is_empty() {
            return page;
        }
        let keywords: Vec<String> = self.config.keywords.iter().map(|k| k.to_lowercase()).collect();
        page.titles.retain(|title| {
            let lowered = title.to_lowercase();
            keywords.iter().any(|k| lowered.contains(k))
        });
        page
    }
}


//! Change detection: classifies one run's snapshot against the history store
//! and drives the tracked → published lifecycle.
//!
//! Absence from the currently listed catalog is the only observable signal
//! that a title left the upcoming list. Treating that as "published" is a
//! heuristic — it could equally mean delisted or renamed — and is kept as
//! stated policy rather than second-guessed here.

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use shelfwatch_common::{StoreError, TitleFact};
use shelfwatch_store::HistoryStore;

use crate::feed::ScrapeSnapshot;
use crate::normalize::normalize;

/// The notification-worthy outcome of one detector pass.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub new_titles: Vec<TitleFact>,
    pub published_titles: Vec<TitleFact>,
}

impl RunOutcome {
    pub fn is_empty(&self) -> bool {
        self.new_titles.is_empty() && self.published_titles.is_empty()
    }
}

/// Classify the snapshot against history and persist the resulting lifecycle
/// transitions. Flushes the store's write batch before returning.
pub async fn detect(
    store: &mut HistoryStore,
    snapshot: &ScrapeSnapshot,
    today: NaiveDate,
) -> Result<RunOutcome, StoreError> {
    let mut outcome = RunOutcome::default();
    let mut seen: HashSet<String> = HashSet::new();

    for entry in &snapshot.entries {
        let canonical = normalize(&entry.raw_title);
        if !seen.insert(canonical.clone()) {
            // Same work listed twice (reprint rows, page overlap).
            continue;
        }

        if store.exists_tracked(&canonical).await? {
            store.update_last_seen(&canonical, today).await?;
            debug!(title = %canonical, "Still listed");
            continue;
        }

        match store
            .insert(&canonical, &entry.period, today, today)
            .await
        {
            Ok(()) => {
                outcome.new_titles.push(TitleFact {
                    title: canonical,
                    period: entry.period.clone(),
                    first_seen: today,
                    last_seen: today,
                });
            }
            Err(StoreError::DuplicateKey { .. }) => {
                // Either a published title resurfaced or a concurrent run got
                // there first. The row is left alone (published is terminal),
                // but subscribers still see it announced as new.
                warn!(title = %canonical, "Insert hit existing row, touching last_seen instead");
                store.update_last_seen(&canonical, today).await?;
                outcome.new_titles.push(TitleFact {
                    title: canonical,
                    period: entry.period.clone(),
                    first_seen: today,
                    last_seen: today,
                });
            }
            Err(e) => return Err(e),
        }
    }

    for row in store.list_tracked().await? {
        if seen.contains(&row.title) {
            continue;
        }
        store.mark_published(&row.title, None).await?;
        outcome.published_titles.push(TitleFact {
            title: row.title,
            period: row.publish_period,
            first_seen: row.first_seen,
            last_seen: row.last_seen,
        });
    }

    store.flush().await?;

    info!(
        new = outcome.new_titles.len(),
        published = outcome.published_titles.len(),
        snapshot = snapshot.entries.len(),
        "Detector pass complete"
    );
    Ok(outcome)
}

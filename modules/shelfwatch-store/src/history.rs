use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::{Row, Sqlite, Transaction};
use tracing::debug;

use shelfwatch_common::{StoreError, TitleStatus, TrackedTitle};

/// Writes are committed every this many statements so a run never holds one
/// long-lived transaction over the whole snapshot.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Keyed table of tracked/published titles.
///
/// Writes accumulate in a short-lived transaction that commits every
/// `batch_size` statements; callers must [`HistoryStore::flush`] at the end of
/// a run. A commit failure loses only that batch and surfaces the error.
/// Reads go through the open transaction so a run always sees its own
/// uncommitted writes.
pub struct HistoryStore {
    pool: SqlitePool,
    tx: Option<Transaction<'static, Sqlite>>,
    pending: usize,
    batch_size: usize,
}

impl HistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            tx: None,
            pending: 0,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// True only for rows with status = tracked. Published rows are
    /// intentionally excluded: a published title that reappears in the
    /// catalog reads as brand new to the detector.
    pub async fn exists_tracked(&mut self, title: &str) -> Result<bool, StoreError> {
        let q = sqlx::query("SELECT 1 FROM titles WHERE title = ?1 AND status = 'tracked'")
            .bind(title);
        let row = match self.tx.as_mut() {
            Some(tx) => q.fetch_optional(&mut **tx).await?,
            None => q.fetch_optional(&self.pool).await?,
        };
        Ok(row.is_some())
    }

    /// Insert a freshly observed title as tracked.
    ///
    /// Fails with [`StoreError::DuplicateKey`] if the title already exists in
    /// any status; the caller falls back to [`HistoryStore::update_last_seen`].
    pub async fn insert(
        &mut self,
        title: &str,
        period: &str,
        first_seen: NaiveDate,
        last_seen: NaiveDate,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "INSERT INTO titles (title, publish_period, first_seen, last_seen, status)
             VALUES (?1, ?2, ?3, ?4, 'tracked')",
        )
        .bind(title)
        .bind(period)
        .bind(first_seen)
        .bind(last_seen)
        .execute(self.writer().await?)
        .await;

        match result {
            Ok(_) => self.note_write().await,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateKey {
                    title: title.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Advance `last_seen` for a tracked row. No-op for published rows and
    /// never moves the date backwards.
    pub async fn update_last_seen(
        &mut self,
        title: &str,
        seen: NaiveDate,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE titles SET last_seen = MAX(last_seen, ?2)
             WHERE title = ?1 AND status = 'tracked'",
        )
        .bind(title)
        .bind(seen)
        .execute(self.writer().await?)
        .await?;
        self.note_write().await
    }

    /// Transition a tracked row to published, optionally rewriting its
    /// period. Irreversible; a no-op for rows already published.
    pub async fn mark_published(
        &mut self,
        title: &str,
        new_period: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE titles
             SET status = 'published', publish_period = COALESCE(?2, publish_period)
             WHERE title = ?1 AND status = 'tracked'",
        )
        .bind(title)
        .bind(new_period)
        .execute(self.writer().await?)
        .await?;
        self.note_write().await
    }

    /// Full scan of tracked rows. Used once per detector run.
    pub async fn list_tracked(&mut self) -> Result<Vec<TrackedTitle>, StoreError> {
        let q = sqlx::query(
            "SELECT title, publish_period, first_seen, last_seen, status
             FROM titles WHERE status = 'tracked' ORDER BY title",
        );
        let rows = match self.tx.as_mut() {
            Some(tx) => q.fetch_all(&mut **tx).await?,
            None => q.fetch_all(&self.pool).await?,
        };

        rows.into_iter()
            .map(|row| {
                let title: String = row.get("title");
                let status_raw: String = row.get("status");
                let status =
                    TitleStatus::parse(&status_raw).ok_or_else(|| StoreError::CorruptRow {
                        title: title.clone(),
                        reason: format!("unknown status '{status_raw}'"),
                    })?;
                Ok(TrackedTitle {
                    title,
                    publish_period: row.get("publish_period"),
                    first_seen: row.get("first_seen"),
                    last_seen: row.get("last_seen"),
                    status,
                })
            })
            .collect()
    }

    /// Fetch one row regardless of status. Test and diagnostics helper.
    pub async fn get(&mut self, title: &str) -> Result<Option<TrackedTitle>, StoreError> {
        let q = sqlx::query(
            "SELECT title, publish_period, first_seen, last_seen, status
             FROM titles WHERE title = ?1",
        )
        .bind(title);
        let row = match self.tx.as_mut() {
            Some(tx) => q.fetch_optional(&mut **tx).await?,
            None => q.fetch_optional(&self.pool).await?,
        };
        let Some(row) = row else { return Ok(None) };

        let title: String = row.get("title");
        let status_raw: String = row.get("status");
        let status = TitleStatus::parse(&status_raw).ok_or_else(|| StoreError::CorruptRow {
            title: title.clone(),
            reason: format!("unknown status '{status_raw}'"),
        })?;
        Ok(Some(TrackedTitle {
            title,
            publish_period: row.get("publish_period"),
            first_seen: row.get("first_seen"),
            last_seen: row.get("last_seen"),
            status,
        }))
    }

    /// Abandon the open batch. The pool runs a single connection, so an
    /// aborted run must release its transaction before anything else (the
    /// failure notice path reads the send marker) can touch the database.
    pub async fn rollback(&mut self) {
        if let Some(tx) = self.tx.take() {
            self.pending = 0;
            let _ = tx.rollback().await;
        }
    }

    /// Commit any writes still pending in the open batch.
    pub async fn flush(&mut self) -> Result<(), StoreError> {
        if let Some(tx) = self.tx.take() {
            let count = self.pending;
            self.pending = 0;
            tx.commit().await?;
            debug!(writes = count, "Committed history batch");
        }
        Ok(())
    }

    /// Connection of the open batch transaction, starting one if needed.
    async fn writer(&mut self) -> Result<&mut SqliteConnection, StoreError> {
        if self.tx.is_none() {
            self.tx = Some(self.pool.begin().await?);
        }
        let tx = self.tx.as_mut().expect("transaction opened above");
        Ok(&mut **tx)
    }

    async fn note_write(&mut self) -> Result<(), StoreError> {
        self.pending += 1;
        if self.pending >= self.batch_size {
            self.flush().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::{connect, migrate};

    async fn store() -> HistoryStore {
        let pool = connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        HistoryStore::new(pool)
    }

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, n).unwrap()
    }

    #[tokio::test]
    async fn insert_then_duplicate_key() {
        let mut store = store().await;
        store.insert("Foo Vol.1", "2025-05", day(1), day(1)).await.unwrap();

        let err = store
            .insert("Foo Vol.1", "2025-06", day(2), day(2))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn duplicate_key_even_after_published() {
        let mut store = store().await;
        store.insert("Foo Vol.1", "2025-05", day(1), day(1)).await.unwrap();
        store.mark_published("Foo Vol.1", None).await.unwrap();

        let err = store
            .insert("Foo Vol.1", "2025-06", day(3), day(3))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn exists_tracked_excludes_published() {
        let mut store = store().await;
        store.insert("Foo Vol.1", "2025-05", day(1), day(1)).await.unwrap();
        assert!(store.exists_tracked("Foo Vol.1").await.unwrap());

        store.mark_published("Foo Vol.1", None).await.unwrap();
        assert!(!store.exists_tracked("Foo Vol.1").await.unwrap());
    }

    #[tokio::test]
    async fn last_seen_frozen_once_published() {
        let mut store = store().await;
        store.insert("Foo Vol.1", "2025-05", day(1), day(1)).await.unwrap();
        store.mark_published("Foo Vol.1", None).await.unwrap();
        store.update_last_seen("Foo Vol.1", day(9)).await.unwrap();
        store.flush().await.unwrap();

        let row = store.get("Foo Vol.1").await.unwrap().unwrap();
        assert_eq!(row.status, TitleStatus::Published);
        assert_eq!(row.last_seen, day(1));
    }

    #[tokio::test]
    async fn last_seen_never_moves_backwards() {
        let mut store = store().await;
        store.insert("Foo Vol.1", "2025-05", day(1), day(5)).await.unwrap();
        store.update_last_seen("Foo Vol.1", day(3)).await.unwrap();
        store.flush().await.unwrap();

        let row = store.get("Foo Vol.1").await.unwrap().unwrap();
        assert_eq!(row.last_seen, day(5));
    }

    #[tokio::test]
    async fn mark_published_is_irreversible_and_rewrites_period() {
        let mut store = store().await;
        store.insert("Foo Vol.1", "2025-05", day(1), day(1)).await.unwrap();
        store.mark_published("Foo Vol.1", Some("2025-06")).await.unwrap();
        // A second call must not touch the frozen row.
        store.mark_published("Foo Vol.1", Some("2025-07")).await.unwrap();
        store.flush().await.unwrap();

        let row = store.get("Foo Vol.1").await.unwrap().unwrap();
        assert_eq!(row.status, TitleStatus::Published);
        assert_eq!(row.publish_period, "2025-06");
    }

    #[tokio::test]
    async fn batch_commits_at_bound_and_on_flush() {
        let pool = connect("sqlite::memory:").await.unwrap();
        migrate(&pool).await.unwrap();
        let mut store = HistoryStore::new(pool.clone()).with_batch_size(2);

        store.insert("A", "2025-05", day(1), day(1)).await.unwrap();
        store.insert("B", "2025-05", day(1), day(1)).await.unwrap();
        // Batch of 2 committed: visible outside the store's transaction.
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM titles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(n, 2);

        store.insert("C", "2025-05", day(1), day(1)).await.unwrap();
        store.flush().await.unwrap();
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM titles")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(n, 3);
    }

    #[tokio::test]
    async fn reads_see_uncommitted_writes() {
        let mut store = store().await;
        store.insert("Foo Vol.1", "2025-05", day(1), day(1)).await.unwrap();
        // Not yet flushed, but visible through the open transaction.
        assert!(store.exists_tracked("Foo Vol.1").await.unwrap());
        assert_eq!(store.list_tracked().await.unwrap().len(), 1);
    }
}

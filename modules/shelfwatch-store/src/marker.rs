use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;

use shelfwatch_common::StoreError;

/// The single-row timestamp of the most recent successful webhook send.
/// Owned and mutated only by the delivery engine; the next run's first send
/// consults it for rate limiting.
pub struct SendMarker {
    pool: SqlitePool,
}

impl SendMarker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Timestamp of the last successful send, None on first boot.
    pub async fn last_sent_at(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let ts: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT last_sent_at FROM send_marker WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(ts)
    }

    /// Record a successful send. Creates the marker row if it doesn't exist.
    pub async fn record_sent_at(&self, ts: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO send_marker (id, last_sent_at) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET last_sent_at = excluded.last_sent_at",
        )
        .bind(ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

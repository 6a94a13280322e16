//! Typed errors for feed, store and delivery operations.

use thiserror::Error;

/// Errors from fetching or parsing one catalog page.
///
/// Never fatal: the run loop degrades a failed page to an empty snapshot
/// contribution and keeps going. Feed fetches are not retried.
#[derive(Debug, Error)]
pub enum FeedError {
    /// HTTP transport failure (timeout, DNS, connection reset).
    #[error("feed transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Non-success HTTP status from the catalog host.
    #[error("feed returned HTTP {status} for page {page}")]
    BadStatus { page: u32, status: u16 },

    /// Page fetched but the expected markup structure was not found.
    #[error("feed page {page} has unrecognized structure")]
    Malformed { page: u32 },
}

/// Errors from the history store. Fatal for the run except `DuplicateKey`,
/// which callers handle by falling back to `update_last_seen`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert attempted for a title that already exists in any status.
    #[error("title already recorded: {title}")]
    DuplicateKey { title: String },

    /// A persisted row failed to decode (unknown status value).
    #[error("corrupt history row for {title}: {reason}")]
    CorruptRow { title: String, reason: String },

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Per-chunk delivery failure, reported after retries are exhausted.
/// Never aborts the run or the remaining chunks.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// HTTP transport failure on the webhook POST.
    #[error("webhook transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Endpoint answered but rejected the message (non-zero errcode).
    #[error("webhook rejected message: errcode={errcode} errmsg={errmsg}")]
    Rejected { errcode: i64, errmsg: String },

    /// All attempts for one chunk failed.
    #[error("chunk {index} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        index: usize,
        attempts: u32,
        last: Box<DeliveryError>,
    },
}

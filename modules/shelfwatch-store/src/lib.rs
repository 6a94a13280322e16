//! SQLite persistence for the catalog watch: the title history table and the
//! single-row delivery marker. Built on sqlx with idempotent migrations.

pub mod history;
pub mod marker;
pub mod migrate;

pub use history::{HistoryStore, DEFAULT_BATCH_SIZE};
pub use marker::SendMarker;
pub use migrate::{connect, migrate};

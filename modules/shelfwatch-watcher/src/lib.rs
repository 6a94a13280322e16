//! Catalog release watcher: scrapes a publisher's upcoming-books listing,
//! tracks title lifecycles in SQLite, and pushes change summaries to a chat
//! webhook in size-capped chunks.

pub mod chunk;
pub mod deliver;
pub mod detector;
pub mod feed;
pub mod normalize;
pub mod notify;
pub mod report;
pub mod run;

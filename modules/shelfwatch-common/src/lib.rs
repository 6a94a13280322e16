pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{DeliveryError, FeedError, StoreError};
pub use types::{TitleFact, TitleStatus, TrackedTitle};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a catalog title.
///
/// `Tracked` is assigned at first observation; `Published` is terminal and is
/// inferred when a tracked title disappears from the catalog listing. The
/// inference is a policy choice: disappearance can also mean delisting or a
/// rename, and we deliberately do not try to distinguish those.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TitleStatus {
    Tracked,
    Published,
}

impl TitleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TitleStatus::Tracked => "tracked",
            TitleStatus::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tracked" => Some(TitleStatus::Tracked),
            "published" => Some(TitleStatus::Published),
            _ => None,
        }
    }
}

impl std::fmt::Display for TitleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted history row, keyed by canonical title.
///
/// `title` is unique across all rows regardless of status. `last_seen` only
/// moves while the row is tracked; once published the row is frozen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedTitle {
    pub title: String,
    pub publish_period: String,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    pub status: TitleStatus,
}

/// One notification-worthy observation produced by a detector run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleFact {
    pub title: String,
    pub period: String,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
}

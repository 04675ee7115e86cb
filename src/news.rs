// src/news.rs
//! News item model and the forward-only status machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline stage of a stored item. Variant order is the progression order,
/// so `Ord` doubles as "is at least as advanced as".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsStatus {
    Raw,
    Clean,
    ContentEnriched,
    Enriched,
}

impl NewsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewsStatus::Raw => "raw",
            NewsStatus::Clean => "clean",
            NewsStatus::ContentEnriched => "content_enriched",
            NewsStatus::Enriched => "enriched",
        }
    }

    /// Lenient read of a stored status column. Missing or unknown values are
    /// treated as `Raw` so the clean stage picks them up.
    pub fn from_db(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("clean") => NewsStatus::Clean,
            Some("content_enriched") => NewsStatus::ContentEnriched,
            Some("enriched") | Some("fully_enriched") => NewsStatus::Enriched,
            _ => NewsStatus::Raw,
        }
    }

    /// Only forward moves (or staying put) are legal.
    pub fn can_transition_to(self, next: NewsStatus) -> bool {
        next >= self
    }

    /// Resulting status when a stage wants to move an item to `target`:
    /// never lower than where the item already is.
    pub fn advance(self, target: NewsStatus) -> NewsStatus {
        self.max(target)
    }
}

impl std::fmt::Display for NewsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted a backwards move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("status cannot regress from {from} to {to}")]
pub struct StatusRegression {
    pub from: NewsStatus,
    pub to: NewsStatus,
}

/// A draft produced by an ingestion source, before the store stamps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsDraft {
    pub title: String,
    pub link: String,
    pub company: String,
    pub published_date: Option<DateTime<Utc>>,
    pub publisher: String,
    pub industry: Option<String>,
    pub publisher_topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: i64,
    pub title: String,
    pub link: String,
    pub company: String,
    pub published_date: Option<DateTime<Utc>>,
    pub publisher: String,
    pub industry: Option<String>,
    pub publisher_topic: Option<String>,
    pub content: Option<String>,
    pub ai_summary: Option<String>,
    pub ai_topic: Option<String>,
    pub downloaded_at: DateTime<Utc>,
    pub status: NewsStatus,
}

impl NewsItem {
    /// Move this item's status forward. Fails without touching the item when
    /// `next` is behind the current status.
    pub fn set_status(&mut self, next: NewsStatus) -> Result<(), StatusRegression> {
        if !self.status.can_transition_to(next) {
            return Err(StatusRegression {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

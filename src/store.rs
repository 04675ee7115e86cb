// src/store.rs
//! SQLite-backed record store for news items.
//!
//! One connection behind a mutex: writes are serialized, and every multi-row
//! mutation goes through [`NewsStore::transaction`], which rolls back when the
//! closure fails.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::error::{PipelineError, PipelineResult};
use crate::news::{NewsDraft, NewsItem, NewsStatus};

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/news.db";

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS news (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    link TEXT NOT NULL,
    company TEXT NOT NULL,
    published_date TEXT,
    publisher TEXT NOT NULL,
    industry TEXT,
    publisher_topic TEXT,
    content TEXT,
    ai_summary TEXT,
    ai_topic TEXT,
    downloaded_at INTEGER NOT NULL,
    status TEXT
);
CREATE INDEX IF NOT EXISTS idx_news_link ON news(link);
CREATE INDEX IF NOT EXISTS idx_news_status ON news(status);
"#;

const COLUMNS: &str = "id, title, link, company, published_date, publisher, industry, \
                       publisher_topic, content, ai_summary, ai_topic, downloaded_at, status";

/// Stored status the way [`NewsStatus::from_db`] reads it.
const STATUS_NORM: &str = "lower(trim(status))";

/// Statuses that count as "past the clean stage" in SQL filters.
pub(crate) const PAST_RAW: &str =
    "lower(trim(status)) IN ('clean', 'content_enriched', 'enriched', 'fully_enriched')";

/// Complement of [`PAST_RAW`], NULL included.
pub(crate) const BELOW_CLEAN: &str = "(status IS NULL OR lower(trim(status)) NOT IN \
     ('clean', 'content_enriched', 'enriched', 'fully_enriched'))";

/// Where the connection string points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbTarget {
    Memory,
    File(PathBuf),
}

/// Accepts `sqlite://path`, `sqlite:path`, `sqlite::memory:`, `:memory:` or a
/// bare path. Other schemes are rejected.
pub fn parse_database_url(url: &str) -> PipelineResult<DbTarget> {
    let url = url.trim();
    if url.is_empty() {
        return Err(PipelineError::Config("empty database url".into()));
    }
    if matches!(url, ":memory:" | "sqlite::memory:" | "sqlite://:memory:") {
        return Ok(DbTarget::Memory);
    }
    if let Some(rest) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    {
        if rest.is_empty() {
            return Err(PipelineError::Config("sqlite url without a path".into()));
        }
        return Ok(DbTarget::File(PathBuf::from(rest)));
    }
    if url.contains("://") {
        return Err(PipelineError::Config(format!(
            "unsupported database url scheme: {url}"
        )));
    }
    Ok(DbTarget::File(PathBuf::from(url)))
}

/// Items a sweep should pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Status(NewsStatus),
    MissingContent,
    MissingTopic,
    MissingSummary,
}

impl Selection {
    fn where_clause(&self) -> String {
        match self {
            Selection::Status(NewsStatus::Raw) => BELOW_CLEAN.to_string(),
            Selection::Status(NewsStatus::Enriched) => {
                format!("{STATUS_NORM} IN ('enriched', 'fully_enriched')")
            }
            Selection::Status(s) => format!("{STATUS_NORM} = '{}'", s.as_str()),
            Selection::MissingContent => format!("content IS NULL AND {PAST_RAW}"),
            Selection::MissingTopic => format!("ai_topic IS NULL AND {PAST_RAW}"),
            Selection::MissingSummary => format!("ai_summary IS NULL AND {PAST_RAW}"),
        }
    }
}

/// Field-level update produced by the enricher. `None` leaves a column alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentPatch {
    pub content: Option<String>,
    pub ai_topic: Option<String>,
    pub ai_summary: Option<String>,
    pub target_status: Option<NewsStatus>,
}

#[derive(Clone)]
pub struct NewsStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for NewsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsStore").finish_non_exhaustive()
    }
}

impl NewsStore {
    /// Open using `$DATABASE_URL`, falling back to [`DEFAULT_DATABASE_URL`].
    pub fn from_env() -> PipelineResult<Self> {
        let url = std::env::var(ENV_DATABASE_URL).unwrap_or_else(|_| DEFAULT_DATABASE_URL.into());
        Self::open(&url)
    }

    pub fn open(url: &str) -> PipelineResult<Self> {
        let conn = match parse_database_url(url)? {
            DbTarget::Memory => Connection::open_in_memory()?,
            DbTarget::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        PipelineError::Config(format!("creating {}: {e}", parent.display()))
                    })?;
                }
                Connection::open(&path)?
            }
        };
        conn.execute_batch(SCHEMA)?;
        tracing::info!(target: "store", url, "news store ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> PipelineResult<Self> {
        Self::open(":memory:")
    }

    fn lock(&self) -> PipelineResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PipelineError::StoreTransaction(format!("store mutex poisoned: {e}")))
    }

    /// Run `f` inside one transaction. Commits on `Ok`, rolls back on `Err`.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> PipelineResult<T>,
    ) -> PipelineResult<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(out) => {
                tx.commit()?;
                Ok(out)
            }
            Err(e) => {
                if let Err(rb) = tx.rollback() {
                    tracing::error!(target: "store", error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Run a store closure on the blocking pool so async callers don't stall
    /// a runtime worker on SQLite I/O.
    pub async fn blocking<T, F>(&self, f: F) -> PipelineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&NewsStore) -> PipelineResult<T> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| PipelineError::StoreTransaction(format!("store task failed: {e}")))?
    }

    /// Raw SQL escape hatch (maintenance scripts, test fault injection).
    pub fn execute_batch(&self, sql: &str) -> PipelineResult<()> {
        self.lock()?.execute_batch(sql)?;
        Ok(())
    }

    /// Insert one ingestion run's drafts as `raw` rows stamped with `downloaded_at`.
    /// All or nothing.
    pub fn insert_drafts(
        &self,
        drafts: &[NewsDraft],
        downloaded_at: DateTime<Utc>,
    ) -> PipelineResult<usize> {
        if drafts.is_empty() {
            return Ok(0);
        }
        self.transaction(|tx| {
            let mut stmt = tx.prepare(
                "INSERT INTO news (title, link, company, published_date, publisher, industry, \
                 publisher_topic, downloaded_at, status) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for d in drafts {
                stmt.execute(params![
                    d.title,
                    d.link,
                    d.company,
                    d.published_date.map(|t| t.to_rfc3339()),
                    d.publisher,
                    d.industry,
                    d.publisher_topic,
                    downloaded_at.timestamp_micros(),
                    NewsStatus::Raw.as_str(),
                ])?;
            }
            Ok(drafts.len())
        })
    }

    pub fn get(&self, id: i64) -> PipelineResult<Option<NewsItem>> {
        let conn = self.lock()?;
        let item = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM news WHERE id = ?1"),
                params![id],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }

    pub fn list_all(&self) -> PipelineResult<Vec<NewsItem>> {
        let conn = self.lock()?;
        query_items(&conn, &format!("SELECT {COLUMNS} FROM news ORDER BY id"))
    }

    pub fn select(&self, selection: Selection) -> PipelineResult<Vec<NewsItem>> {
        let conn = self.lock()?;
        query_items(
            &conn,
            &format!(
                "SELECT {COLUMNS} FROM news WHERE {} ORDER BY id",
                selection.where_clause()
            ),
        )
    }

    pub fn count(&self) -> PipelineResult<usize> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM news", [], |r| r.get(0))?;
        Ok(n.max(0) as usize)
    }

    /// Apply one item's enrichment in its own transaction. Returns `false`
    /// when the row no longer exists (e.g. removed as a duplicate meanwhile).
    /// The stored status only ever moves forward.
    pub fn apply_enrichment(&self, id: i64, patch: &EnrichmentPatch) -> PipelineResult<bool> {
        self.transaction(|tx| {
            let current: Option<Option<String>> = tx
                .query_row("SELECT status FROM news WHERE id = ?1", params![id], |r| {
                    r.get(0)
                })
                .optional()?;
            let Some(current) = current else {
                return Ok(false);
            };
            let current = NewsStatus::from_db(current.as_deref());
            let next = patch
                .target_status
                .map(|t| current.advance(t))
                .unwrap_or(current);

            tx.execute(
                "UPDATE news SET content = COALESCE(?1, content), \
                 ai_topic = COALESCE(?2, ai_topic), \
                 ai_summary = COALESCE(?3, ai_summary), \
                 status = ?4 WHERE id = ?5",
                params![
                    patch.content,
                    patch.ai_topic,
                    patch.ai_summary,
                    next.as_str(),
                    id
                ],
            )?;
            Ok(true)
        })
    }
}

fn query_items(conn: &Connection, sql: &str) -> PipelineResult<Vec<NewsItem>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], row_to_item)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub(crate) fn row_to_item(row: &Row<'_>) -> rusqlite::Result<NewsItem> {
    let published: Option<String> = row.get(4)?;
    let downloaded_us: i64 = row.get(11)?;
    let status: Option<String> = row.get(12)?;
    Ok(NewsItem {
        id: row.get(0)?,
        title: row.get(1)?,
        link: row.get(2)?,
        company: row.get(3)?,
        published_date: published
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc)),
        publisher: row.get(5)?,
        industry: row.get(6)?,
        publisher_topic: row.get(7)?,
        content: row.get(8)?,
        ai_summary: row.get(9)?,
        ai_topic: row.get(10)?,
        downloaded_at: DateTime::from_timestamp_micros(downloaded_us).unwrap_or_default(),
        status: NewsStatus::from_db(status.as_deref()),
    })
}

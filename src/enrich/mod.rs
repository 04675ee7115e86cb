// src/enrich/mod.rs
//! Enrichment sweeps: fetch article content, tag it, summarize it, and move
//! the item forward. One item failing never stops the batch.

pub mod content;
pub mod provider;

use std::sync::Arc;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tracing::{info, warn};

use crate::enrich::content::ContentFetcher;
use crate::enrich::provider::DynProvider;
use crate::error::PipelineResult;
use crate::news::{NewsItem, NewsStatus};
use crate::store::{EnrichmentPatch, NewsStore, Selection};

/// Stored in place of content that could not be fetched.
pub const CONTENT_FAILED: &str = "Failed to fetch content";
/// Stored in place of a tag when the provider call failed.
pub const TAGGING_FAILED: &str = "Error in tagging";
/// Stored in place of a summary when the provider call failed.
pub const SUMMARY_FAILED: &str = "Error in summarization";

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("enrich_items_total", "Items persisted by an enrichment sweep.");
        describe_counter!(
            "enrich_step_failures_total",
            "Content/tag/summary steps that fell back to a sentinel."
        );
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichMode {
    /// Clean items: content + tag + summary, ends `enriched`.
    Full,
    /// Items without content: fetch only, ends at least `content_enriched`.
    Content,
    /// Items without a tag.
    Tags,
    /// Items without a summary.
    Summary,
}

impl EnrichMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichMode::Full => "full",
            EnrichMode::Content => "content",
            EnrichMode::Tags => "tags",
            EnrichMode::Summary => "summary",
        }
    }

    pub fn selection(&self) -> Selection {
        match self {
            EnrichMode::Full => Selection::Status(NewsStatus::Clean),
            EnrichMode::Content => Selection::MissingContent,
            EnrichMode::Tags => Selection::MissingTopic,
            EnrichMode::Summary => Selection::MissingSummary,
        }
    }

    pub fn target_status(&self) -> Option<NewsStatus> {
        match self {
            EnrichMode::Full => Some(NewsStatus::Enriched),
            EnrichMode::Content => Some(NewsStatus::ContentEnriched),
            EnrichMode::Tags | EnrichMode::Summary => None,
        }
    }

    fn fetches_content(&self) -> bool {
        matches!(self, EnrichMode::Full | EnrichMode::Content)
    }

    fn tags(&self) -> bool {
        matches!(self, EnrichMode::Full | EnrichMode::Tags)
    }

    fn summarizes(&self) -> bool {
        matches!(self, EnrichMode::Full | EnrichMode::Summary)
    }
}

impl std::fmt::Display for EnrichMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub selected: usize,
    pub enriched: usize,
    /// Rows that disappeared between selection and write.
    pub missing: usize,
    pub persist_failures: usize,
    pub fetch_failures: usize,
    pub tag_failures: usize,
    pub summary_failures: usize,
}

impl std::fmt::Display for EnrichReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "selected {}, enriched {}, missing {}, persist failures {}, fetch failures {}, tag failures {}, summary failures {}",
            self.selected,
            self.enriched,
            self.missing,
            self.persist_failures,
            self.fetch_failures,
            self.tag_failures,
            self.summary_failures
        )
    }
}

pub struct Enricher {
    store: NewsStore,
    fetcher: Arc<dyn ContentFetcher>,
    provider: DynProvider,
    taxonomy: Vec<String>,
}

impl Enricher {
    pub fn new(
        store: NewsStore,
        fetcher: Arc<dyn ContentFetcher>,
        provider: DynProvider,
        taxonomy: Vec<String>,
    ) -> Self {
        Self {
            store,
            fetcher,
            provider,
            taxonomy,
        }
    }

    /// Enrich everything `mode` selects. Only a failing selection query fails
    /// the sweep; per-item problems are counted in the report.
    pub async fn sweep(&self, mode: EnrichMode) -> PipelineResult<EnrichReport> {
        ensure_metrics_described();

        let items = self
            .store
            .blocking(move |s| s.select(mode.selection()))
            .await?;
        let mut report = EnrichReport {
            selected: items.len(),
            ..Default::default()
        };
        info!(target: "enrich", mode = %mode, selected = items.len(), "sweep started");

        for item in items {
            let patch = self.enrich_item(&item, mode, &mut report).await;
            let id = item.id;
            match self
                .store
                .blocking(move |s| s.apply_enrichment(id, &patch))
                .await
            {
                Ok(true) => report.enriched += 1,
                Ok(false) => {
                    info!(target: "enrich", id, link = %item.link, "item vanished before write");
                    report.missing += 1;
                }
                Err(e) => {
                    warn!(target: "enrich", id, error = %e, "persist failed; continuing");
                    report.persist_failures += 1;
                }
            }
        }

        counter!("enrich_items_total", "mode" => mode.as_str()).increment(report.enriched as u64);
        info!(target: "enrich", mode = %mode, %report, "sweep finished");
        Ok(report)
    }

    async fn enrich_item(
        &self,
        item: &NewsItem,
        mode: EnrichMode,
        report: &mut EnrichReport,
    ) -> EnrichmentPatch {
        let mut patch = EnrichmentPatch {
            target_status: mode.target_status(),
            ..Default::default()
        };

        // Text the provider works from: fresh content, stored content, or the
        // title when neither is usable.
        let mut input = usable_content(item.content.as_deref()).map(str::to_string);

        if mode.fetches_content() {
            match self.fetcher.fetch(&item.link).await {
                Ok(text) => {
                    input = Some(text.clone());
                    patch.content = Some(text);
                }
                Err(e) => {
                    warn!(target: "enrich", link = %item.link, error = %e, "content fetch failed");
                    step_failed("content");
                    report.fetch_failures += 1;
                    patch.content = Some(CONTENT_FAILED.to_string());
                }
            }
        }
        let input = input.unwrap_or_else(|| item.title.clone());

        if mode.tags() {
            patch.ai_topic = Some(match self.provider.tag(&input, &self.taxonomy).await {
                Ok(tag) => tag,
                Err(e) => {
                    warn!(target: "enrich", link = %item.link, error = %e, "tagging failed");
                    step_failed("tag");
                    report.tag_failures += 1;
                    TAGGING_FAILED.to_string()
                }
            });
        }

        if mode.summarizes() {
            patch.ai_summary = Some(match self.provider.summarize(&input).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(target: "enrich", link = %item.link, error = %e, "summarization failed");
                    step_failed("summary");
                    report.summary_failures += 1;
                    SUMMARY_FAILED.to_string()
                }
            });
        }

        patch
    }
}

fn step_failed(step: &'static str) {
    counter!("enrich_step_failures_total", "step" => step).increment(1);
}

fn usable_content(content: Option<&str>) -> Option<&str> {
    content.filter(|c| !c.trim().is_empty() && *c != CONTENT_FAILED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_select_and_target() {
        assert_eq!(EnrichMode::Full.selection(), Selection::Status(NewsStatus::Clean));
        assert_eq!(EnrichMode::Full.target_status(), Some(NewsStatus::Enriched));
        assert_eq!(
            EnrichMode::Content.target_status(),
            Some(NewsStatus::ContentEnriched)
        );
        assert_eq!(EnrichMode::Tags.target_status(), None);
        assert!(!EnrichMode::Tags.fetches_content());
        assert!(!EnrichMode::Content.summarizes());
    }

    #[test]
    fn sentinel_content_is_not_used_as_input() {
        assert_eq!(usable_content(Some(CONTENT_FAILED)), None);
        assert_eq!(usable_content(Some("  ")), None);
        assert_eq!(usable_content(Some("body")), Some("body"));
    }
}

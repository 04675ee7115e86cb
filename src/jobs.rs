// src/jobs.rs
//! Scheduler job bodies for each pipeline stage, and the startup registry.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;

use crate::clean::remove_duplicates_and_mark_clean;
use crate::config::{EnrichConfig, SourcesConfig, TasksConfig};
use crate::enrich::content::HttpContentFetcher;
use crate::enrich::provider::build_provider;
use crate::enrich::{EnrichMode, Enricher};
use crate::error::{PipelineError, PipelineResult};
use crate::ingest::providers::{
    baltics_rss::BalticsRssProvider, euronext::EuronextProvider, omx::OmxProvider,
};
use crate::ingest::render::PageRenderer;
use crate::ingest::types::SourceProvider;
use crate::scheduler::{Job, Scheduler, SchedulerError, TaskKind};
use crate::store::NewsStore;

/// Fetch from a set of sources and store the drafts as raw rows.
pub struct IngestJob {
    name: &'static str,
    providers: Vec<Box<dyn SourceProvider>>,
    store: NewsStore,
    max_items: usize,
}

impl IngestJob {
    pub fn new(
        name: &'static str,
        providers: Vec<Box<dyn SourceProvider>>,
        store: NewsStore,
        max_items: usize,
    ) -> Self {
        Self {
            name,
            providers,
            store,
            max_items,
        }
    }
}

#[async_trait]
impl Job for IngestJob {
    async fn run(&self) -> anyhow::Result<String> {
        let outcome = crate::ingest::run_once(&self.providers, self.max_items).await;
        if outcome.all_providers_failed() {
            return Err(PipelineError::fetch(self.name, outcome.errors.join("; ")).into());
        }
        let dropped = outcome.dropped;
        let drafts = outcome.drafts;
        let inserted = self
            .store
            .blocking(move |s| s.insert_drafts(&drafts, Utc::now()))
            .await
            .with_context(|| format!("storing {} drafts", self.name))?;
        Ok(format!("inserted {inserted}, dropped {dropped}"))
    }
}

pub struct CleanJob {
    store: NewsStore,
}

impl CleanJob {
    pub fn new(store: NewsStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Job for CleanJob {
    async fn run(&self) -> anyhow::Result<String> {
        let report = self
            .store
            .blocking(remove_duplicates_and_mark_clean)
            .await?;
        Ok(format!(
            "deleted {} duplicates, marked {} clean",
            report.deleted, report.updated
        ))
    }
}

pub struct EnrichJob {
    enricher: Arc<Enricher>,
    mode: EnrichMode,
}

impl EnrichJob {
    pub fn new(enricher: Arc<Enricher>, mode: EnrichMode) -> Self {
        Self { enricher, mode }
    }
}

#[async_trait]
impl Job for EnrichJob {
    async fn run(&self) -> anyhow::Result<String> {
        let report = self.enricher.sweep(self.mode).await?;
        Ok(report.to_string())
    }
}

/// Builds the job for each task kind from shared collaborators.
pub struct JobFactory {
    store: NewsStore,
    sources: SourcesConfig,
    renderer: PageRenderer,
    enricher: Arc<Enricher>,
}

impl JobFactory {
    pub fn new(
        store: NewsStore,
        sources: SourcesConfig,
        renderer: PageRenderer,
        enricher: Arc<Enricher>,
    ) -> Self {
        Self {
            store,
            sources,
            renderer,
            enricher,
        }
    }

    /// Production wiring: renderer from env, HTTP content fetcher, provider
    /// from the enrich config.
    pub fn from_config(
        store: NewsStore,
        sources: SourcesConfig,
        enrich: &EnrichConfig,
    ) -> PipelineResult<Self> {
        let renderer = PageRenderer::from_env()?;
        let fetcher = Arc::new(HttpContentFetcher::new(enrich.content_chars)?);
        let provider = build_provider(enrich);
        tracing::info!(
            renderer = renderer.name(),
            provider = provider.name(),
            "pipeline collaborators ready"
        );
        let enricher = Arc::new(Enricher::new(
            store.clone(),
            fetcher,
            provider,
            enrich.taxonomy.clone(),
        ));
        Ok(Self::new(store, sources, renderer, enricher))
    }

    pub fn job(&self, kind: TaskKind) -> Arc<dyn Job> {
        let max = self.sources.max_items;
        let ingest = |provider: Box<dyn SourceProvider>| -> Arc<dyn Job> {
            Arc::new(IngestJob::new(
                kind.as_str(),
                vec![provider],
                self.store.clone(),
                max,
            ))
        };
        match kind {
            TaskKind::Baltics => ingest(Box::new(
                BalticsRssProvider::from_url(&self.sources.baltics_url).with_max_items(max),
            )),
            TaskKind::Euronext => ingest(Box::new(
                EuronextProvider::live(&self.sources.euronext_url, self.renderer.clone())
                    .with_max_items(max),
            )),
            TaskKind::Omx => ingest(Box::new(
                OmxProvider::live(&self.sources.omx_url, self.renderer.clone()).with_max_items(max),
            )),
            TaskKind::Clean => Arc::new(CleanJob::new(self.store.clone())),
            TaskKind::Enrich => self.enrich(EnrichMode::Full),
            TaskKind::EnrichContent => self.enrich(EnrichMode::Content),
            TaskKind::EnrichTags => self.enrich(EnrichMode::Tags),
            TaskKind::EnrichSummary => self.enrich(EnrichMode::Summary),
        }
    }

    fn enrich(&self, mode: EnrichMode) -> Arc<dyn Job> {
        Arc::new(EnrichJob::new(self.enricher.clone(), mode))
    }
}

/// Schedule every task listed in `tasks`. Returns how many were registered.
pub fn register_tasks(
    scheduler: &Scheduler,
    factory: &JobFactory,
    tasks: &TasksConfig,
) -> Result<usize, SchedulerError> {
    for (kind, hours) in &tasks.tasks {
        scheduler.schedule(*kind, factory.job(*kind), *hours)?;
    }
    Ok(tasks.tasks.len())
}

// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod clean;
pub mod config;
pub mod enrich;
pub mod error;
pub mod history;
pub mod ingest;
pub mod jobs;
pub mod metrics;
pub mod news;
pub mod scheduler;
pub mod store;

pub use crate::api::{router, AppState};
pub use crate::error::{PipelineError, PipelineResult};
pub use crate::scheduler::{Scheduler, TaskKind};
pub use crate::store::NewsStore;

use anyhow::Context;
use tracing::info;

/// Everything the binary needs, wired from env + config files:
/// store, job registry, scheduler (not yet started).
pub fn bootstrap() -> anyhow::Result<(NewsStore, Scheduler)> {
    let store = NewsStore::from_env().context("opening news store")?;
    let tasks = config::TasksConfig::load_default()?;
    let sources = config::load_sources_default()?;
    let enrich = config::EnrichConfig::load_default()?;

    let factory = jobs::JobFactory::from_config(store.clone(), sources, &enrich)
        .context("building pipeline jobs")?;
    let scheduler = Scheduler::new();
    let n = jobs::register_tasks(&scheduler, &factory, &tasks)?;
    info!(tasks = n, "task registry ready");
    Ok((store, scheduler))
}

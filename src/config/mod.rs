// src/config/mod.rs
//! File + env configuration for the pipeline.

pub mod enrich;
pub mod sources;
pub mod tasks;

pub use enrich::EnrichConfig;
pub use sources::{load_sources_default, SourcesConfig};
pub use tasks::TasksConfig;

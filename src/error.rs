// src/error.rs
//! Typed failure taxonomy shared by the pipeline stages.
//!
//! Job bodies still return `anyhow::Result` so callers can layer context; these
//! variants are what sits at the bottom of those chains.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// An ingestion source or a content fetch failed (network, parse, timeout).
    #[error("source fetch failed ({source_name}): {message}")]
    SourceFetch {
        source_name: String,
        message: String,
    },

    /// Summarization or tagging call failed.
    #[error("enrichment provider {provider} failed: {message}")]
    EnrichmentProvider {
        provider: &'static str,
        message: String,
    },

    /// A store write failed; the surrounding transaction has been rolled back.
    #[error("store transaction failed: {0}")]
    StoreTransaction(String),

    /// Control surface input was rejected before any state was touched.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn fetch(source_name: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::SourceFetch {
            source_name: source_name.into(),
            message: err.to_string(),
        }
    }

    pub fn provider(provider: &'static str, err: impl std::fmt::Display) -> Self {
        Self::EnrichmentProvider {
            provider,
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        Self::StoreTransaction(e.to_string())
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

// src/ingest/types.rs
use anyhow::Result;

use crate::news::NewsDraft;

/// One publisher feed. Implementations return whatever they could parse; the
/// caller applies normalization and the per-run cap.
#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    async fn fetch_latest(&self) -> Result<Vec<NewsDraft>>;
    fn name(&self) -> &'static str;
}

/// Result of one ingestion pass over a set of providers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub drafts: Vec<NewsDraft>,
    /// Drafts dropped for missing link or over the cap.
    pub dropped: usize,
    pub provider_errors: usize,
    pub providers: usize,
    /// `"<provider>: <error>"` per failed provider.
    pub errors: Vec<String>,
}

impl IngestOutcome {
    pub fn all_providers_failed(&self) -> bool {
        self.providers > 0 && self.provider_errors == self.providers
    }
}

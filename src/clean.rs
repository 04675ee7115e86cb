// src/clean.rs
//! Clean stage: drop duplicate links, then move survivors from raw to clean.

use std::collections::HashMap;

use metrics::counter;
use rusqlite::params;
use tracing::info;

use crate::error::PipelineResult;
use crate::news::NewsStatus;
use crate::store::{NewsStore, BELOW_CLEAN};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub deleted: usize,
    pub updated: usize,
}

/// Among rows sharing a link, pick the ids that are not canonical.
/// Canonical = earliest `downloaded_at`, lowest id on a tie.
pub fn non_canonical_ids(rows: &[(i64, String, i64)]) -> Vec<i64> {
    let mut canonical: HashMap<&str, (i64, i64)> = HashMap::new();
    for (id, link, downloaded) in rows {
        canonical
            .entry(link.as_str())
            .and_modify(|best| {
                if (*downloaded, *id) < (best.1, best.0) {
                    *best = (*id, *downloaded);
                }
            })
            .or_insert((*id, *downloaded));
    }

    let mut doomed: Vec<i64> = rows
        .iter()
        .filter(|(id, link, _)| canonical.get(link.as_str()).map(|c| c.0) != Some(*id))
        .map(|(id, _, _)| *id)
        .collect();
    doomed.sort_unstable();
    doomed
}

/// Deduplicate by link and advance everything below `clean` to `clean`.
///
/// One transaction: either both the delete and the status update land, or
/// nothing does and the error goes back to the caller.
pub fn remove_duplicates_and_mark_clean(store: &NewsStore) -> PipelineResult<CleanReport> {
    let report = store.transaction(|tx| {
        let rows: Vec<(i64, String, i64)> = {
            let mut stmt = tx.prepare("SELECT id, link, downloaded_at FROM news")?;
            let mapped = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
            let rows = mapped.collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        if rows.is_empty() {
            return Ok(CleanReport::default());
        }

        // Duplicates go first so the status update never touches a doomed row.
        let doomed = non_canonical_ids(&rows);
        let mut deleted = 0usize;
        {
            let mut del = tx.prepare("DELETE FROM news WHERE id = ?1")?;
            for id in &doomed {
                deleted += del.execute(params![id])?;
            }
        }

        let updated = tx.execute(
            &format!("UPDATE news SET status = ?1 WHERE {BELOW_CLEAN}"),
            params![NewsStatus::Clean.as_str()],
        )?;

        Ok(CleanReport { deleted, updated })
    })?;

    counter!("clean_deleted_total").increment(report.deleted as u64);
    counter!("clean_updated_total").increment(report.updated as u64);
    info!(
        target: "clean",
        deleted = report.deleted,
        updated = report.updated,
        "dedup + status advance committed"
    );
    Ok(report)
}

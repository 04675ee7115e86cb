//! Append-only in-memory log of task run outcomes.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunEntry {
    pub ts: DateTime<Utc>,
    pub task: String,
    pub success: bool,
    /// Job summary on success, error chain on failure.
    pub detail: String,
}

impl RunEntry {
    /// Human-readable line, as served by `/get_logs`.
    pub fn message(&self) -> String {
        let ts = self.ts.to_rfc3339_opts(SecondsFormat::Secs, true);
        if self.success {
            if self.detail.is_empty() {
                format!("{} task completed successfully at {ts}", self.task)
            } else {
                format!(
                    "{} task completed successfully at {ts} ({})",
                    self.task, self.detail
                )
            }
        } else {
            format!("Error in {} task at {ts}: {}", self.task, self.detail)
        }
    }
}

/// Unbounded: entries are small and the process is restarted long before
/// this matters.
#[derive(Debug, Default)]
pub struct RunHistory {
    inner: Mutex<Vec<RunEntry>>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: RunEntry) {
        let mut v = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        v.push(entry);
    }

    pub fn push_success(&self, task: &str, summary: &str) {
        self.push(RunEntry {
            ts: Utc::now(),
            task: task.to_string(),
            success: true,
            detail: summary.to_string(),
        });
    }

    pub fn push_failure(&self, task: &str, error: &str) {
        self.push(RunEntry {
            ts: Utc::now(),
            task: task.to_string(),
            success: false,
            detail: error.to_string(),
        });
    }

    pub fn snapshot(&self) -> Vec<RunEntry> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.snapshot().iter().map(RunEntry::message).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_keep_order_and_wording() {
        let h = RunHistory::new();
        h.push_success("clean", "deleted 1, updated 2");
        h.push_failure("omx", "source fetch failed (omx): timeout");
        h.push_success("baltics", "");

        let m = h.messages();
        assert_eq!(m.len(), 3);
        assert!(m[0].starts_with("clean task completed successfully at "));
        assert!(m[0].ends_with("(deleted 1, updated 2)"));
        assert!(m[1].starts_with("Error in omx task at "));
        assert!(m[1].ends_with(": source fetch failed (omx): timeout"));
        assert!(!m[2].contains('('));
    }
}

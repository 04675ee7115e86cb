// src/config/tasks.rs
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::scheduler::TaskKind;

pub const DEFAULT_TASKS_CONFIG_PATH: &str = "config/tasks.toml";
pub const ENV_TASKS_CONFIG_PATH: &str = "TASKS_CONFIG_PATH";

/// Which tasks get registered at startup, and how often (hours) they run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TasksConfig {
    pub tasks: BTreeMap<TaskKind, u32>,
}

#[derive(Deserialize)]
struct RawTasks {
    #[serde(default)]
    tasks: BTreeMap<String, u32>,
}

impl Default for TasksConfig {
    fn default() -> Self {
        let tasks = [
            (TaskKind::Baltics, 6),
            (TaskKind::Euronext, 1),
            (TaskKind::Omx, 1),
            (TaskKind::Clean, 2),
            (TaskKind::Enrich, 2),
        ]
        .into_iter()
        .collect();
        Self { tasks }
    }
}

impl TasksConfig {
    pub fn parse(s: &str) -> Result<Self> {
        let raw: RawTasks = toml::from_str(s).context("parsing tasks config")?;
        let mut tasks = BTreeMap::new();
        for (name, hours) in raw.tasks {
            let kind: TaskKind = name
                .parse()
                .with_context(|| format!("tasks config lists unknown task `{name}`"))?;
            if hours == 0 {
                bail!("task `{name}` needs a frequency of at least 1 hour");
            }
            tasks.insert(kind, hours);
        }
        Ok(Self { tasks })
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading tasks config from {}", path.display()))?;
        Self::parse(&s)
    }

    /// `$TASKS_CONFIG_PATH`, then `config/tasks.toml`, then the built-in
    /// registry.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_TASKS_CONFIG_PATH) {
            return Self::load_from(&PathBuf::from(p));
        }
        let p = PathBuf::from(DEFAULT_TASKS_CONFIG_PATH);
        if p.exists() {
            Self::load_from(&p)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry() {
        let cfg = TasksConfig::default();
        assert_eq!(cfg.tasks.len(), 5);
        assert_eq!(cfg.tasks[&TaskKind::Baltics], 6);
        assert_eq!(cfg.tasks[&TaskKind::Enrich], 2);
    }

    #[test]
    fn parses_names_and_rejects_bad_entries() {
        let cfg = TasksConfig::parse("[tasks]\nomx = 3\nenrich_tags = 12\n").unwrap();
        assert_eq!(cfg.tasks[&TaskKind::Omx], 3);
        assert_eq!(cfg.tasks[&TaskKind::EnrichTags], 12);

        assert!(TasksConfig::parse("[tasks]\nkaggle = 1\n").is_err());
        assert!(TasksConfig::parse("[tasks]\nclean = 0\n").is_err());
    }
}

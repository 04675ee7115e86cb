// src/config/sources.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::providers::{baltics_rss, euronext, omx};
use crate::ingest::DEFAULT_MAX_ITEMS;

const ENV_PATH: &str = "SOURCES_CONFIG_PATH";

fn default_max_items() -> usize {
    DEFAULT_MAX_ITEMS
}
fn default_baltics_url() -> String {
    baltics_rss::DEFAULT_URL.to_string()
}
fn default_euronext_url() -> String {
    euronext::DEFAULT_URL.to_string()
}
fn default_omx_url() -> String {
    omx::DEFAULT_URL.to_string()
}

/// Where each ingestion source reads from, plus the per-run draft cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_baltics_url")]
    pub baltics_url: String,
    #[serde(default = "default_euronext_url")]
    pub euronext_url: String,
    #[serde(default = "default_omx_url")]
    pub omx_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            baltics_url: default_baltics_url(),
            euronext_url: default_euronext_url(),
            omx_url: default_omx_url(),
        }
    }
}

/// Load from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<SourcesConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Load using env var + fallbacks:
/// 1) $SOURCES_CONFIG_PATH
/// 2) config/sources.toml
/// 3) config/sources.json
/// 4) built-in defaults
pub fn load_sources_default() -> Result<SourcesConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        } else {
            return Err(anyhow!("SOURCES_CONFIG_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    Ok(SourcesConfig::default())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<SourcesConfig> {
    let parsed = if hint_ext == "json" || s.trim_start().starts_with('{') {
        serde_json::from_str::<SourcesConfig>(s).map_err(anyhow::Error::from)
    } else {
        toml::from_str::<SourcesConfig>(s).map_err(anyhow::Error::from)
    };
    let mut cfg = parsed.context("unsupported sources config format")?;
    // The cap may be tightened, never loosened.
    cfg.max_items = cfg.max_items.clamp(1, DEFAULT_MAX_ITEMS);
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    #[test]
    fn toml_and_json_with_defaults() {
        let toml = r#"max_items = 20
omx_url = "http://localhost/omx""#;
        let cfg = parse_sources(toml, "toml").unwrap();
        assert_eq!(cfg.max_items, 20);
        assert_eq!(cfg.omx_url, "http://localhost/omx");
        assert_eq!(cfg.baltics_url, baltics_rss::DEFAULT_URL);

        let json = r#"{"max_items": 5000}"#;
        let cfg = parse_sources(json, "json").unwrap();
        assert_eq!(cfg.max_items, DEFAULT_MAX_ITEMS);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // Isolate CWD so a real config/ in the repo doesn't interfere
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_PATH);

        // No files in temp CWD → defaults
        let v = load_sources_default().unwrap();
        assert_eq!(v, SourcesConfig::default());

        // Env wins
        let p_json = tmp.path().join("sources.json");
        fs::write(&p_json, r#"{"max_items": 7}"#).unwrap();
        env::set_var(ENV_PATH, p_json.display().to_string());
        let v2 = load_sources_default().unwrap();
        assert_eq!(v2.max_items, 7);
        env::remove_var(ENV_PATH);

        env::set_current_dir(&old).unwrap();
    }
}

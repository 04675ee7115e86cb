// src/config/enrich.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};

pub const DEFAULT_ENRICH_CONFIG_PATH: &str = "config/enrich.json";
pub const ENV_ENRICH_CONFIG_PATH: &str = "ENRICH_CONFIG_PATH";
pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_AI_TEST_MODE: &str = "AI_TEST_MODE";

/// `AI_TEST_MODE=mock` swaps in the deterministic provider; no key needed.
pub fn mock_mode() -> bool {
    env::var(ENV_AI_TEST_MODE)
        .map(|v| v == "mock")
        .unwrap_or(false)
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_cache_dir() -> Option<String> {
    Some("cache/enrich".to_string())
}
fn default_content_chars() -> usize {
    1000
}

/// Tags the tagger picks from when the config doesn't list its own.
pub fn default_taxonomy() -> Vec<String> {
    [
        "Earnings",
        "Dividends",
        "Mergers & Acquisitions",
        "Management Changes",
        "Share Buyback",
        "Capital Raising",
        "Regulatory",
        "Guidance",
        "Contracts & Orders",
        "Shareholder Meeting",
        "Insider Trading",
        "Other",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    pub enabled: bool,
    /// "openai" | "mock" (case-insensitive)
    pub provider: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_taxonomy")]
    pub taxonomy: Vec<String>,
    /// Response cache directory; `null` disables caching.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: Option<String>,
    /// Fetched article text is truncated to this many characters.
    #[serde(default = "default_content_chars")]
    pub content_chars: usize,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            api_key: String::new(),
            model: default_model(),
            taxonomy: default_taxonomy(),
            cache_dir: default_cache_dir(),
            content_chars: default_content_chars(),
        }
    }
}

impl EnrichConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: EnrichConfig = serde_json::from_str(&data)?;

        // Normalize provider
        cfg.provider = cfg.provider.to_lowercase();

        // Resolve api key if "ENV"
        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = match cfg.provider.as_str() {
                _ if mock_mode() => String::new(),
                "openai" => match env::var(ENV_OPENAI_API_KEY) {
                    Ok(key) if !key.trim().is_empty() => key,
                    _ => {
                        tracing::warn!(
                            "{ENV_OPENAI_API_KEY} not set; AI enrichment disabled, \
                             items get failure placeholders"
                        );
                        cfg.enabled = false;
                        String::new()
                    }
                },
                "mock" => String::new(),
                other => anyhow::bail!("Unsupported provider in config: {other}"),
            };
        }

        cfg.taxonomy.retain(|t| !t.trim().is_empty());
        if cfg.taxonomy.is_empty() {
            cfg.taxonomy = default_taxonomy();
        }
        if cfg.content_chars == 0 {
            cfg.content_chars = default_content_chars();
        }

        Ok(cfg)
    }

    /// `$ENRICH_CONFIG_PATH`, then `config/enrich.json`; a disabled default
    /// when neither exists.
    pub fn load_default() -> anyhow::Result<Self> {
        let path = env::var(ENV_ENRICH_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_ENRICH_CONFIG_PATH));
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::warn!(path = %path.display(), "enrich config missing; AI enrichment disabled");
            Ok(Self::default())
        }
    }
}

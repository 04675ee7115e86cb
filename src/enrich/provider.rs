//! Enrichment provider: tagging + summarization behind one trait, with an
//! OpenAI implementation, a file response cache and mock/disabled variants.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::enrich::EnrichConfig;
use crate::error::{PipelineError, PipelineResult};

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    /// Pick one tag from `taxonomy` that best describes `content`.
    async fn tag(&self, content: &str, taxonomy: &[String]) -> PipelineResult<String>;
    /// Short summary of `content`.
    async fn summarize(&self, content: &str) -> PipelineResult<String>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynProvider = Arc<dyn EnrichmentProvider>;

/// Factory: build a provider according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns the deterministic mock.
/// * Else if `config.enabled == false`, returns a disabled provider (every call
///   fails, so items get the error sentinels).
/// * Else builds the configured provider, wrapped in the response cache when a
///   cache dir is set.
pub fn build_provider(config: &EnrichConfig) -> DynProvider {
    if crate::config::enrich::mock_mode() {
        return Arc::new(MockProvider);
    }

    if !config.enabled {
        return Arc::new(DisabledProvider);
    }

    match config.provider.as_str() {
        "openai" => match OpenAiProvider::new(&config.api_key, &config.model) {
            Ok(p) => match &config.cache_dir {
                Some(dir) => Arc::new(CachingProvider::new(p, PathBuf::from(dir))),
                None => Arc::new(p),
            },
            Err(e) => {
                tracing::error!(target: "enrich", error = %e, "openai provider unavailable");
                Arc::new(DisabledProvider)
            }
        },
        "mock" => Arc::new(MockProvider),
        other => {
            tracing::warn!(
                target: "enrich",
                provider = other,
                "unknown provider; enrichment disabled"
            );
            Arc::new(DisabledProvider)
        }
    }
}

// ------------------------------------------------------------
// OpenAI
// ------------------------------------------------------------

/// Chat Completions client. An empty key fails every call.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, model: &str) -> PipelineResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent("nordic-news-pipeline/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Config(format!("building openai client: {e}")))?;
        Ok(Self {
            http,
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    async fn complete(&self, prompt: &str) -> PipelineResult<String> {
        if self.api_key.is_empty() {
            return Err(PipelineError::provider("openai", "missing api key"));
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: 0.2,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| PipelineError::provider("openai", e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::provider("openai", format!("HTTP {status}")));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| PipelineError::provider("openai", e))?;
        let cleaned = body
            .choices
            .first()
            .map(|c| sanitize_output(&c.message.content))
            .unwrap_or_default();
        if cleaned.is_empty() {
            return Err(PipelineError::provider("openai", "empty completion"));
        }
        Ok(cleaned)
    }
}

#[async_trait]
impl EnrichmentProvider for OpenAiProvider {
    async fn tag(&self, content: &str, taxonomy: &[String]) -> PipelineResult<String> {
        let prompt = format!(
            "Answering with one tag only, pick the tag which best describes the news \"{content}\" from the list: {}",
            taxonomy.join(", ")
        );
        let raw = self.complete(&prompt).await?;
        Ok(match_tag(&raw, taxonomy).unwrap_or(raw))
    }

    async fn summarize(&self, content: &str) -> PipelineResult<String> {
        let prompt = format!(
            "Summarize this company announcement in a brief, lively way (50 words or less): \"{content}\""
        );
        self.complete(&prompt).await
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Map a free-form model answer onto a taxonomy entry (case-insensitive,
/// exact first, then containment).
pub fn match_tag(raw: &str, taxonomy: &[String]) -> Option<String> {
    let answer = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.')
        .to_lowercase();
    taxonomy
        .iter()
        .find(|t| t.to_lowercase() == answer)
        .or_else(|| {
            taxonomy
                .iter()
                .find(|t| answer.contains(&t.to_lowercase()))
        })
        .cloned()
}

// ------------------------------------------------------------
// Disabled + mock
// ------------------------------------------------------------

/// Fails every call; used when AI enrichment is disabled.
pub struct DisabledProvider;

#[async_trait]
impl EnrichmentProvider for DisabledProvider {
    async fn tag(&self, _content: &str, _taxonomy: &[String]) -> PipelineResult<String> {
        Err(PipelineError::provider("disabled", "AI enrichment disabled"))
    }
    async fn summarize(&self, _content: &str) -> PipelineResult<String> {
        Err(PipelineError::provider("disabled", "AI enrichment disabled"))
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic stand-in for tests and local runs: tags by keyword match,
/// summarizes by truncation.
pub struct MockProvider;

#[async_trait]
impl EnrichmentProvider for MockProvider {
    async fn tag(&self, content: &str, taxonomy: &[String]) -> PipelineResult<String> {
        let lower = content.to_lowercase();
        let hit = taxonomy
            .iter()
            .find(|t| {
                t.split(|c: char| !c.is_alphanumeric())
                    .filter(|w| w.len() > 3)
                    .any(|w| lower.contains(&w.to_lowercase()))
            })
            .or_else(|| taxonomy.last());
        hit.cloned()
            .ok_or_else(|| PipelineError::provider("mock", "empty taxonomy"))
    }

    async fn summarize(&self, content: &str) -> PipelineResult<String> {
        let words: Vec<&str> = content.split_whitespace().take(50).collect();
        if words.is_empty() {
            return Err(PipelineError::provider("mock", "nothing to summarize"));
        }
        Ok(words.join(" "))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching wrapper (file cache)
// ------------------------------------------------------------

/// Answers repeated prompts from disk. Only successful answers are cached.
///
/// Entries are never evicted and the directory has no size limit. An
/// unusable directory degrades to uncached calls.
pub struct CachingProvider<P: EnrichmentProvider> {
    inner: P,
    cache_dir: PathBuf,
}

impl<P: EnrichmentProvider> CachingProvider<P> {
    pub fn new(inner: P, cache_dir: PathBuf) -> Self {
        if let Err(e) = fs::create_dir_all(&cache_dir) {
            tracing::warn!(
                target: "enrich",
                dir = %cache_dir.display(),
                error = %e,
                "cache dir unavailable; responses will not be cached"
            );
        }
        Self { inner, cache_dir }
    }

    async fn cached<F>(&self, key: String, call: F) -> PipelineResult<String>
    where
        F: std::future::Future<Output = PipelineResult<String>> + Send,
    {
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            return Ok(hit);
        }
        let fresh = call.await?;
        if let Err(e) = write_cache_file(&self.cache_dir, &key, &fresh) {
            tracing::debug!(target: "enrich", error = %e, "cache write failed");
        }
        Ok(fresh)
    }
}

#[async_trait]
impl<P: EnrichmentProvider> EnrichmentProvider for CachingProvider<P> {
    async fn tag(&self, content: &str, taxonomy: &[String]) -> PipelineResult<String> {
        let key = cache_key(&["tag", self.inner.name(), &taxonomy.join("|"), content]);
        self.cached(key, self.inner.tag(content, taxonomy)).await
    }

    async fn summarize(&self, content: &str) -> PipelineResult<String> {
        let key = cache_key(&["summary", self.inner.name(), content]);
        self.cached(key, self.inner.summarize(content)).await
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[derive(Serialize, Deserialize)]
struct CacheEntry {
    value: String,
}

fn cache_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<String> {
    let s = fs::read_to_string(cache_path(dir, key)).ok()?;
    serde_json::from_str::<CacheEntry>(&s).ok().map(|e| e.value)
}

fn write_cache_file(dir: &Path, key: &str, value: &str) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(&CacheEntry {
        value: value.to_string(),
    })
    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Sanitization
// ------------------------------------------------------------

/// Single line, collapsed whitespace, no wrapping quotes, <= 600 chars.
pub fn sanitize_output(input: &str) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == '"' || c.is_whitespace());
    trimmed.chars().take(600).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn taxonomy() -> Vec<String> {
        vec!["Earnings".into(), "Dividends".into(), "Other".into()]
    }

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl EnrichmentProvider for Counting {
        async fn tag(&self, _c: &str, _t: &[String]) -> PipelineResult<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok("Earnings".into())
        }
        async fn summarize(&self, _c: &str) -> PipelineResult<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(PipelineError::provider("counting", "boom"))
        }
        fn name(&self) -> &'static str {
            "counting"
        }
    }

    #[test]
    fn tag_matching_is_lenient() {
        let t = taxonomy();
        assert_eq!(match_tag(" \"dividends\". ", &t).as_deref(), Some("Dividends"));
        assert_eq!(
            match_tag("The best tag is Earnings", &t).as_deref(),
            Some("Earnings")
        );
        assert_eq!(match_tag("Weather", &t), None);
    }

    #[test]
    fn sanitize_collapses_and_unquotes() {
        assert_eq!(sanitize_output("  \"Hello\n\n  world\"  "), "Hello world");
    }

    #[tokio::test]
    async fn cache_serves_repeats_but_not_failures() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let p = CachingProvider::new(Counting(calls.clone()), dir.path().to_path_buf());

        assert_eq!(p.tag("q3 profit", &taxonomy()).await.unwrap(), "Earnings");
        assert_eq!(p.tag("q3 profit", &taxonomy()).await.unwrap(), "Earnings");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(p.summarize("x").await.is_err());
        assert!(p.summarize("x").await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unusable_cache_dir_falls_through_to_provider() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let p = CachingProvider::new(Counting(calls.clone()), blocker.join("cache"));

        assert_eq!(p.tag("q3 profit", &taxonomy()).await.unwrap(), "Earnings");
        assert_eq!(p.tag("q3 profit", &taxonomy()).await.unwrap(), "Earnings");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn mock_is_deterministic() {
        let t = taxonomy();
        assert_eq!(
            MockProvider.tag("Board proposes dividends of 1 EUR", &t).await.unwrap(),
            "Dividends"
        );
        assert_eq!(MockProvider.tag("Weather update", &t).await.unwrap(), "Other");
        assert!(MockProvider.summarize("   ").await.is_err());
    }

    #[tokio::test]
    async fn disabled_always_fails() {
        assert!(DisabledProvider.tag("x", &taxonomy()).await.is_err());
        assert!(DisabledProvider.summarize("x").await.is_err());
    }
}

// src/ingest/render.rs
//! Fetches page HTML for the listing scrapers. The exchange listings are
//! rendered client-side, so production goes through a Browserless `/content`
//! endpoint; without one configured we fall back to a plain GET.

use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};

pub const ENV_BROWSERLESS_URL: &str = "BROWSERLESS_URL";
pub const ENV_BROWSERLESS_TOKEN: &str = "BROWSERLESS_TOKEN";

const USER_AGENT: &str = "nordic-news-pipeline/0.1";

#[derive(Clone)]
pub enum PageRenderer {
    Direct {
        client: reqwest::Client,
    },
    Browserless {
        client: reqwest::Client,
        base_url: String,
        token: Option<String>,
    },
}

fn http_client(timeout: Duration) -> PipelineResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(5))
        .timeout(timeout)
        .build()
        .map_err(|e| PipelineError::Config(format!("building http client: {e}")))
}

impl PageRenderer {
    pub fn direct() -> PipelineResult<Self> {
        Ok(Self::Direct {
            client: http_client(Duration::from_secs(20))?,
        })
    }

    pub fn browserless(base_url: &str, token: Option<&str>) -> PipelineResult<Self> {
        Ok(Self::Browserless {
            // Rendering waits for the page's own XHRs; give it room.
            client: http_client(Duration::from_secs(120))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    /// Browserless when `$BROWSERLESS_URL` is set, direct otherwise.
    pub fn from_env() -> PipelineResult<Self> {
        match std::env::var(ENV_BROWSERLESS_URL) {
            Ok(url) if !url.trim().is_empty() => {
                let token = std::env::var(ENV_BROWSERLESS_TOKEN).ok();
                Self::browserless(&url, token.as_deref())
            }
            _ => Self::direct(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PageRenderer::Direct { .. } => "direct",
            PageRenderer::Browserless { .. } => "browserless",
        }
    }

    pub async fn html(&self, url: &str) -> PipelineResult<String> {
        let resp = match self {
            PageRenderer::Direct { client } => client.get(url).send().await,
            PageRenderer::Browserless {
                client,
                base_url,
                token,
            } => {
                let mut endpoint = format!("{base_url}/content");
                if let Some(token) = token {
                    endpoint.push_str(&format!("?token={token}"));
                }
                client
                    .post(&endpoint)
                    .json(&serde_json::json!({ "url": url }))
                    .send()
                    .await
            }
        }
        .map_err(|e| PipelineError::fetch(self.name(), e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::fetch(
                self.name(),
                format!("{url}: HTTP {status}: {}", body.chars().take(200).collect::<String>()),
            ));
        }
        resp.text()
            .await
            .map_err(|e| PipelineError::fetch(self.name(), e))
    }
}

// src/enrich/content.rs
//! Article body fetcher: GET the link, keep paragraph text only.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::error::{PipelineError, PipelineResult};

#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> PipelineResult<String>;
}

pub struct HttpContentFetcher {
    client: reqwest::Client,
    max_chars: usize,
}

impl HttpContentFetcher {
    pub fn new(max_chars: usize) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent("nordic-news-pipeline/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| PipelineError::Config(format!("building content client: {e}")))?;
        Ok(Self { client, max_chars })
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(&self, url: &str) -> PipelineResult<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::fetch("content", e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::fetch("content", format!("{url}: HTTP {status}")));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| PipelineError::fetch("content", e))?;
        let text = paragraph_text(&body, self.max_chars);
        if text.is_empty() {
            return Err(PipelineError::fetch("content", format!("{url}: no paragraph text")));
        }
        Ok(text)
    }
}

/// Space-joined text of every `<p>`, whitespace collapsed, truncated to
/// `max_chars` characters.
pub fn paragraph_text(html: &str, max_chars: usize) -> String {
    let doc = Html::parse_document(html);
    let Ok(sel) = Selector::parse("p") else {
        return String::new();
    };
    let joined = doc
        .select(&sel)
        .map(|p| p.text().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(" ");
    joined
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect()
}

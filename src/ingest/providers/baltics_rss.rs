use anyhow::{Context, Result};
use async_trait::async_trait;
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::ingest::types::SourceProvider;
use crate::ingest::UNKNOWN_COMPANY;
use crate::news::NewsDraft;

pub const PUBLISHER: &str = "baltics";
pub const DEFAULT_URL: &str = "https://nasdaqbaltic.com/statistics/en/news?rss=1&num=100";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    issuer: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    OffsetDateTime::parse(ts.trim(), &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
}

/// Nasdaq Baltic company announcements RSS.
pub struct BalticsRssProvider {
    mode: Mode,
    max_items: usize,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl BalticsRssProvider {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
            max_items: crate::ingest::DEFAULT_MAX_ITEMS,
        }
    }

    pub fn from_url(url: &str) -> Self {
        Self {
            mode: Mode::Http {
                url: url.to_string(),
                client: reqwest::Client::new(),
            },
            max_items: crate::ingest::DEFAULT_MAX_ITEMS,
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<NewsDraft>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing baltics rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len().min(self.max_items));
        for it in rss.channel.item.into_iter().take(self.max_items) {
            out.push(NewsDraft {
                title: it.title.unwrap_or_default(),
                link: it.link.unwrap_or_default(),
                company: it.issuer.unwrap_or_else(|| UNKNOWN_COMPANY.to_string()),
                published_date: it.pub_date.as_deref().and_then(parse_rfc2822),
                publisher: PUBLISHER.to_string(),
                industry: None,
                publisher_topic: None,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("ingest_parse_ms").record(ms);
        Ok(out)
    }
}

#[async_trait]
impl SourceProvider for BalticsRssProvider {
    async fn fetch_latest(&self) -> Result<Vec<NewsDraft>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items_from_str(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .context("baltics http get()")?
                    .text()
                    .await
                    .context("baltics http .text()")?;
                self.parse_items_from_str(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        PUBLISHER
    }
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_ITEMS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>x</title>
<item><title>Dividend&nbsp;notice</title><link>https://nasdaqbaltic.com/n/1</link>
<pubDate>Mon, 03 Jun 2024 09:00:00 +0300</pubDate><issuer>Tallink Grupp</issuer></item>
<item><title>No issuer</title><link>https://nasdaqbaltic.com/n/2</link><pubDate>garbage</pubDate></item>
</channel></rss>"#;

    #[tokio::test]
    async fn parses_issuer_and_dates() {
        let items = BalticsRssProvider::from_fixture(TWO_ITEMS)
            .fetch_latest()
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].company, "Tallink Grupp");
        assert_eq!(items[0].title, "Dividend notice");
        assert_eq!(
            items[0].published_date.map(|d| d.timestamp()),
            Some(1_717_394_400)
        );
        assert_eq!(items[1].company, UNKNOWN_COMPANY);
        assert!(items[1].published_date.is_none());
        assert!(items.iter().all(|d| d.publisher == PUBLISHER));
    }

    #[tokio::test]
    async fn empty_channel_is_ok() {
        let xml = r#"<rss><channel><title>x</title></channel></rss>"#;
        let items = BalticsRssProvider::from_fixture(xml)
            .fetch_latest()
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn broken_xml_is_an_error() {
        let res = BalticsRssProvider::from_fixture("<rss><channel>")
            .fetch_latest()
            .await;
        assert!(res.is_err());
    }
}

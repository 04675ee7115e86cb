// src/ingest/providers/omx.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};

use crate::ingest::render::PageRenderer;
use crate::ingest::types::SourceProvider;
use crate::ingest::{normalize_text, parse_listing_date, DEFAULT_MAX_ITEMS};
use crate::news::NewsDraft;

pub const PUBLISHER: &str = "omx";
pub const DEFAULT_URL: &str = "https://www.nasdaqomxnordic.com/news/companynews";

/// Nasdaq Nordic company news search table.
/// Columns: date | company | category | headline (link) | ...
pub struct OmxProvider {
    mode: Mode,
    max_items: usize,
}

enum Mode {
    Fixture(String),
    Live { url: String, renderer: PageRenderer },
}

impl OmxProvider {
    pub fn from_fixture(html: &str) -> Self {
        Self {
            mode: Mode::Fixture(html.to_string()),
            max_items: DEFAULT_MAX_ITEMS,
        }
    }

    pub fn live(url: &str, renderer: PageRenderer) -> Self {
        Self {
            mode: Mode::Live {
                url: url.to_string(),
                renderer,
            },
            max_items: DEFAULT_MAX_ITEMS,
        }
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }
}

fn cell_text(el: &ElementRef<'_>) -> String {
    normalize_text(&el.text().collect::<String>())
}

pub fn parse_table(html: &str, max_items: usize) -> Result<Vec<NewsDraft>> {
    let doc = Html::parse_document(html);
    let row_sel = Selector::parse("#searchNewsTableId tbody tr")
        .map_err(|e| anyhow!("row selector: {e:?}"))?;
    let td_sel = Selector::parse("td").map_err(|e| anyhow!("cell selector: {e:?}"))?;
    let a_sel = Selector::parse("a").map_err(|e| anyhow!("link selector: {e:?}"))?;

    let mut out = Vec::new();
    for row in doc.select(&row_sel) {
        if out.len() >= max_items {
            break;
        }
        let cols: Vec<ElementRef<'_>> = row.select(&td_sel).collect();
        if cols.len() < 5 {
            continue;
        }
        let Some(anchor) = cols[3].select(&a_sel).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let category = cell_text(&cols[2]);
        out.push(NewsDraft {
            title: cell_text(&anchor),
            link: href.trim().to_string(),
            company: cell_text(&cols[1]),
            published_date: parse_listing_date(&cell_text(&cols[0])),
            publisher: PUBLISHER.to_string(),
            industry: None,
            publisher_topic: Some(category).filter(|s| !s.is_empty()),
        });
    }
    Ok(out)
}

#[async_trait]
impl SourceProvider for OmxProvider {
    async fn fetch_latest(&self) -> Result<Vec<NewsDraft>> {
        let items = match &self.mode {
            Mode::Fixture(html) => parse_table(html, self.max_items)?,
            Mode::Live { url, renderer } => {
                let html = renderer.html(url).await?;
                parse_table(&html, self.max_items)?
            }
        };
        if items.is_empty() {
            tracing::warn!(
                target: "ingest",
                provider = PUBLISHER,
                "news table empty or not rendered"
            );
        }
        Ok(items)
    }

    fn name(&self) -> &'static str {
        PUBLISHER
    }
}

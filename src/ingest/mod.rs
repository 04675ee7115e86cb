// src/ingest/mod.rs
pub mod providers;
pub mod render;
pub mod types;

use crate::ingest::types::{IngestOutcome, SourceProvider};
use crate::news::NewsDraft;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;

/// Per-source, per-run cap on drafts.
pub const DEFAULT_MAX_ITEMS: usize = 100;

/// Placeholder for a company the feed doesn't name.
pub const UNKNOWN_COMPANY: &str = "N/A";

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Drafts kept after normalization + cap.");
        describe_counter!(
            "ingest_dropped_total",
            "Drafts dropped for missing link or over the per-run cap."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors."
        );
        describe_gauge!("ingest_last_run_ts", "Unix ts when an ingest pass last ran.");
    });
}

/// Normalize text: decode entities, strip tags, collapse whitespace, trim.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap: 500 chars (titles and listing cells only)
    if out.chars().count() > 500 {
        out = out.chars().take(500).collect();
    }

    out
}

fn normalize_opt(s: Option<String>) -> Option<String> {
    s.map(|v| normalize_text(&v)).filter(|v| !v.is_empty())
}

/// Best-effort parse of the date strings found in exchange listings.
/// Naive values are taken as UTC.
pub fn parse_listing_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    const DATETIME_FORMATS: [&str; 5] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%d %b %Y %H:%M",
        "%d/%m/%Y %H:%M",
        "%d.%m.%Y %H:%M",
    ];
    for f in DATETIME_FORMATS {
        if let Ok(n) = NaiveDateTime::parse_from_str(s, f) {
            return Some(n.and_utc());
        }
    }
    const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d %b %Y", "%d/%m/%Y", "%d.%m.%Y"];
    for f in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, f) {
            return d.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
        }
    }
    None
}

/// Normalize text fields, drop drafts without a link, cap at `max_items`.
/// Returns (kept, dropped).
pub fn normalize_and_cap(raw: Vec<NewsDraft>, max_items: usize) -> (Vec<NewsDraft>, usize) {
    let total = raw.len();
    let kept: Vec<NewsDraft> = raw
        .into_iter()
        .filter_map(|d| {
            let link = d.link.trim().to_string();
            if link.is_empty() || link == UNKNOWN_COMPANY {
                return None;
            }
            let company = normalize_text(&d.company);
            Some(NewsDraft {
                title: normalize_text(&d.title),
                link,
                company: if company.is_empty() {
                    UNKNOWN_COMPANY.to_string()
                } else {
                    company
                },
                published_date: d.published_date,
                publisher: d.publisher,
                industry: normalize_opt(d.industry),
                publisher_topic: normalize_opt(d.publisher_topic),
            })
        })
        .take(max_items)
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

/// Run every provider once. A failing provider contributes nothing and is
/// counted; it never aborts the pass.
pub async fn run_once(providers: &[Box<dyn SourceProvider>], max_items: usize) -> IngestOutcome {
    ensure_metrics_described();

    let mut outcome = IngestOutcome {
        providers: providers.len(),
        ..Default::default()
    };
    for p in providers {
        match p.fetch_latest().await {
            Ok(raw) => {
                let (mut kept, dropped) = normalize_and_cap(raw, max_items);
                tracing::info!(
                    target: "ingest",
                    provider = p.name(),
                    kept = kept.len(),
                    dropped,
                    "provider fetched"
                );
                outcome.dropped += dropped;
                outcome.drafts.append(&mut kept);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = ?e, provider = p.name(), "provider error");
                counter!("ingest_provider_errors_total").increment(1);
                outcome.provider_errors += 1;
                outcome.errors.push(format!("{}: {e:#}", p.name()));
            }
        }
    }

    let now = Utc::now().timestamp().max(0);
    counter!("ingest_items_total").increment(outcome.drafts.len() as u64);
    counter!("ingest_dropped_total").increment(outcome.dropped as u64);
    gauge!("ingest_last_run_ts").set(now as f64);

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn draft(link: &str, title: &str) -> NewsDraft {
        NewsDraft {
            title: title.into(),
            link: link.into(),
            company: "  ".into(),
            published_date: None,
            publisher: "omx".into(),
            industry: Some("   ".into()),
            publisher_topic: Some("Annual&nbsp;report".into()),
        }
    }

    #[test]
    fn normalize_text_collapses_ws_and_tags() {
        let s = "  <b>Hello</b>,&nbsp;&nbsp; world!  ";
        assert_eq!(normalize_text(s), "Hello, world!");
    }

    #[test]
    fn drafts_without_link_are_dropped_and_fields_cleaned() {
        let (kept, dropped) = normalize_and_cap(
            vec![draft("", "x"), draft("N/A", "y"), draft(" http://a ", " Q3  results ")],
            100,
        );
        assert_eq!(dropped, 2);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].link, "http://a");
        assert_eq!(kept[0].title, "Q3 results");
        assert_eq!(kept[0].company, UNKNOWN_COMPANY);
        assert_eq!(kept[0].industry, None);
        assert_eq!(kept[0].publisher_topic.as_deref(), Some("Annual report"));
    }

    #[test]
    fn cap_applies_after_filtering() {
        let raw: Vec<_> = (0..150).map(|i| draft(&format!("http://x/{i}"), "t")).collect();
        let (kept, dropped) = normalize_and_cap(raw, DEFAULT_MAX_ITEMS);
        assert_eq!(kept.len(), 100);
        assert_eq!(dropped, 50);
        assert_eq!(kept[0].link, "http://x/0");
    }

    #[test]
    fn listing_dates() {
        let d = parse_listing_date("2024-06-03 08:15:00").unwrap();
        assert_eq!((d.year(), d.month(), d.day(), d.hour()), (2024, 6, 3, 8));
        let d = parse_listing_date("03 Jun 2024 09:30").unwrap();
        assert_eq!((d.day(), d.minute()), (3, 30));
        assert!(parse_listing_date("Tue, 04 Jun 2024 10:00:00 +0300").is_some());
        assert!(parse_listing_date("03/06/2024").is_some());
        assert!(parse_listing_date("yesterday").is_none());
        assert!(parse_listing_date("").is_none());
    }
}

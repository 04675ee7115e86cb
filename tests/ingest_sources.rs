// tests/ingest_sources.rs
//
// Source parsing from fixtures, the ingest pass, and the ingest job's
// success/failure contract as seen through the scheduler.

use std::sync::Arc;

use async_trait::async_trait;
use nordic_news_pipeline::ingest::providers::{
    baltics_rss::BalticsRssProvider, euronext::EuronextProvider, omx::OmxProvider,
};
use nordic_news_pipeline::ingest::{self, types::SourceProvider};
use nordic_news_pipeline::jobs::IngestJob;
use nordic_news_pipeline::news::{NewsDraft, NewsStatus};
use nordic_news_pipeline::scheduler::{RunOutcome, Scheduler, TaskKind, TaskStatus};
use nordic_news_pipeline::store::NewsStore;

const BALTICS_XML: &str = include_str!("fixtures/baltics_rss.xml");
const EURONEXT_HTML: &str = include_str!("fixtures/euronext_news.html");
const OMX_HTML: &str = include_str!("fixtures/omx_news.html");

struct Down;

#[async_trait]
impl SourceProvider for Down {
    async fn fetch_latest(&self) -> anyhow::Result<Vec<NewsDraft>> {
        anyhow::bail!("connection refused")
    }
    fn name(&self) -> &'static str {
        "down"
    }
}

#[tokio::test]
async fn baltics_fixture() {
    let items = BalticsRssProvider::from_fixture(BALTICS_XML)
        .fetch_latest()
        .await
        .unwrap();
    assert_eq!(items.len(), 4);
    assert_eq!(items[0].company, "Tallink Grupp");
    assert_eq!(items[1].title, "Ignitis grupė interim report for Q1 2024");
    assert!(items[0].published_date.is_some());

    let capped = BalticsRssProvider::from_fixture(BALTICS_XML)
        .with_max_items(2)
        .fetch_latest()
        .await
        .unwrap();
    assert_eq!(capped.len(), 2);
}

#[tokio::test]
async fn euronext_fixture() {
    let items = EuronextProvider::from_fixture(EURONEXT_HTML)
        .fetch_latest()
        .await
        .unwrap();
    assert_eq!(items.len(), 2, "rows without a link are skipped");

    let first = &items[0];
    assert_eq!(first.company, "Equinor");
    assert_eq!(first.title, "Equinor & partners sanction new field");
    assert_eq!(
        first.link,
        "https://live.euronext.com/en/listview/company-press-release/1001"
    );
    assert_eq!(first.industry.as_deref(), Some("Energy"));
    assert_eq!(first.publisher_topic.as_deref(), Some("Other"));
    assert!(first.published_date.is_some());

    assert_eq!(
        items[1].link,
        "https://live.euronext.com/en/listview/company-press-release/1002"
    );
}

#[tokio::test]
async fn omx_fixture() {
    let items = OmxProvider::from_fixture(OMX_HTML)
        .fetch_latest()
        .await
        .unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[1].company, "Volvo AB");
    assert_eq!(items[1].publisher_topic.as_deref(), Some("Inside information"));
    assert_eq!(items[1].link, "https://view.news.eu.nasdaq.com/view?id=b2");
    assert!(items.iter().all(|d| d.industry.is_none() && d.publisher == "omx"));
}

#[tokio::test]
async fn run_once_drops_linkless_and_survives_a_down_provider() {
    let providers: Vec<Box<dyn SourceProvider>> = vec![
        Box::new(BalticsRssProvider::from_fixture(BALTICS_XML)),
        Box::new(Down),
        Box::new(OmxProvider::from_fixture(OMX_HTML)),
    ];
    let outcome = ingest::run_once(&providers, ingest::DEFAULT_MAX_ITEMS).await;
    assert_eq!(outcome.drafts.len(), 3 + 3);
    assert_eq!(outcome.dropped, 1);
    assert_eq!(outcome.provider_errors, 1);
    assert!(!outcome.all_providers_failed());
    assert!(outcome.errors[0].starts_with("down: connection refused"));
}

#[tokio::test]
async fn ingest_job_stores_raw_rows() {
    let store = NewsStore::open_in_memory().unwrap();
    let s = Scheduler::new();
    let job = IngestJob::new(
        "baltics",
        vec![Box::new(BalticsRssProvider::from_fixture(BALTICS_XML))],
        store.clone(),
        100,
    );
    s.schedule(TaskKind::Baltics, Arc::new(job), 6).unwrap();

    let outcome = s.run_now(TaskKind::Baltics).await.unwrap();
    assert_eq!(
        outcome,
        RunOutcome::Completed("inserted 3, dropped 1".into())
    );
    let items = store.list_all().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i.status == NewsStatus::Raw));

    // A second pass inserts duplicates; dedup is the clean stage's job.
    s.run_now(TaskKind::Baltics).await.unwrap();
    assert_eq!(store.count().unwrap(), 6);
}

#[tokio::test]
async fn ingest_job_fails_when_every_provider_is_down() {
    let store = NewsStore::open_in_memory().unwrap();
    let s = Scheduler::new();
    let job = IngestJob::new("omx", vec![Box::new(Down)], store.clone(), 100);
    s.schedule(TaskKind::Omx, Arc::new(job), 1).unwrap();

    let outcome = s.run_now(TaskKind::Omx).await.unwrap();
    match outcome {
        RunOutcome::Failed(detail) => {
            assert!(detail.contains("source fetch failed (omx)"), "{detail}");
            assert!(detail.contains("connection refused"), "{detail}");
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(s.record(TaskKind::Omx).unwrap().status, TaskStatus::Failed);
    assert_eq!(store.count().unwrap(), 0);
    assert!(s.history().messages()[0].starts_with("Error in omx task at "));
}

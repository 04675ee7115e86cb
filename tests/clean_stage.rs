// tests/clean_stage.rs
//
// Dedup + raw -> clean against a real (in-memory) SQLite store.

use chrono::{Duration, TimeZone, Utc};
use nordic_news_pipeline::clean::{remove_duplicates_and_mark_clean, CleanReport};
use nordic_news_pipeline::news::{NewsDraft, NewsStatus};
use nordic_news_pipeline::store::{EnrichmentPatch, NewsStore};

fn draft(link: &str, title: &str) -> NewsDraft {
    NewsDraft {
        title: title.into(),
        link: link.into(),
        company: "Tallink Grupp".into(),
        published_date: None,
        publisher: "baltics".into(),
        industry: None,
        publisher_topic: None,
    }
}

fn status_of(store: &NewsStore, id: i64) -> Option<NewsStatus> {
    store.get(id).unwrap().map(|i| i.status)
}

#[test]
fn earliest_copy_survives_and_everything_is_clean() {
    let store = NewsStore::open_in_memory().unwrap();
    let t1 = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
    let t2 = t1 + Duration::hours(1);

    // id 1 = L @ T1, id 2 = M @ T1, id 3 = L @ T2
    store
        .insert_drafts(&[draft("https://x/L", "first"), draft("https://x/M", "other")], t1)
        .unwrap();
    store.insert_drafts(&[draft("https://x/L", "again")], t2).unwrap();

    let report = remove_duplicates_and_mark_clean(&store).unwrap();
    assert_eq!(report, CleanReport { deleted: 1, updated: 2 });

    let items = store.list_all().unwrap();
    assert_eq!(items.len(), 2);
    let l = items.iter().find(|i| i.link == "https://x/L").unwrap();
    assert_eq!(l.title, "first");
    assert_eq!(l.downloaded_at, t1);
    assert!(items.iter().all(|i| i.status == NewsStatus::Clean));
    assert!(store.get(3).unwrap().is_none());
}

#[test]
fn second_run_is_a_no_op() {
    let store = NewsStore::open_in_memory().unwrap();
    let t = Utc::now();
    store
        .insert_drafts(&[draft("https://x/a", "a"), draft("https://x/a", "a2")], t)
        .unwrap();

    let first = remove_duplicates_and_mark_clean(&store).unwrap();
    assert_eq!(first, CleanReport { deleted: 1, updated: 1 });
    // Same timestamp: the lower id is canonical.
    assert!(store.get(1).unwrap().is_some());
    assert!(store.get(2).unwrap().is_none());

    let second = remove_duplicates_and_mark_clean(&store).unwrap();
    assert_eq!(second, CleanReport::default());
}

#[test]
fn empty_store_reports_zero() {
    let store = NewsStore::open_in_memory().unwrap();
    assert_eq!(
        remove_duplicates_and_mark_clean(&store).unwrap(),
        CleanReport { deleted: 0, updated: 0 }
    );
}

#[test]
fn advanced_items_are_not_regressed_and_legacy_status_is_picked_up() {
    let store = NewsStore::open_in_memory().unwrap();
    store
        .insert_drafts(
            &[
                draft("https://x/1", "one"),
                draft("https://x/2", "two"),
                draft("https://x/3", "three"),
            ],
            Utc::now(),
        )
        .unwrap();
    store
        .apply_enrichment(
            1,
            &EnrichmentPatch {
                target_status: Some(NewsStatus::Enriched),
                ..Default::default()
            },
        )
        .unwrap();
    store
        .execute_batch(
            "UPDATE news SET status = NULL WHERE id = 2; \
             UPDATE news SET status = 'weird' WHERE id = 3;",
        )
        .unwrap();

    let report = remove_duplicates_and_mark_clean(&store).unwrap();
    assert_eq!(report, CleanReport { deleted: 0, updated: 2 });
    assert_eq!(status_of(&store, 1), Some(NewsStatus::Enriched));
    assert_eq!(status_of(&store, 2), Some(NewsStatus::Clean));
    assert_eq!(status_of(&store, 3), Some(NewsStatus::Clean));
}

#[test]
fn odd_casing_of_advanced_statuses_is_not_regressed() {
    let store = NewsStore::open_in_memory().unwrap();
    store
        .insert_drafts(
            &[
                draft("https://x/1", "one"),
                draft("https://x/2", "two"),
                draft("https://x/3", "three"),
            ],
            Utc::now(),
        )
        .unwrap();
    store
        .execute_batch(
            "UPDATE news SET status = 'Enriched' WHERE id = 1; \
             UPDATE news SET status = ' CONTENT_ENRICHED' WHERE id = 2; \
             UPDATE news SET status = 'Fully_Enriched' WHERE id = 3;",
        )
        .unwrap();

    let report = remove_duplicates_and_mark_clean(&store).unwrap();
    assert_eq!(report, CleanReport { deleted: 0, updated: 0 });
    assert_eq!(status_of(&store, 1), Some(NewsStatus::Enriched));
    assert_eq!(status_of(&store, 2), Some(NewsStatus::ContentEnriched));
    assert_eq!(status_of(&store, 3), Some(NewsStatus::Enriched));
}

#[test]
fn failure_mid_transaction_rolls_back_the_deletes() {
    let store = NewsStore::open_in_memory().unwrap();
    let t = Utc::now();
    store
        .insert_drafts(&[draft("https://x/a", "a"), draft("https://x/b", "b")], t)
        .unwrap();
    store
        .insert_drafts(&[draft("https://x/a", "dup")], t + Duration::minutes(5))
        .unwrap();
    store
        .execute_batch(
            "CREATE TRIGGER block_clean BEFORE UPDATE OF status ON news \
             WHEN NEW.status = 'clean' BEGIN SELECT RAISE(ABORT, 'clean blocked'); END;",
        )
        .unwrap();

    let err = remove_duplicates_and_mark_clean(&store).unwrap_err();
    assert!(err.to_string().contains("clean blocked"), "{err}");

    // The duplicate delete happened before the failing update; it must be undone.
    assert_eq!(store.count().unwrap(), 3);
    assert!(store
        .list_all()
        .unwrap()
        .iter()
        .all(|i| i.status == NewsStatus::Raw));

    store.execute_batch("DROP TRIGGER block_clean;").unwrap();
    assert_eq!(
        remove_duplicates_and_mark_clean(&store).unwrap(),
        CleanReport { deleted: 1, updated: 2 }
    );
}

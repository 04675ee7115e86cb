// tests/bootstrap.rs
//
// Service wiring from the shipped config/ files with no AI credentials.

use std::env;

use nordic_news_pipeline::config::enrich::{ENV_AI_TEST_MODE, ENV_OPENAI_API_KEY};
use nordic_news_pipeline::scheduler::{RunOutcome, TaskKind};
use serial_test::serial;

fn clear_env() {
    for var in [
        "DATABASE_URL",
        "ENRICH_CONFIG_PATH",
        "TASKS_CONFIG_PATH",
        "SOURCES_CONFIG_PATH",
        ENV_OPENAI_API_KEY,
        ENV_AI_TEST_MODE,
    ] {
        env::remove_var(var);
    }
}

#[serial]
#[tokio::test]
async fn boots_without_an_openai_key() {
    clear_env();
    env::set_var("DATABASE_URL", ":memory:");

    let (store, scheduler) = nordic_news_pipeline::bootstrap().expect("bootstrap");
    assert_eq!(scheduler.registered().len(), 5);

    // Enrichment degrades to placeholders instead of taking the service down.
    let outcome = scheduler.run_now(TaskKind::Enrich).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed(_)), "{outcome:?}");
    assert_eq!(store.count().unwrap(), 0);
    clear_env();
}

#[serial]
#[tokio::test]
async fn boots_in_mock_mode_without_an_openai_key() {
    clear_env();
    env::set_var("DATABASE_URL", ":memory:");
    env::set_var(ENV_AI_TEST_MODE, "mock");

    let (_store, scheduler) = nordic_news_pipeline::bootstrap().expect("bootstrap");
    assert!(scheduler.registered().contains(&TaskKind::Enrich));
    clear_env();
}

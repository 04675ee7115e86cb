use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. Fails if one is already installed.
    pub fn init() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("scheduler_runs_total", "Task runs finished, by task.");
        describe_counter!(
            "scheduler_run_failures_total",
            "Task runs that ended Failed, by task."
        );
        describe_gauge!("scheduler_last_run_ts", "Unix ts of the last finished run, by task.");
        describe_counter!("clean_deleted_total", "Duplicate rows removed by the clean stage.");
        describe_counter!("clean_updated_total", "Rows advanced to clean.");

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

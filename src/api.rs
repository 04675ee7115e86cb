// src/api.rs
//! HTTP control surface: trigger and monitor the scheduled tasks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shuttle_axum::axum::{
    extract::{rejection::FormRejection, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::error::PipelineError;
use crate::scheduler::{Scheduler, SchedulerError, TaskKind, TaskRecord};

#[derive(Clone)]
pub struct AppState {
    pub scheduler: Scheduler,
}

impl AppState {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(|| async { "ok" }))
        .route("/start", post(start))
        .route("/stop", post(stop))
        .route("/run_task/{name}", post(run_task))
        .route("/set_frequency/{name}", post(set_frequency))
        .route("/get_logs", get(get_logs))
        .route("/scheduler_status", get(scheduler_status))
        .route("/task_info", get(task_info))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct StatusResp {
    status: String,
}

fn status(code: StatusCode, msg: impl Into<String>) -> Response {
    (code, Json(StatusResp { status: msg.into() })).into_response()
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        match self {
            PipelineError::InvalidRequest(msg) => status(StatusCode::BAD_REQUEST, msg),
            other => {
                tracing::error!(target: "api", error = %other, "request failed");
                status(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        }
    }
}

impl IntoResponse for SchedulerError {
    fn into_response(self) -> Response {
        match self {
            SchedulerError::UnknownTask(_) => {
                PipelineError::InvalidRequest("Invalid task name".into()).into_response()
            }
            SchedulerError::InvalidFrequency(_) => {
                PipelineError::InvalidRequest("Invalid frequency".into()).into_response()
            }
            SchedulerError::AlreadyRunning(kind) => {
                status(StatusCode::CONFLICT, format!("{kind} task already running"))
            }
        }
    }
}

/// Parse a path segment into a task the scheduler actually has.
fn registered_task(state: &AppState, name: &str) -> Result<TaskKind, SchedulerError> {
    let kind: TaskKind = name.parse()?;
    if state.scheduler.is_registered(kind) {
        Ok(kind)
    } else {
        Err(SchedulerError::UnknownTask(name.to_string()))
    }
}

async fn start(State(state): State<AppState>) -> Response {
    state.scheduler.start();
    status(StatusCode::OK, "Scheduler started")
}

async fn stop(State(state): State<AppState>) -> Response {
    state.scheduler.stop();
    status(StatusCode::OK, "Scheduler stopped")
}

async fn run_task(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, SchedulerError> {
    let kind = registered_task(&state, &name)?;
    // The outcome lands in the run history; the response only confirms the run.
    let _outcome = state.scheduler.run_now(kind).await?;
    Ok(status(StatusCode::OK, format!("{kind} task executed")))
}

#[derive(Deserialize)]
struct FrequencyForm {
    frequency: String,
}

async fn set_frequency(
    State(state): State<AppState>,
    Path(name): Path<String>,
    form: Result<Form<FrequencyForm>, FormRejection>,
) -> Result<Response, SchedulerError> {
    let kind = registered_task(&state, &name)?;
    let hours = form
        .ok()
        .and_then(|Form(f)| f.frequency.trim().parse::<u32>().ok())
        .filter(|h| *h >= 1)
        .ok_or_else(|| SchedulerError::InvalidFrequency(name.clone()))?;
    state.scheduler.set_frequency(kind, hours)?;
    Ok(status(
        StatusCode::OK,
        format!("{kind} frequency set to {hours} hours"),
    ))
}

#[derive(Serialize)]
struct LogsResp {
    logs: Vec<String>,
}

async fn get_logs(State(state): State<AppState>) -> Json<LogsResp> {
    Json(LogsResp {
        logs: state.scheduler.history().messages(),
    })
}

async fn scheduler_status(State(state): State<AppState>) -> Response {
    let s = if state.scheduler.is_started() {
        "Running"
    } else {
        "Stopped"
    };
    status(StatusCode::OK, s)
}

async fn task_info(State(state): State<AppState>) -> Json<BTreeMap<TaskKind, TaskRecord>> {
    Json(state.scheduler.task_info())
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let sched = if state.scheduler.is_started() {
        "Running"
    } else {
        "Stopped"
    };
    let mut rows = String::new();
    for (kind, rec) in state.scheduler.task_info() {
        let name = html_escape::encode_text(kind.as_str());
        rows.push_str(&format!(
            "<tr><td>{name}</td><td>{}</td><td>{} h</td>\
             <td><form method=\"post\" action=\"/run_task/{name}\"><button>Run now</button></form></td>\
             <td><form method=\"post\" action=\"/set_frequency/{name}\">\
             <input name=\"frequency\" type=\"number\" min=\"1\" value=\"{}\"><button>Set</button></form></td></tr>\n",
            html_escape::encode_text(rec.status.as_str()),
            rec.frequency,
            rec.frequency,
        ));
    }
    let mut logs = String::new();
    for line in state.scheduler.history().messages().iter().rev().take(50) {
        logs.push_str(&format!("<li>{}</li>\n", html_escape::encode_text(line)));
    }
    Html(format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>News pipeline</title></head><body>\n\
         <h1>News pipeline</h1>\n<p>Scheduler: <strong>{sched}</strong></p>\n\
         <form method=\"post\" action=\"/start\"><button>Start</button></form>\n\
         <form method=\"post\" action=\"/stop\"><button>Stop</button></form>\n\
         <table>\n<tr><th>Task</th><th>Status</th><th>Frequency</th><th></th><th></th></tr>\n{rows}</table>\n\
         <h2>Recent runs</h2>\n<ul>\n{logs}</ul>\n</body></html>\n"
    ))
}

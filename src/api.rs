// src/api.rs
//! Thin JSON surface over the filter system.
//!
//! Host application:
//! - `POST /submissions/check` → 200 with the decision, 403 when rejected
//!
//! Administration:
//! - `GET /admin/log`, `GET|DELETE /admin/log/{id}`, `POST /admin/log/{id}/train`
//! - `GET|PUT /admin/policy`
//! - `GET /admin/strategies`, `PUT /admin/strategies/{name}/karma`
//! - `GET /admin/bayes`, `POST /admin/bayes/{train,test,reset}`

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::classifier;
use crate::config::PolicyPatch;
use crate::engine::FilterSystem;
use crate::error::SpamError;
use crate::storage::{LogEntry, LogFilter};
use crate::submission::Submission;

pub const DEFAULT_PAGE_SIZE: usize = 15;
pub const MIN_PAGE_SIZE: usize = 5;
pub const MAX_PAGE_SIZE: usize = 1000;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FilterSystem>,
}

impl AppState {
    pub fn new(engine: FilterSystem) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/submissions/check", post(check_submission))
        .route("/admin/log", get(list_log))
        .route("/admin/log/{id}", get(show_log_entry).delete(delete_log_entry))
        .route("/admin/log/{id}/train", post(train_log_entry))
        .route("/admin/policy", get(get_policy).put(put_policy))
        .route("/admin/strategies", get(list_strategies))
        .route("/admin/strategies/{name}/karma", put(put_strategy_karma))
        .route("/admin/bayes", get(bayes_stats))
        .route("/admin/bayes/train", post(bayes_train))
        .route("/admin/bayes/test", post(bayes_test))
        .route("/admin/bayes/reset", post(bayes_reset))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// `SpamError` as an HTTP response.
pub struct ApiError(SpamError);

impl From<SpamError> for ApiError {
    fn from(e: SpamError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            SpamError::Rejected(_) => StatusCode::FORBIDDEN,
            SpamError::Config(_) => StatusCode::BAD_REQUEST,
            SpamError::LogEntryNotFound(_) | SpamError::UnknownStrategy(_) => StatusCode::NOT_FOUND,
            SpamError::EntryState(_) => StatusCode::CONFLICT,
            SpamError::Storage(e) => {
                error!(target: "api", error = %e, "storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn check_submission(
    State(state): State<AppState>,
    Json(submission): Json<Submission>,
) -> ApiResult<Response> {
    let decision = state.engine.evaluate(submission).await?;
    if let Some(rejection) = decision.rejection() {
        let body = json!({
            "error": "rejected",
            "message": rejection.message(),
            "html": rejection.to_html(),
            "score": rejection.score,
            "reasons": rejection.reasons,
            "log_id": decision.log_id,
        });
        return Ok((StatusCode::FORBIDDEN, Json(body)).into_response());
    }
    Ok(Json(decision).into_response())
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    page: Option<usize>,
    num: Option<usize>,
    ip: Option<String>,
}

#[derive(Serialize)]
struct LogPage {
    page: usize,
    num: usize,
    total: u64,
    entries: Vec<LogEntry>,
}

async fn list_log(State(state): State<AppState>, Query(q): Query<LogQuery>) -> ApiResult<Json<LogPage>> {
    let num = q
        .num
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
    let page = q.page.unwrap_or(1).max(1);
    let filter = LogFilter {
        ip: q.ip.filter(|ip| !ip.is_empty()),
    };
    let offset = (page - 1)
        .checked_mul(num)
        .ok_or_else(|| SpamError::Config(format!("page {page} is out of range")))?;
    let log = state.engine.audit_log();
    let entries = log.select(&filter, num, offset)?;
    Ok(Json(LogPage {
        page,
        num,
        total: log.count_matching(&filter)?,
        entries,
    }))
}

#[derive(Serialize)]
struct LogEntryView {
    entry: LogEntry,
    next_id: Option<i64>,
    previous_id: Option<i64>,
}

async fn show_log_entry(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Json<LogEntryView>> {
    let log = state.engine.audit_log();
    let entry = log.fetch(id)?.ok_or(SpamError::LogEntryNotFound(id))?;
    let next_id = log.next(&entry)?.and_then(|e| e.id);
    let previous_id = log.previous(&entry)?.and_then(|e| e.id);
    Ok(Json(LogEntryView {
        entry,
        next_id,
        previous_id,
    }))
}

async fn delete_log_entry(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<StatusCode> {
    if state.engine.audit_log().delete(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(SpamError::LogEntryNotFound(id).into())
    }
}

#[derive(Debug, Deserialize)]
struct TrainBody {
    spam: bool,
}

async fn train_log_entry(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<TrainBody>,
) -> ApiResult<impl IntoResponse> {
    let summary = state.engine.retrain(id, body.spam).await?;
    Ok(Json(summary))
}

async fn get_policy(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.policy())
}

async fn put_policy(State(state): State<AppState>, Json(patch): Json<PolicyPatch>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.update_policy(&patch)?))
}

async fn list_strategies(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.strategies())
}

#[derive(Debug, Deserialize)]
struct KarmaBody {
    points: i32,
}

async fn put_strategy_karma(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<KarmaBody>,
) -> ApiResult<impl IntoResponse> {
    state.engine.set_strategy_karma(&name, body.points)?;
    Ok(Json(state.engine.strategies()))
}

async fn bayes_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let store = state.engine.database().classifier();
    let totals = store.totals()?;
    Ok(Json(json!({
        "nspam": totals.nspam,
        "nham": totals.nham,
        "words": store.word_count()?,
    })))
}

#[derive(Debug, Deserialize)]
struct BayesBody {
    content: String,
    #[serde(default)]
    spam: bool,
}

async fn bayes_train(State(state): State<AppState>, Json(body): Json<BayesBody>) -> ApiResult<StatusCode> {
    let tokens = classifier::tokenize(&body.content);
    state.engine.database().classifier().train(&tokens, body.spam)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bayes_test(State(state): State<AppState>, Json(body): Json<BayesBody>) -> ApiResult<impl IntoResponse> {
    let p = state.engine.database().classifier().probability(&body.content)?;
    Ok(Json(json!({ "probability": p })))
}

async fn bayes_reset(State(state): State<AppState>) -> ApiResult<StatusCode> {
    state.engine.database().classifier().reset()?;
    Ok(StatusCode::NO_CONTENT)
}

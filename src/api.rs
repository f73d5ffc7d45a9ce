use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::briefing::BriefingSnapshot;
use crate::commands::{
    today, BriefingService, CollectBriefing, CommandError, DispatchDigest, DispatchOutcome,
    ProgressView,
};
use crate::dispatch::{DispatchError, DispatchReport};
use crate::export::{csv_artifact, markdown_artifact, Artifact};
use crate::ingest::config::parse_keyword_input;
use crate::roster::{ImportStatus, RawRow, Recipient};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BriefingService>,
}

impl AppState {
    pub fn new(service: BriefingService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/briefing", get(current_briefing))
        .route("/briefing/collect", post(collect))
        .route("/briefing/reset", post(reset))
        .route("/progress", get(progress))
        .route("/digest.html", get(digest_html))
        .route("/digest.md", get(digest_markdown))
        .route("/export/markdown", get(export_markdown))
        .route("/export/csv", get(export_csv))
        .route("/roster/preview", post(roster_preview))
        .route("/dispatch", post(dispatch))
        .route("/dispatch/cancel", post(cancel_dispatch))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Same as [`create_router`]; shorter name for callers.
pub fn router(state: AppState) -> Router {
    create_router(state)
}

/// Command failure rendered as `{ "error": ... }` with a fitting status.
pub struct ApiError(CommandError);

impl From<CommandError> for ApiError {
    fn from(e: CommandError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.0.to_string();
        match self.0 {
            CommandError::InvalidRange { .. }
            | CommandError::NoKeywords
            | CommandError::MissingCredentials => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            CommandError::NoBriefing | CommandError::Superseded | CommandError::DispatchBusy => {
                (StatusCode::CONFLICT, Json(json!({ "error": message }))).into_response()
            }
            CommandError::Dispatch(DispatchError::AuthFailure(_)) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": message,
                    "summary": DispatchReport::default().summary(),
                })),
            )
                .into_response(),
            CommandError::Dispatch(DispatchError::Session { results, .. }) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": message, "results": results })),
            )
                .into_response(),
            CommandError::Other(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message })))
                    .into_response()
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct CollectReq {
    /// Comma-separated; configured keywords when absent.
    #[serde(default)]
    keywords: Option<String>,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

#[derive(serde::Serialize)]
struct CollectResp {
    keywords: usize,
    articles: usize,
    failed_keywords: Vec<String>,
}

async fn collect(
    State(state): State<AppState>,
    Json(body): Json<CollectReq>,
) -> Result<Json<CollectResp>, ApiError> {
    let keywords = match body.keywords.as_deref() {
        Some(raw) => parse_keyword_input(raw),
        None => state.service.config().keywords.clone(),
    };
    let snapshot = state
        .service
        .collect(CollectBriefing {
            keywords,
            start_date: body.start_date,
            end_date: body.end_date,
        })
        .await?;
    Ok(Json(CollectResp {
        keywords: snapshot.len(),
        articles: snapshot.total_articles(),
        failed_keywords: snapshot.failed_keywords.clone(),
    }))
}

async fn reset(State(state): State<AppState>) -> StatusCode {
    state.service.reset();
    StatusCode::NO_CONTENT
}

async fn current_briefing(
    State(state): State<AppState>,
) -> Result<Json<BriefingSnapshot>, ApiError> {
    let snapshot = state.service.current().ok_or(CommandError::NoBriefing)?;
    Ok(Json(snapshot.as_ref().clone()))
}

async fn progress(State(state): State<AppState>) -> Json<ProgressView> {
    Json(state.service.progress())
}

async fn digest_html(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let doc = state.service.document(today())?;
    Ok(Html(doc.to_html()))
}

async fn digest_markdown(State(state): State<AppState>) -> Result<Response, ApiError> {
    let doc = state.service.document(today())?;
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        doc.to_markdown(),
    )
        .into_response())
}

fn download(artifact: Artifact) -> Response {
    (
        [
            (header::CONTENT_TYPE, artifact.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", artifact.filename),
            ),
        ],
        artifact.bytes,
    )
        .into_response()
}

async fn export_markdown(State(state): State<AppState>) -> Result<Response, ApiError> {
    let day = today();
    let doc = state.service.document(day)?;
    Ok(download(markdown_artifact(&doc, day)))
}

async fn export_csv(State(state): State<AppState>) -> Result<Response, ApiError> {
    let day = today();
    let doc = state.service.document(day)?;
    Ok(download(csv_artifact(&doc, day)))
}

#[derive(serde::Deserialize, Default)]
struct RosterReq {
    #[serde(default)]
    sheet_url: Option<String>,
}

#[derive(serde::Serialize)]
struct RosterResp {
    status: ImportStatus,
    rows: usize,
    recipients: Vec<Recipient>,
}

async fn roster_preview(
    State(state): State<AppState>,
    Json(body): Json<RosterReq>,
) -> Json<RosterResp> {
    let (recipients, import) = state.service.load_roster(body.sheet_url.as_deref()).await;
    Json(RosterResp {
        status: import.status,
        rows: import.rows.len(),
        recipients,
    })
}

#[derive(serde::Deserialize, Default)]
struct DispatchReq {
    #[serde(default)]
    sender_address: Option<String>,
    #[serde(default)]
    sender_secret: Option<String>,
    #[serde(default)]
    sheet_url: Option<String>,
    #[serde(default)]
    rows: Option<Vec<RawRow>>,
}

async fn dispatch(
    State(state): State<AppState>,
    Json(body): Json<DispatchReq>,
) -> Result<Json<DispatchOutcome>, ApiError> {
    let outcome = state
        .service
        .dispatch(DispatchDigest {
            sender_address: body.sender_address,
            sender_secret: body.sender_secret,
            roster_locator: body.sheet_url,
            rows: body.rows,
        })
        .await?;
    Ok(Json(outcome))
}

async fn cancel_dispatch(State(state): State<AppState>) -> StatusCode {
    state.service.cancel_dispatch();
    StatusCode::ACCEPTED
}

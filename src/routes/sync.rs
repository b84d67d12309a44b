//! Sync API endpoints
//!
//! Preview, start, poll and cancel sync runs.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::compare::{load_comparison, LoadedComparison, SnapshotSource};
use crate::content::ContentType;
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::sync::{plan_sync, CancelOutcome, SyncPreview, SyncRequest, SyncResult};

/// Create the sync router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/preview", post(preview_sync))
        .route("/blocks", post(sync_blocks))
        .route("/pages", post(sync_pages))
        .route("/status/:id", get(get_sync_status))
        .route("/:id/cancel", post(cancel_sync))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub run_id: i64,
    pub message: String,
}

/// Plan a request from the cached snapshots
///
/// Reads nothing from the platforms and writes nothing, so execute runs
/// exactly the plan the preview showed for the same snapshots.
async fn build_preview(
    state: &AppState,
    req: &SyncRequest,
) -> Result<(SyncPreview, LoadedComparison)> {
    let loaded = load_comparison(
        state,
        req.source_instance_id,
        req.destination_instance_id,
        req.content_type,
        SnapshotSource::Cached,
    )
    .await?;

    let plan = plan_sync(&loaded.comparison, &req.items, &req.store_view_mapping)?;
    Ok((SyncPreview::new(req, plan), loaded))
}

/// Show the writes a sync would perform
async fn preview_sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncPreview>> {
    let (preview, _) = build_preview(&state, &req).await?;
    Ok(Json(preview))
}

async fn sync_blocks(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<(StatusCode, Json<SyncResult>)> {
    execute_sync(state, ContentType::Blocks, req).await
}

async fn sync_pages(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<(StatusCode, Json<SyncResult>)> {
    execute_sync(state, ContentType::Pages, req).await
}

/// Start a background sync run
async fn execute_sync(
    state: AppState,
    content_type: ContentType,
    req: SyncRequest,
) -> Result<(StatusCode, Json<SyncResult>)> {
    if req.content_type != content_type {
        return Err(AppError::BadRequest(format!(
            "Request is for {} but was sent to the {} endpoint",
            req.content_type, content_type
        )));
    }

    let (preview, loaded) = build_preview(&state, &req).await?;

    let run = state
        .sync_manager()
        .start(&loaded.source, loaded.destination, content_type, preview.items)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(run)))
}

/// Get the state of a sync run
async fn get_sync_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<SyncResult>> {
    let run = state
        .sync_manager()
        .get_status(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sync run not found: {}", id)))?;
    Ok(Json(run))
}

/// Stop a run before its next item
async fn cancel_sync(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<CancelResponse>)> {
    match state.sync_manager().cancel(id).await? {
        CancelOutcome::Cancelled => Ok((
            StatusCode::ACCEPTED,
            Json(CancelResponse {
                run_id: id,
                message: "Cancellation requested; the run stops before its next item".into(),
            }),
        )),
        CancelOutcome::NotActive => Err(AppError::Conflict(format!(
            "Sync run {} is no longer active",
            id
        ))),
        CancelOutcome::NotFound => Err(AppError::NotFound(format!("Sync run not found: {}", id))),
    }
}

//! Sync history API routes

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::sync::{HistoryQuery, SyncHistoryRepository, SyncResult};

/// Create the history router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_runs))
        .route("/:id", get(get_run))
}

/// List sync runs, newest first
async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<SyncResult>>> {
    let runs = SyncHistoryRepository::new(state.db())
        .list_runs(&query)
        .await?;
    Ok(Json(runs))
}

/// Get one sync run
async fn get_run(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<SyncResult>> {
    let run = SyncHistoryRepository::new(state.db())
        .get_run(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sync run not found: {}", id)))?;
    Ok(Json(run))
}

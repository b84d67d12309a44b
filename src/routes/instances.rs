//! Instance API routes

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::content::ContentType;
use crate::db::{DataSnapshot, Instance, InstanceRepository};
use crate::error::{AppError, Result};
use crate::platform::{PlatformApi, StoreView};
use crate::state::AppState;

/// Create the instances router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_instances))
        .route("/:id/test", post(test_connection))
        .route("/:id/snapshots", get(list_snapshots))
        .route("/:id/refresh/:content_type", post(refresh_content))
}

/// Load a registered instance or fail with 404
pub(crate) async fn load_instance(state: &AppState, id: i64) -> Result<Instance> {
    InstanceRepository::new(state.db())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Instance not found: {}", id)))
}

/// Platform client for an instance
pub(crate) fn connect(state: &AppState, instance: &Instance) -> Result<Arc<dyn PlatformApi>> {
    Ok(state.connector().connect(instance)?)
}

#[derive(Debug, Serialize)]
pub struct ConnectionTestResponse {
    pub success: bool,
    pub message: String,
    pub store_views: Vec<StoreView>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub instance_id: i64,
    pub content_type: ContentType,
    pub item_count: usize,
}

/// List registered instances
async fn list_instances(State(state): State<AppState>) -> Result<Json<Vec<Instance>>> {
    let instances = InstanceRepository::new(state.db()).list().await?;
    Ok(Json(instances))
}

/// Check that an instance answers authenticated requests
async fn test_connection(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ConnectionTestResponse>> {
    let instance = load_instance(&state, id).await?;

    let checked = match state.connector().connect(&instance) {
        Ok(api) => api.check_connection().await,
        Err(e) => Err(e),
    };

    let response = match checked {
        Ok(store_views) => ConnectionTestResponse {
            success: true,
            message: format!(
                "Connected to {} ({} store views)",
                instance.name,
                store_views.len()
            ),
            store_views,
        },
        Err(e) => {
            tracing::warn!(instance = %instance.name, "Connection test failed: {}", e);
            ConnectionTestResponse {
                success: false,
                message: e.to_string(),
                store_views: Vec::new(),
            }
        }
    };

    Ok(Json(response))
}

/// Snapshot bookkeeping for an instance
async fn list_snapshots(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<DataSnapshot>>> {
    let instance = load_instance(&state, id).await?;
    let snapshots = state.content_store().snapshot_info(instance.id).await?;
    Ok(Json(snapshots))
}

/// Fetch fresh content from the platform
async fn refresh_content(
    State(state): State<AppState>,
    Path((id, content_type)): Path<(i64, ContentType)>,
) -> Result<Json<RefreshResponse>> {
    let instance = load_instance(&state, id).await?;
    let api = connect(&state, &instance)?;

    let records = state
        .content_store()
        .refresh(&instance, content_type, api.as_ref())
        .await?;

    Ok(Json(RefreshResponse {
        instance_id: instance.id,
        content_type,
        item_count: records.len(),
    }))
}

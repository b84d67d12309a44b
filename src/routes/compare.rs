//! Comparison API routes

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use super::instances::{connect, load_instance};
use crate::compare::{compare, diff, ComparisonResult, DiffField, ItemStatus, Side};
use crate::content::{ContentRecord, ContentType};
use crate::db::Instance;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Create the compare router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(compare_instances))
        .route("/diff", post(diff_item))
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub source_instance_id: i64,
    pub destination_instance_id: i64,
    #[serde(alias = "data_type")]
    pub content_type: ContentType,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct DiffRequest {
    pub source_instance_id: i64,
    pub destination_instance_id: i64,
    #[serde(alias = "data_type")]
    pub content_type: ContentType,
    pub key: String,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Serialize)]
pub struct DiffResponse {
    pub key: String,
    pub title: String,
    pub status: ItemStatus,
    pub fields: Vec<DiffField>,
    pub has_differences: bool,
}

/// Both instances of a comparison and its result
pub(crate) struct LoadedComparison {
    pub source: Instance,
    pub destination: Instance,
    pub comparison: ComparisonResult,
}

/// Where a comparison takes its records from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SnapshotSource {
    /// Cached snapshots only; a missing snapshot is a bad request
    Cached,
    /// Cached snapshots, fetching the ones that are missing
    FetchMissing,
    /// Fresh records from both platforms
    Refresh,
}

impl SnapshotSource {
    pub(crate) fn from_force_refresh(force_refresh: bool) -> Self {
        if force_refresh {
            Self::Refresh
        } else {
            Self::FetchMissing
        }
    }
}

/// Load both sides and compare them
pub(crate) async fn load_comparison(
    state: &AppState,
    source_id: i64,
    destination_id: i64,
    content_type: ContentType,
    snapshots: SnapshotSource,
) -> Result<LoadedComparison> {
    if source_id == destination_id {
        return Err(AppError::BadRequest(
            "Source and destination must be different instances".into(),
        ));
    }

    let source = load_instance(state, source_id).await?;
    let destination = load_instance(state, destination_id).await?;

    let source_records =
        side_records(state, &source, Side::Source, content_type, snapshots).await?;
    let destination_records =
        side_records(state, &destination, Side::Destination, content_type, snapshots).await?;

    let comparison = compare(&source_records, &destination_records, content_type)?;

    tracing::debug!(
        source = %source.name,
        destination = %destination.name,
        content_type = %content_type,
        items = comparison.items.len(),
        snapshots = ?snapshots,
        "Compared content"
    );

    Ok(LoadedComparison {
        source,
        destination,
        comparison,
    })
}

async fn side_records(
    state: &AppState,
    instance: &Instance,
    side: Side,
    content_type: ContentType,
    snapshots: SnapshotSource,
) -> Result<Vec<ContentRecord>> {
    let store = state.content_store();

    if snapshots == SnapshotSource::Cached {
        return store.load(instance.id, content_type).await?.ok_or_else(|| {
            AppError::BadRequest(format!(
                "No {} snapshot found for {} instance '{}'. Run a comparison first.",
                content_type, side, instance.name
            ))
        });
    }

    let api = connect(state, instance)?;
    store
        .get_or_refresh(
            instance,
            content_type,
            api.as_ref(),
            snapshots == SnapshotSource::Refresh,
        )
        .await
}

/// Compare one content type between two instances
async fn compare_instances(
    State(state): State<AppState>,
    Json(req): Json<CompareRequest>,
) -> Result<Json<ComparisonResult>> {
    let loaded = load_comparison(
        &state,
        req.source_instance_id,
        req.destination_instance_id,
        req.content_type,
        SnapshotSource::from_force_refresh(req.force_refresh),
    )
    .await?;

    Ok(Json(loaded.comparison))
}

/// Field-level diff of one key present on both sides
async fn diff_item(
    State(state): State<AppState>,
    Json(req): Json<DiffRequest>,
) -> Result<Json<DiffResponse>> {
    let loaded = load_comparison(
        &state,
        req.source_instance_id,
        req.destination_instance_id,
        req.content_type,
        SnapshotSource::from_force_refresh(req.force_refresh),
    )
    .await?;

    let item = loaded
        .comparison
        .item(&req.key)
        .ok_or_else(|| AppError::NotFound(format!("Item not found: {}", req.key)))?;

    let (Some(source), Some(destination)) = (&item.source, &item.destination) else {
        return Err(AppError::BadRequest(format!(
            "'{}' does not exist on both sides",
            req.key
        )));
    };

    let result = diff(req.content_type, source, destination);

    Ok(Json(DiffResponse {
        key: item.key.clone(),
        title: item.title.clone(),
        status: item.status,
        fields: result.fields,
        has_differences: result.has_differences,
    }))
}

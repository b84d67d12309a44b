//! Content store
//!
//! Latest fetched records per instance and content type, kept as pretty
//! printed JSON under `<data_dir>/instances/<id>/<type>.json`. Each refresh
//! replaces the file wholesale and records the snapshot in `data_snapshots`.

use std::path::{Path, PathBuf};

use serde_json::json;
use sqlx::SqlitePool;

use super::{ContentRecord, ContentType};
use crate::db::{DataSnapshot, Instance, SnapshotRepository};
use crate::error::Result;
use crate::platform::PlatformApi;

/// File-backed cache of fetched content
#[derive(Clone)]
pub struct ContentStore {
    data_dir: PathBuf,
    pool: SqlitePool,
}

impl ContentStore {
    pub fn new(data_dir: impl Into<PathBuf>, pool: SqlitePool) -> Self {
        Self {
            data_dir: data_dir.into(),
            pool,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn snapshot_path(&self, instance_id: i64, content_type: ContentType) -> PathBuf {
        self.data_dir
            .join("instances")
            .join(instance_id.to_string())
            .join(format!("{}.json", content_type))
    }

    /// Load the cached records, `None` when the instance was never refreshed
    pub async fn load(
        &self,
        instance_id: i64,
        content_type: ContentType,
    ) -> Result<Option<Vec<ContentRecord>>> {
        let path = self.snapshot_path(instance_id, content_type);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let records: Vec<ContentRecord> = serde_json::from_slice(&bytes)?;
        Ok(Some(records))
    }

    /// Fetch fresh records from the platform and replace the cached snapshot
    pub async fn refresh(
        &self,
        instance: &Instance,
        content_type: ContentType,
        api: &dyn PlatformApi,
    ) -> Result<Vec<ContentRecord>> {
        let records = api.fetch_all(content_type).await?;
        let store_views = api.check_connection().await?;

        let path = self.snapshot_path(instance.id, content_type);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write next to the target and rename so readers never see a partial file
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, serde_json::to_vec_pretty(&records)?).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        SnapshotRepository::new(&self.pool)
            .record(
                instance.id,
                content_type,
                &path.to_string_lossy(),
                records.len(),
                &json!({ "store_views": store_views }),
            )
            .await?;

        tracing::info!(
            instance_id = instance.id,
            instance = %instance.name,
            content_type = %content_type,
            count = records.len(),
            "Refreshed content snapshot"
        );

        Ok(records)
    }

    /// Cached records, fetching them first when missing or when forced
    pub async fn get_or_refresh(
        &self,
        instance: &Instance,
        content_type: ContentType,
        api: &dyn PlatformApi,
        force_refresh: bool,
    ) -> Result<Vec<ContentRecord>> {
        if !force_refresh {
            if let Some(records) = self.load(instance.id, content_type).await? {
                return Ok(records);
            }
        }

        self.refresh(instance, content_type, api).await
    }

    /// Snapshot bookkeeping for every content type of an instance
    pub async fn snapshot_info(&self, instance_id: i64) -> Result<Vec<DataSnapshot>> {
        let repo = SnapshotRepository::new(&self.pool);
        let mut snapshots = Vec::new();

        for content_type in [ContentType::Blocks, ContentType::Pages] {
            if let Some(snapshot) = repo.get(instance_id, content_type).await? {
                snapshots.push(snapshot);
            }
        }

        Ok(snapshots)
    }
}

//! Snapshot bookkeeping database operations

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::content::ContentType;
use crate::error::Result;

/// Snapshot record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSnapshot {
    pub instance_id: i64,
    pub data_type: String,
    pub file_path: String,
    pub item_count: i64,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

/// Internal row type for database queries
#[derive(sqlx::FromRow)]
struct SnapshotRow {
    instance_id: i64,
    data_type: String,
    file_path: String,
    item_count: i64,
    metadata: String,
    created_at: String,
}

impl SnapshotRow {
    fn into_snapshot(self) -> Result<DataSnapshot> {
        Ok(DataSnapshot {
            instance_id: self.instance_id,
            data_type: self.data_type,
            file_path: self.file_path,
            item_count: self.item_count,
            metadata: serde_json::from_str(&self.metadata)?,
            created_at: self.created_at,
        })
    }
}

/// Snapshot repository
pub struct SnapshotRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SnapshotRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Record a fresh snapshot, replacing the previous one for the same type
    pub async fn record(
        &self,
        instance_id: i64,
        content_type: ContentType,
        file_path: &str,
        item_count: usize,
        metadata: &serde_json::Value,
    ) -> Result<DataSnapshot> {
        let now = Utc::now().to_rfc3339();
        let encoded = serde_json::to_string(metadata)?;

        sqlx::query(
            r#"
            INSERT INTO data_snapshots (instance_id, data_type, file_path, item_count, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(instance_id, data_type) DO UPDATE SET
                file_path = excluded.file_path,
                item_count = excluded.item_count,
                metadata = excluded.metadata,
                created_at = excluded.created_at
            "#,
        )
        .bind(instance_id)
        .bind(content_type.as_str())
        .bind(file_path)
        .bind(item_count as i64)
        .bind(&encoded)
        .bind(&now)
        .execute(self.pool)
        .await?;

        Ok(DataSnapshot {
            instance_id,
            data_type: content_type.as_str().to_string(),
            file_path: file_path.to_string(),
            item_count: item_count as i64,
            metadata: metadata.clone(),
            created_at: now,
        })
    }

    /// Get the snapshot for one content type
    pub async fn get(
        &self,
        instance_id: i64,
        content_type: ContentType,
    ) -> Result<Option<DataSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT instance_id, data_type, file_path, item_count, metadata, created_at
            FROM data_snapshots
            WHERE instance_id = ? AND data_type = ?
            "#,
        )
        .bind(instance_id)
        .bind(content_type.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(SnapshotRow::into_snapshot).transpose()
    }
}

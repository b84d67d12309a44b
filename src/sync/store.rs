//! Sync history persistence
//!
//! SQLite storage for sync runs. Terminal runs are never rewritten: every
//! update is guarded on the stored status still being active.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::types::{HistoryQuery, RunStatus, SyncItem, SyncResult};
use crate::content::ContentType;
use crate::error::{AppError, Result};

/// Message recorded on runs cut short by a server stop
pub const INTERRUPTED_MESSAGE: &str = "Sync interrupted by server restart";

/// Repository for sync runs
pub struct SyncHistoryRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SyncHistoryRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a pending run for a plan
    pub async fn create_run(
        &self,
        source_instance_id: i64,
        destination_instance_id: i64,
        content_type: ContentType,
        plan: &[SyncItem],
    ) -> Result<SyncResult> {
        let started_at = Utc::now();
        let plan_json = serde_json::to_string(plan)?;

        let result = sqlx::query(
            r#"
            INSERT INTO sync_history (
                source_instance_id, destination_instance_id, sync_type, status,
                items_total, plan_json, started_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(source_instance_id)
        .bind(destination_instance_id)
        .bind(content_type.as_str())
        .bind(RunStatus::Pending.as_str())
        .bind(plan.len() as i64)
        .bind(&plan_json)
        .bind(started_at.to_rfc3339())
        .execute(self.pool)
        .await?;

        Ok(SyncResult {
            id: result.last_insert_rowid(),
            source_instance_id,
            destination_instance_id,
            content_type,
            status: RunStatus::Pending,
            items_total: plan.len(),
            items_synced: 0,
            items_failed: 0,
            plan: plan.to_vec(),
            details: Vec::new(),
            error_message: None,
            started_at,
            completed_at: None,
        })
    }

    /// Persist the mutable part of a run
    ///
    /// Returns `false` when the stored run is already terminal.
    pub async fn update_run(&self, run: &SyncResult) -> Result<bool> {
        let details_json = serde_json::to_string(&run.details)?;

        let result = sqlx::query(
            r#"
            UPDATE sync_history SET
                status = ?,
                items_synced = ?,
                items_failed = ?,
                details_json = ?,
                error_message = ?,
                completed_at = ?
            WHERE id = ? AND status IN ('pending', 'in_progress')
            "#,
        )
        .bind(run.status.as_str())
        .bind(run.items_synced as i64)
        .bind(run.items_failed as i64)
        .bind(&details_json)
        .bind(&run.error_message)
        .bind(run.completed_at.map(|t| t.to_rfc3339()))
        .bind(run.id)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get a run by id
    pub async fn get_run(&self, id: i64) -> Result<Option<SyncResult>> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, source_instance_id, destination_instance_id, sync_type, status,
                   items_total, items_synced, items_failed, plan_json, details_json,
                   error_message, started_at, completed_at
            FROM sync_history
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(RunRow::into_result).transpose()
    }

    /// List runs, newest first
    pub async fn list_runs(&self, query: &HistoryQuery) -> Result<Vec<SyncResult>> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT id, source_instance_id, destination_instance_id, sync_type, status,
                   items_total, items_synced, items_failed, plan_json, details_json,
                   error_message, started_at, completed_at
            FROM sync_history
            WHERE ?1 IS NULL OR source_instance_id = ?1 OR destination_instance_id = ?1
            ORDER BY started_at DESC, id DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(query.instance_id)
        .bind(query.limit.clamp(1, 500))
        .bind(query.offset.max(0))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(RunRow::into_result).collect()
    }

    /// Fail every run left active by a previous process
    pub async fn mark_interrupted(&self) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_history SET
                status = 'failed',
                error_message = ?,
                completed_at = ?
            WHERE status IN ('pending', 'in_progress')
            "#,
        )
        .bind(INTERRUPTED_MESSAGE)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Internal row type for database queries
#[derive(sqlx::FromRow)]
struct RunRow {
    id: i64,
    source_instance_id: i64,
    destination_instance_id: i64,
    sync_type: String,
    status: String,
    items_total: i64,
    items_synced: i64,
    items_failed: i64,
    plan_json: String,
    details_json: String,
    error_message: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

impl RunRow {
    fn into_result(self) -> Result<SyncResult> {
        let content_type = self.sync_type.parse().map_err(AppError::Internal)?;
        let status = self.status.parse().map_err(AppError::Internal)?;

        Ok(SyncResult {
            id: self.id,
            source_instance_id: self.source_instance_id,
            destination_instance_id: self.destination_instance_id,
            content_type,
            status,
            items_total: self.items_total as usize,
            items_synced: self.items_synced as usize,
            items_failed: self.items_failed as usize,
            plan: serde_json::from_str(&self.plan_json)?,
            details: serde_json::from_str(&self.details_json)?,
            error_message: self.error_message,
            started_at: parse_timestamp(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Internal(format!("Invalid timestamp '{}': {}", value, e)))
}

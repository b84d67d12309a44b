//! Database schema initialization

use sqlx::SqlitePool;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Registered platform instances
CREATE TABLE IF NOT EXISTS instances (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    url TEXT NOT NULL,
    api_token TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Latest content snapshot per instance and content type
CREATE TABLE IF NOT EXISTS data_snapshots (
    instance_id INTEGER NOT NULL,
    data_type TEXT NOT NULL,
    file_path TEXT NOT NULL,
    item_count INTEGER NOT NULL,
    -- JSON object (store views at refresh time)
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,

    PRIMARY KEY (instance_id, data_type)
);

-- Sync runs (audit trail)
CREATE TABLE IF NOT EXISTS sync_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_instance_id INTEGER NOT NULL,
    destination_instance_id INTEGER NOT NULL,
    sync_type TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    items_total INTEGER NOT NULL DEFAULT 0,
    items_synced INTEGER NOT NULL DEFAULT 0,
    items_failed INTEGER NOT NULL DEFAULT 0,
    -- JSON array of planned items
    plan_json TEXT NOT NULL DEFAULT '[]',
    -- JSON array of per-item results
    details_json TEXT NOT NULL DEFAULT '[]',
    error_message TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_sync_history_status ON sync_history(status);
CREATE INDEX IF NOT EXISTS idx_sync_history_source ON sync_history(source_instance_id);
CREATE INDEX IF NOT EXISTS idx_sync_history_destination ON sync_history(destination_instance_id);
CREATE INDEX IF NOT EXISTS idx_sync_history_started ON sync_history(started_at);
"#;

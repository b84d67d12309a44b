//! Instance registry database operations

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::error::Result;

/// A registered platform instance
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Instance {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(skip_serializing)]
    pub api_token: String,
    pub created_at: String,
}

/// Instance registration entry
#[derive(Debug, Clone, Deserialize)]
pub struct NewInstance {
    pub name: String,
    pub url: String,
    pub api_token: String,
}

/// Instance repository
pub struct InstanceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> InstanceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get an instance by id
    pub async fn get(&self, id: i64) -> Result<Option<Instance>> {
        let instance = sqlx::query_as::<_, Instance>(
            "SELECT id, name, url, api_token, created_at FROM instances WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(instance)
    }

    pub async fn get_by_name(&self, name: &str) -> Result<Option<Instance>> {
        let instance = sqlx::query_as::<_, Instance>(
            "SELECT id, name, url, api_token, created_at FROM instances WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        Ok(instance)
    }

    /// List all instances
    pub async fn list(&self) -> Result<Vec<Instance>> {
        let instances = sqlx::query_as::<_, Instance>(
            "SELECT id, name, url, api_token, created_at FROM instances ORDER BY id ASC",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(instances)
    }

    /// Register an instance, updating url and token when the name exists
    pub async fn upsert(&self, data: &NewInstance) -> Result<Instance> {
        let url = data.url.trim_end_matches('/');

        sqlx::query(
            r#"
            INSERT INTO instances (name, url, api_token)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                url = excluded.url,
                api_token = excluded.api_token
            "#,
        )
        .bind(&data.name)
        .bind(url)
        .bind(&data.api_token)
        .execute(self.pool)
        .await?;

        self.get_by_name(&data.name).await?.ok_or_else(|| {
            crate::error::AppError::Internal(format!("Failed to fetch instance {}", data.name))
        })
    }
}

/// Register the instances listed in a JSON file (an array of `NewInstance`)
pub async fn seed_instances(pool: &SqlitePool, path: &Path) -> anyhow::Result<usize> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read instances file {}", path.display()))?;
    let entries: Vec<NewInstance> = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid instances file {}", path.display()))?;

    let repo = InstanceRepository::new(pool);
    for entry in &entries {
        repo.upsert(entry)
            .await
            .with_context(|| format!("Failed to register instance {}", entry.name))?;
        tracing::info!(instance = %entry.name, url = %entry.url, "Registered instance");
    }

    Ok(entries.len())
}

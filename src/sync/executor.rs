//! Sync execution
//!
//! Applies a planned run against the destination one item at a time and
//! keeps the history record current after every step.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;

use super::store::SyncHistoryRepository;
use super::types::{ItemOutcome, ItemResult, RunStatus, SyncAction, SyncItem, SyncResult};
use crate::content::{ContentStore, ContentType};
use crate::db::Instance;
use crate::error::SyncError;
use crate::platform::PlatformApi;

/// Attempts for the write that records a terminal status
const TERMINAL_WRITE_ATTEMPTS: u32 = 5;
const TERMINAL_WRITE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Runs one sync plan to a terminal status
pub struct SyncExecutor {
    db: SqlitePool,
    content_store: ContentStore,
}

impl SyncExecutor {
    pub fn new(db: SqlitePool, content_store: ContentStore) -> Self {
        Self { db, content_store }
    }

    /// Execute a pending run
    ///
    /// Per-item platform failures are recorded and the run continues. Only a
    /// failed pre-flight check or a cancellation ends the run as `failed`.
    pub async fn execute(
        &self,
        mut run: SyncResult,
        destination: &Instance,
        api: Arc<dyn PlatformApi>,
        cancel: &CancellationToken,
    ) -> SyncResult {
        let content_type = run.content_type;

        if let Err(e) = api.check_connection().await {
            let error = SyncError::PlatformUnreachable(e.to_string());
            tracing::warn!(run_id = run.id, destination = %destination.name, "Sync aborted: {}", error);
            run.finish(RunStatus::Failed, Some(error.to_string()));
            self.persist(&run).await;
            return run;
        }

        let plan = run.plan.clone();
        for (index, item) in plan.iter().enumerate() {
            if cancel.is_cancelled() {
                let reason = format!(
                    "Sync cancelled after {} of {} items",
                    index,
                    plan.len()
                );
                tracing::info!(run_id = run.id, "{}", reason);
                run.finish(RunStatus::Failed, Some(reason));
                self.persist(&run).await;
                return run;
            }

            if run.status == RunStatus::Pending {
                run.status = RunStatus::InProgress;
                self.persist(&run).await;
            }

            let detail = apply_item(api.as_ref(), content_type, item).await;
            match detail.status {
                ItemOutcome::Success => {
                    tracing::debug!(run_id = run.id, key = %item.key, action = ?item.action, "Item synced")
                }
                ItemOutcome::Failed => tracing::warn!(
                    run_id = run.id,
                    key = %item.key,
                    "Item failed: {}",
                    detail.message.as_deref().unwrap_or_default()
                ),
            }
            run.push_detail(detail);
            self.persist(&run).await;
        }

        let mut error_message = None;
        if run.items_synced > 0 {
            if let Err(e) = self
                .content_store
                .refresh(destination, content_type, api.as_ref())
                .await
            {
                tracing::warn!(run_id = run.id, "Destination refresh after sync failed: {}", e);
                error_message = Some(format!("Synced, but refreshing destination content failed: {}", e));
            }
        }

        run.finish(RunStatus::Completed, error_message);
        self.persist(&run).await;

        tracing::info!(
            run_id = run.id,
            synced = run.items_synced,
            failed = run.items_failed,
            "Sync completed"
        );

        run
    }

    /// Fail a run that never reached the destination
    pub async fn abort(&self, mut run: SyncResult, reason: String) -> SyncResult {
        tracing::warn!(run_id = run.id, "Sync aborted: {}", reason);
        run.finish(RunStatus::Failed, Some(reason));
        self.persist(&run).await;
        run
    }

    async fn persist(&self, run: &SyncResult) {
        let repo = SyncHistoryRepository::new(&self.db);
        // Progress writes are superseded by the next one; the terminal write is not
        let attempts = if run.status.is_terminal() {
            TERMINAL_WRITE_ATTEMPTS
        } else {
            1
        };

        for attempt in 1..=attempts {
            match repo.update_run(run).await {
                Ok(true) => return,
                Ok(false) => {
                    tracing::warn!(run_id = run.id, "Run already terminal, update skipped");
                    return;
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        run_id = run.id,
                        attempt,
                        "Failed to record sync outcome, retrying: {}",
                        e
                    );
                    tokio::time::sleep(TERMINAL_WRITE_RETRY_DELAY * 2u32.pow(attempt - 1)).await;
                }
                Err(e) => tracing::error!(run_id = run.id, "Failed to persist sync run: {}", e),
            }
        }
    }
}

async fn apply_item(
    api: &dyn PlatformApi,
    content_type: ContentType,
    item: &SyncItem,
) -> ItemResult {
    let written = match item.action {
        SyncAction::Create => api.create(content_type, &item.payload).await,
        SyncAction::Update => api.update(content_type, &item.key, &item.payload).await,
    };

    match written {
        Ok(record) => ItemResult {
            key: item.key.clone(),
            action: item.action,
            status: ItemOutcome::Success,
            message: None,
            entity_id: record.entity_id(content_type),
        },
        Err(e) => ItemResult {
            key: item.key.clone(),
            action: item.action,
            status: ItemOutcome::Failed,
            message: Some(SyncError::PlatformWrite(e.to_string()).to_string()),
            entity_id: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::platform::mock::MockPlatform;
    use serde_json::{json, Map, Value};

    fn destination() -> Instance {
        Instance {
            id: 2,
            name: "staging".into(),
            url: "https://staging.example".into(),
            api_token: "token".into(),
            created_at: String::new(),
        }
    }

    fn create(key: &str) -> SyncItem {
        let mut payload = Map::new();
        payload.insert("identifier".into(), Value::from(key));
        payload.insert("title".into(), Value::from(key.to_uppercase()));
        SyncItem {
            key: key.into(),
            title: key.to_uppercase(),
            action: SyncAction::Create,
            fields: None,
            payload,
        }
    }

    struct Harness {
        executor: SyncExecutor,
        pool: SqlitePool,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let pool = test_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path(), pool.clone());
        Harness {
            executor: SyncExecutor::new(pool.clone(), store),
            pool,
            _dir: dir,
        }
    }

    async fn pending(pool: &SqlitePool, plan: &[SyncItem]) -> SyncResult {
        SyncHistoryRepository::new(pool)
            .create_run(1, 2, ContentType::Blocks, plan)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_items_succeed() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::new());
        let run = pending(&h.pool, &[create("footer"), create("header")]).await;

        let run = h
            .executor
            .execute(run, &destination(), platform.clone(), &CancellationToken::new())
            .await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.items_synced, 2);
        assert_eq!(run.items_failed, 0);
        assert!(run.completed_at.is_some());
        assert_eq!(platform.writes(), vec!["create:footer", "create:header"]);

        let stored = SyncHistoryRepository::new(&h.pool)
            .get_run(run.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, run);
    }

    #[tokio::test]
    async fn test_rejected_item_still_completes() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::new());
        platform.reject("footer", "The block identifier is invalid");
        let run = pending(&h.pool, &[create("footer")]).await;

        let run = h
            .executor
            .execute(run, &destination(), platform, &CancellationToken::new())
            .await;

        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.items_synced, 0);
        assert_eq!(run.items_failed, 1);
        assert_eq!(run.details[0].status, ItemOutcome::Failed);
        assert!(run.details[0]
            .message
            .as_deref()
            .unwrap()
            .contains("The block identifier is invalid"));
        assert!(run.error_message.is_none());
    }

    #[tokio::test]
    async fn test_partial_failure_counts_every_item() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::new());
        platform.reject("b", "no");
        let plan = [create("a"), create("b"), create("c")];
        let run = pending(&h.pool, &plan).await;

        let run = h
            .executor
            .execute(run, &destination(), platform, &CancellationToken::new())
            .await;

        assert_eq!(run.items_synced + run.items_failed, plan.len());
        let keys: Vec<_> = run.details.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_unreachable_destination_fails_without_items() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::new());
        platform.set_unreachable(true);
        let run = pending(&h.pool, &[create("footer")]).await;

        let run = h
            .executor
            .execute(run, &destination(), platform.clone(), &CancellationToken::new())
            .await;

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.items_synced, 0);
        assert_eq!(run.items_failed, 0);
        assert!(run.details.is_empty());
        assert!(run.error_message.unwrap().contains("unreachable"));
        assert!(platform.writes().is_empty());
    }

    #[tokio::test]
    async fn test_success_refreshes_destination_snapshot() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::new());
        let run = pending(&h.pool, &[create("footer")]).await;

        h.executor
            .execute(run, &destination(), platform, &CancellationToken::new())
            .await;

        let store = &h.executor.content_store;
        let records = store.load(2, ContentType::Blocks).await.unwrap().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].natural_key(ContentType::Blocks), Some("footer"));
    }

    #[tokio::test]
    async fn test_no_success_skips_refresh() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::new());
        platform.reject("footer", "no");
        let run = pending(&h.pool, &[create("footer")]).await;

        h.executor
            .execute(run, &destination(), platform, &CancellationToken::new())
            .await;

        let store = &h.executor.content_store;
        assert!(store.load(2, ContentType::Blocks).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_first_item() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::new());
        let run = pending(&h.pool, &[create("a"), create("b")]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let run = h
            .executor
            .execute(run, &destination(), platform.clone(), &cancel)
            .await;

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error_message.unwrap().contains("cancelled after 0 of 2"));
        assert!(platform.writes().is_empty());
    }

    #[tokio::test]
    async fn test_update_uses_natural_key() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::with_records(
            ContentType::Blocks,
            vec![json!({"id": 3, "identifier": "footer", "content": "old"})],
        ));

        let mut payload = Map::new();
        payload.insert("identifier".into(), json!("footer"));
        payload.insert("content".into(), json!("new"));
        let item = SyncItem {
            key: "footer".into(),
            title: "Footer".into(),
            action: SyncAction::Update,
            fields: Some(vec!["content".into()]),
            payload,
        };
        let run = pending(&h.pool, &[item]).await;

        let run = h
            .executor
            .execute(run, &destination(), platform.clone(), &CancellationToken::new())
            .await;

        assert_eq!(run.details[0].status, ItemOutcome::Success);
        assert_eq!(run.details[0].entity_id, Some(3));
        assert_eq!(
            platform.records(ContentType::Blocks)[0].get("content"),
            Some(&json!("new"))
        );
    }

    #[tokio::test]
    async fn test_terminal_write_is_retried() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::new());
        platform.reject("footer", "Invalid block content");
        let run = pending(&h.pool, &[create("footer")]).await;
        let run_id = run.id;

        // Terminal updates fail until the hold row is removed
        for statement in [
            "CREATE TABLE hold_terminal (id INTEGER)",
            "INSERT INTO hold_terminal VALUES (1)",
            "CREATE TRIGGER hold_terminal_writes BEFORE UPDATE ON sync_history \
             WHEN NEW.status IN ('completed', 'failed') AND EXISTS (SELECT 1 FROM hold_terminal) \
             BEGIN SELECT RAISE(ABORT, 'database is locked'); END",
        ] {
            sqlx::query(statement).execute(&h.pool).await.unwrap();
        }

        let dir = tempfile::tempdir().unwrap();
        let executor = SyncExecutor::new(h.pool.clone(), ContentStore::new(dir.path(), h.pool.clone()));
        let handle = tokio::spawn(async move {
            executor
                .execute(run, &destination(), platform, &CancellationToken::new())
                .await
        });

        let repo = SyncHistoryRepository::new(&h.pool);
        for _ in 0..200 {
            let stored = repo.get_run(run_id).await.unwrap().unwrap();
            if stored.details.len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stored = repo.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::InProgress);

        sqlx::query("DELETE FROM hold_terminal")
            .execute(&h.pool)
            .await
            .unwrap();
        let finished = handle.await.unwrap();

        let stored = repo.get_run(run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Completed);
        assert_eq!(stored, finished);
    }
}

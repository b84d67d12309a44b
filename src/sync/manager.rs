//! Background sync runs
//!
//! Each run executes on its own task. Runs against the same destination wait
//! for each other; runs against different destinations proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::executor::SyncExecutor;
use super::store::SyncHistoryRepository;
use super::types::{SyncItem, SyncResult};
use crate::content::{ContentStore, ContentType};
use crate::db::Instance;
use crate::error::{Result, SyncError};
use crate::platform::PlatformConnector;

/// Result of a cancellation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The run will stop before its next item
    Cancelled,
    /// The run exists but is no longer active
    NotActive,
    NotFound,
}

/// Starts, tracks and cancels sync runs
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    db: SqlitePool,
    executor: SyncExecutor,
    connector: Arc<dyn PlatformConnector>,
    active: Mutex<HashMap<i64, CancellationToken>>,
    destination_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl SyncManager {
    pub fn new(
        db: SqlitePool,
        content_store: ContentStore,
        connector: Arc<dyn PlatformConnector>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                executor: SyncExecutor::new(db.clone(), content_store),
                db,
                connector,
                active: Mutex::new(HashMap::new()),
                destination_locks: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Record a pending run and execute it in the background
    ///
    /// Returns the pending run at once; poll [`SyncManager::get_status`].
    pub async fn start(
        &self,
        source: &Instance,
        destination: Instance,
        content_type: ContentType,
        plan: Vec<SyncItem>,
    ) -> Result<SyncResult> {
        let run = SyncHistoryRepository::new(&self.inner.db)
            .create_run(source.id, destination.id, content_type, &plan)
            .await?;

        let cancel = self.inner.shutdown.child_token();
        self.inner.active.lock().insert(run.id, cancel.clone());

        tracing::info!(
            run_id = run.id,
            source = %source.name,
            destination = %destination.name,
            content_type = %content_type,
            items = plan.len(),
            "Sync run queued"
        );

        let manager = self.clone();
        let pending = run.clone();
        self.inner.tasks.spawn(async move {
            let run_id = pending.id;
            manager.run(pending, destination, cancel).await;
            manager.inner.active.lock().remove(&run_id);
        });

        Ok(run)
    }

    async fn run(&self, run: SyncResult, destination: Instance, cancel: CancellationToken) {
        let lock = self.destination_lock(destination.id);

        // Stay pending while another run holds the destination
        let _guard = tokio::select! {
            guard = lock.lock_owned() => guard,
            _ = cancel.cancelled() => {
                self.inner
                    .executor
                    .abort(run, "Sync cancelled before it started".into())
                    .await;
                return;
            }
        };

        let api = match self.inner.connector.connect(&destination) {
            Ok(api) => api,
            Err(e) => {
                let reason = SyncError::PlatformUnreachable(e.to_string()).to_string();
                self.inner.executor.abort(run, reason).await;
                return;
            }
        };

        self.inner
            .executor
            .execute(run, &destination, api, &cancel)
            .await;
    }

    fn destination_lock(&self, destination_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .destination_locks
            .lock()
            .entry(destination_id)
            .or_default()
            .clone()
    }

    /// Current state of a run
    pub async fn get_status(&self, run_id: i64) -> Result<Option<SyncResult>> {
        SyncHistoryRepository::new(&self.inner.db)
            .get_run(run_id)
            .await
    }

    /// Ask a run to stop before its next item
    pub async fn cancel(&self, run_id: i64) -> Result<CancelOutcome> {
        let token = self.inner.active.lock().get(&run_id).cloned();

        let Some(run) = self.get_status(run_id).await? else {
            return Ok(CancelOutcome::NotFound);
        };

        // A finished run may still be registered for a moment after its last write
        match token {
            Some(token) if !run.status.is_terminal() => {
                token.cancel();
                tracing::info!(run_id, "Sync cancellation requested");
                Ok(CancelOutcome::Cancelled)
            }
            _ => Ok(CancelOutcome::NotActive),
        }
    }

    /// Whether a run is still queued or executing
    pub fn is_active(&self, run_id: i64) -> bool {
        self.inner.active.lock().contains_key(&run_id)
    }

    /// Stop every active run before its next item and wait for them to finish
    ///
    /// Writes already sent to a destination complete, and each run records
    /// its terminal status before this returns.
    pub async fn shutdown(&self) {
        let active = self.inner.active.lock().len();
        if active > 0 {
            tracing::info!("Cancelling {} active sync runs", active);
        }
        self.inner.shutdown.cancel();
        self.inner.tasks.close();
        self.inner.tasks.wait().await;
        tracing::info!("Sync runs stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::platform::mock::{MockConnector, MockPlatform};
    use crate::sync::types::{RunStatus, SyncAction};
    use serde_json::{Map, Value};
    use std::time::Duration;

    fn instance(id: i64) -> Instance {
        Instance {
            id,
            name: format!("instance-{}", id),
            url: format!("https://{}.example", id),
            api_token: "token".into(),
            created_at: String::new(),
        }
    }

    fn create(key: &str) -> SyncItem {
        let mut payload = Map::new();
        payload.insert("identifier".into(), Value::from(key));
        payload.insert("title".into(), Value::from(key));
        SyncItem {
            key: key.into(),
            title: key.into(),
            action: SyncAction::Create,
            fields: None,
            payload,
        }
    }

    struct Harness {
        manager: SyncManager,
        connector: Arc<MockConnector>,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let pool = test_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let connector = Arc::new(MockConnector::new());
        let manager = SyncManager::new(
            pool.clone(),
            ContentStore::new(dir.path(), pool),
            connector.clone(),
        );
        Harness {
            manager,
            connector,
            _dir: dir,
        }
    }

    async fn wait_terminal(manager: &SyncManager, run_id: i64) -> SyncResult {
        for _ in 0..200 {
            let run = manager.get_status(run_id).await.unwrap().unwrap();
            if run.status.is_terminal() && !manager.is_active(run_id) {
                return run;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {} did not finish", run_id);
    }

    async fn wait_writes(platform: &MockPlatform, count: usize) {
        for _ in 0..200 {
            if platform.writes().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} writes, saw {:?}", count, platform.writes());
    }

    #[tokio::test]
    async fn test_start_returns_pending_then_completes() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::new());
        h.connector.register(2, platform.clone());

        let run = h
            .manager
            .start(&instance(1), instance(2), ContentType::Blocks, vec![create("footer")])
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Pending);

        let done = wait_terminal(&h.manager, run.id).await;
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.items_synced, 1);
    }

    #[tokio::test]
    async fn test_unknown_destination_fails_run() {
        let h = harness().await;

        let run = h
            .manager
            .start(&instance(1), instance(9), ContentType::Blocks, vec![create("footer")])
            .await
            .unwrap();

        let done = wait_terminal(&h.manager, run.id).await;
        assert_eq!(done.status, RunStatus::Failed);
        assert_eq!(done.items_synced + done.items_failed, 0);
        assert!(done.error_message.is_some());
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_item() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::new());
        let gate = platform.gate_writes();
        h.connector.register(2, platform.clone());

        let run = h
            .manager
            .start(
                &instance(1),
                instance(2),
                ContentType::Blocks,
                vec![create("a"), create("b"), create("c")],
            )
            .await
            .unwrap();

        // First write is blocked on the gate; cancel, then let it through
        wait_writes_started(&h.manager, run.id).await;
        assert_eq!(h.manager.cancel(run.id).await.unwrap(), CancelOutcome::Cancelled);
        gate.add_permits(3);

        let done = wait_terminal(&h.manager, run.id).await;
        assert_eq!(done.status, RunStatus::Failed);
        assert_eq!(done.details.len(), 1);
        assert_eq!(done.items_synced, 1);
        assert!(done.error_message.unwrap().contains("cancelled after 1 of 3"));
        assert_eq!(platform.writes(), vec!["create:a"]);

        assert_eq!(h.manager.cancel(run.id).await.unwrap(), CancelOutcome::NotActive);
        assert_eq!(h.manager.cancel(run.id + 100).await.unwrap(), CancelOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_same_destination_runs_are_serialized() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::new());
        let gate = platform.gate_writes();
        h.connector.register(2, platform.clone());

        let first = h
            .manager
            .start(&instance(1), instance(2), ContentType::Blocks, vec![create("a")])
            .await
            .unwrap();
        wait_writes_started(&h.manager, first.id).await;

        let second = h
            .manager
            .start(&instance(3), instance(2), ContentType::Blocks, vec![create("b")])
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let waiting = h.manager.get_status(second.id).await.unwrap().unwrap();
        assert_eq!(waiting.status, RunStatus::Pending);

        gate.add_permits(2);
        wait_terminal(&h.manager, first.id).await;
        wait_terminal(&h.manager, second.id).await;
        wait_writes(&platform, 2).await;

        assert_eq!(platform.writes(), vec!["create:a", "create:b"]);
    }

    #[tokio::test]
    async fn test_different_destinations_run_concurrently() {
        let h = harness().await;
        let blocked = Arc::new(MockPlatform::new());
        let _gate = blocked.gate_writes();
        let free = Arc::new(MockPlatform::new());
        h.connector.register(2, blocked);
        h.connector.register(3, free.clone());

        h.manager
            .start(&instance(1), instance(2), ContentType::Blocks, vec![create("a")])
            .await
            .unwrap();
        let other = h
            .manager
            .start(&instance(1), instance(3), ContentType::Blocks, vec![create("b")])
            .await
            .unwrap();

        let done = wait_terminal(&h.manager, other.id).await;
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(free.writes(), vec!["create:b"]);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_destination() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::new());
        let gate = platform.gate_writes();
        h.connector.register(2, platform.clone());

        let first = h
            .manager
            .start(&instance(1), instance(2), ContentType::Blocks, vec![create("a")])
            .await
            .unwrap();
        wait_writes_started(&h.manager, first.id).await;
        let queued = h
            .manager
            .start(&instance(1), instance(2), ContentType::Blocks, vec![create("b")])
            .await
            .unwrap();

        h.manager.cancel(queued.id).await.unwrap();
        let done = wait_terminal(&h.manager, queued.id).await;
        assert_eq!(done.status, RunStatus::Failed);
        assert!(done.details.is_empty());

        gate.add_permits(1);
        wait_terminal(&h.manager, first.id).await;
        assert_eq!(platform.writes(), vec!["create:a"]);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_runs_to_record_cancellation() {
        let h = harness().await;
        let platform = Arc::new(MockPlatform::new());
        let gate = platform.gate_writes();
        h.connector.register(2, platform.clone());

        let run = h
            .manager
            .start(
                &instance(1),
                instance(2),
                ContentType::Blocks,
                vec![create("a"), create("b")],
            )
            .await
            .unwrap();
        wait_writes_started(&h.manager, run.id).await;

        let manager = h.manager.clone();
        let shutdown = tokio::spawn(async move { manager.shutdown().await });

        // The in-flight write holds shutdown open until it lands
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!shutdown.is_finished());
        gate.add_permits(2);
        shutdown.await.unwrap();

        // No polling: the terminal record is already stored
        let done = h.manager.get_status(run.id).await.unwrap().unwrap();
        assert_eq!(done.status, RunStatus::Failed);
        assert_eq!(done.details.len(), 1);
        assert!(done.error_message.unwrap().contains("cancelled after 1 of 2"));
        assert_eq!(platform.writes(), vec!["create:a"]);
        assert!(!h.manager.is_active(run.id));
    }

    async fn wait_writes_started(manager: &SyncManager, run_id: i64) {
        for _ in 0..200 {
            let run = manager.get_status(run_id).await.unwrap().unwrap();
            if run.status == RunStatus::InProgress {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("run {} never started", run_id);
    }
}

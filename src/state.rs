//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::content::ContentStore;
use crate::platform::PlatformConnector;
use crate::sync::SyncManager;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    content_store: ContentStore,
    connector: Arc<dyn PlatformConnector>,
    sync_manager: SyncManager,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config, db: SqlitePool, connector: Arc<dyn PlatformConnector>) -> Self {
        let content_store = ContentStore::new(config.storage.data_dir.clone(), db.clone());
        let sync_manager = SyncManager::new(db.clone(), content_store.clone(), connector.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                content_store,
                connector,
                sync_manager,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the content snapshot store
    pub fn content_store(&self) -> &ContentStore {
        &self.inner.content_store
    }

    /// Get the platform connector
    pub fn connector(&self) -> &dyn PlatformConnector {
        self.inner.connector.as_ref()
    }

    /// Get the sync run manager
    pub fn sync_manager(&self) -> &SyncManager {
        &self.inner.sync_manager
    }

    /// Stop background sync runs and wait for them to record their outcome
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        self.inner.sync_manager.shutdown().await;
    }
}

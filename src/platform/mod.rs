//! Platform module
//!
//! Access to the admin REST API of a Magento 2 instance.
//!
//! The comparison and sync core only talks to [`PlatformApi`]; the
//! [`PlatformConnector`] turns a registered instance into a client. Tests
//! swap in their own connector to script platform behavior.

mod client;
pub mod mock;
mod types;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::config::PlatformConfig;
use crate::content::{ContentRecord, ContentType};
use crate::db::Instance;

pub use client::MagentoClient;
pub use types::{PlatformError, StoreView};

/// Read/write access to one platform instance
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Verify the instance answers authenticated requests
    async fn check_connection(&self) -> Result<Vec<StoreView>, PlatformError>;

    /// Fetch every record of a content type
    async fn fetch_all(&self, content_type: ContentType) -> Result<Vec<ContentRecord>, PlatformError>;

    /// Create a record
    async fn create(
        &self,
        content_type: ContentType,
        payload: &Map<String, Value>,
    ) -> Result<ContentRecord, PlatformError>;

    /// Update the record identified by its natural key
    async fn update(
        &self,
        content_type: ContentType,
        key: &str,
        fields: &Map<String, Value>,
    ) -> Result<ContentRecord, PlatformError>;
}

/// Builds platform clients for registered instances
pub trait PlatformConnector: Send + Sync {
    fn connect(&self, instance: &Instance) -> Result<Arc<dyn PlatformApi>, PlatformError>;
}

/// Connector producing [`MagentoClient`]s
pub struct MagentoConnector {
    config: PlatformConfig,
}

impl MagentoConnector {
    pub fn new(config: PlatformConfig) -> Self {
        Self { config }
    }
}

impl PlatformConnector for MagentoConnector {
    fn connect(&self, instance: &Instance) -> Result<Arc<dyn PlatformApi>, PlatformError> {
        let client = MagentoClient::new(&instance.url, &instance.api_token, &self.config)?;
        Ok(Arc::new(client))
    }
}

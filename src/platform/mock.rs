//! In-memory platform used by the test suites

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;

use super::{PlatformApi, PlatformConnector, PlatformError, StoreView};
use crate::content::{ContentRecord, ContentType};
use crate::db::Instance;

#[derive(Default)]
struct MockState {
    blocks: Vec<ContentRecord>,
    pages: Vec<ContentRecord>,
    unreachable: bool,
    rejections: HashMap<String, String>,
    writes: Vec<String>,
    next_id: i64,
}

/// Scriptable stand-in for one Magento instance
#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(content_type: ContentType, records: Vec<Value>) -> Self {
        let platform = Self::new();
        platform.set_records(content_type, records);
        platform
    }

    pub fn set_records(&self, content_type: ContentType, records: Vec<Value>) {
        let records = records
            .into_iter()
            .filter_map(ContentRecord::from_json)
            .collect();
        let mut state = self.state.lock();
        match content_type {
            ContentType::Blocks => state.blocks = records,
            ContentType::Pages => state.pages = records,
        }
    }

    pub fn records(&self, content_type: ContentType) -> Vec<ContentRecord> {
        let state = self.state.lock();
        match content_type {
            ContentType::Blocks => state.blocks.clone(),
            ContentType::Pages => state.pages.clone(),
        }
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Reject writes for `key` with a validation error
    pub fn reject(&self, key: &str, message: &str) {
        self.state
            .lock()
            .rejections
            .insert(key.to_string(), message.to_string());
    }

    /// Writes attempted so far, as `create:<key>` / `update:<key>`
    pub fn writes(&self) -> Vec<String> {
        self.state.lock().writes.clone()
    }

    /// Hold every write until a permit is added to the returned semaphore
    pub fn gate_writes(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    async fn wait_for_gate(&self) {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
    }

    fn write(
        &self,
        content_type: ContentType,
        action: &str,
        key: &str,
        fields: &Map<String, Value>,
    ) -> Result<ContentRecord, PlatformError> {
        let mut state = self.state.lock();
        if state.unreachable {
            return Err(PlatformError::Unreachable("connection refused".into()));
        }
        state.writes.push(format!("{}:{}", action, key));
        if let Some(message) = state.rejections.get(key) {
            return Err(PlatformError::Validation(message.clone()));
        }

        state.next_id += 1;
        let next_id = state.next_id;
        let records = match content_type {
            ContentType::Blocks => &mut state.blocks,
            ContentType::Pages => &mut state.pages,
        };

        let position = records
            .iter()
            .position(|r| r.natural_key(content_type) == Some(key));

        let record = match (action, position) {
            ("update", Some(index)) => {
                let mut merged = records[index].fields().clone();
                merged.extend(fields.clone());
                records[index] = ContentRecord::new(merged);
                records[index].clone()
            }
            ("update", None) => {
                return Err(PlatformError::NotFound(format!("No entity with key {}", key)))
            }
            (_, Some(_)) => {
                return Err(PlatformError::Validation(format!(
                    "A {} identifier with the same properties already exists",
                    content_type.entity_name()
                )))
            }
            (_, None) => {
                let mut created = fields.clone();
                created.insert("id".into(), Value::from(next_id));
                let record = ContentRecord::new(created);
                records.push(record.clone());
                record
            }
        };

        Ok(record)
    }
}

#[async_trait]
impl PlatformApi for MockPlatform {
    async fn check_connection(&self) -> Result<Vec<StoreView>, PlatformError> {
        if self.state.lock().unreachable {
            return Err(PlatformError::Unreachable("connection refused".into()));
        }
        Ok(vec![StoreView {
            id: 1,
            code: "default".into(),
            name: "Default Store View".into(),
            website_id: Some(1),
        }])
    }

    async fn fetch_all(&self, content_type: ContentType) -> Result<Vec<ContentRecord>, PlatformError> {
        if self.state.lock().unreachable {
            return Err(PlatformError::Unreachable("connection refused".into()));
        }
        Ok(self.records(content_type))
    }

    async fn create(
        &self,
        content_type: ContentType,
        payload: &Map<String, Value>,
    ) -> Result<ContentRecord, PlatformError> {
        self.wait_for_gate().await;
        let key = payload
            .get(content_type.natural_key())
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.write(content_type, "create", &key, payload)
    }

    async fn update(
        &self,
        content_type: ContentType,
        key: &str,
        fields: &Map<String, Value>,
    ) -> Result<ContentRecord, PlatformError> {
        self.wait_for_gate().await;
        self.write(content_type, "update", key, fields)
    }
}

/// Connector handing out registered mock platforms by instance id
#[derive(Default)]
pub struct MockConnector {
    platforms: Mutex<HashMap<i64, Arc<MockPlatform>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, instance_id: i64, platform: Arc<MockPlatform>) {
        self.platforms.lock().insert(instance_id, platform);
    }
}

impl PlatformConnector for MockConnector {
    fn connect(&self, instance: &Instance) -> Result<Arc<dyn PlatformApi>, PlatformError> {
        let platform = self
            .platforms
            .lock()
            .get(&instance.id)
            .cloned()
            .ok_or_else(|| PlatformError::Unreachable(format!("no route to {}", instance.url)))?;
        Ok(platform)
    }
}

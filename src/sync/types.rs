//! Sync data types
//!
//! Defines the operator's sync request, the planned writes derived from it
//! and the persisted run record tracking their execution.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::content::ContentType;

/// Source store view id to destination store view id
pub type StoreViewMapping = BTreeMap<i64, i64>;

/// Write performed for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
}

/// One key picked by the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedItem {
    pub key: String,
    /// Field allowlist for updates; all differing fields when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

/// Request to preview or execute a sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub source_instance_id: i64,
    pub destination_instance_id: i64,
    #[serde(alias = "data_type")]
    pub content_type: ContentType,
    pub items: Vec<SelectedItem>,
    #[serde(default)]
    pub store_view_mapping: StoreViewMapping,
}

/// A planned write against the destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncItem {
    pub key: String,
    pub title: String,
    pub action: SyncAction,
    /// Fields written by an update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    /// Exact body sent to the platform
    pub payload: Map<String, Value>,
}

/// Side-effect free view of what a sync would do
#[derive(Debug, Clone, Serialize)]
pub struct SyncPreview {
    pub source_instance_id: i64,
    pub destination_instance_id: i64,
    pub content_type: ContentType,
    pub items: Vec<SyncItem>,
    pub creates: usize,
    pub updates: usize,
}

impl SyncPreview {
    pub fn new(request: &SyncRequest, items: Vec<SyncItem>) -> Self {
        let creates = items
            .iter()
            .filter(|i| i.action == SyncAction::Create)
            .count();

        Self {
            source_instance_id: request.source_instance_id,
            destination_instance_id: request.destination_instance_id,
            content_type: request.content_type,
            updates: items.len() - creates,
            creates,
            items,
        }
    }
}

/// Lifecycle of a sync run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "in_progress" => Ok(RunStatus::InProgress),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("Unknown run status: {}", other)),
        }
    }
}

/// Outcome of one attempted item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemOutcome {
    Success,
    Failed,
}

/// Per-item detail of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub key: String,
    pub action: SyncAction,
    pub status: ItemOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Destination entity id written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<i64>,
}

/// A sync run as persisted in the history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResult {
    pub id: i64,
    pub source_instance_id: i64,
    pub destination_instance_id: i64,
    pub content_type: ContentType,
    pub status: RunStatus,
    pub items_total: usize,
    pub items_synced: usize,
    pub items_failed: usize,
    pub plan: Vec<SyncItem>,
    pub details: Vec<ItemResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SyncResult {
    /// Record an attempted item
    pub fn push_detail(&mut self, detail: ItemResult) {
        match detail.status {
            ItemOutcome::Success => self.items_synced += 1,
            ItemOutcome::Failed => self.items_failed += 1,
        }
        self.details.push(detail);
    }

    /// Move to a terminal status
    pub fn finish(&mut self, status: RunStatus, error_message: Option<String>) {
        self.status = status;
        if error_message.is_some() {
            self.error_message = error_message;
        }
        self.completed_at = Some(Utc::now());
    }
}

/// Filters for browsing the history
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
    /// Runs where the instance is either source or destination
    pub instance_id: Option<i64>,
}

fn default_limit() -> i64 {
    50
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
            instance_id: None,
        }
    }
}

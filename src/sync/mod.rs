//! Sync module for pushing CMS content between instances
//!
//! Provides:
//! - Planning of create/update writes from a comparison
//! - Background execution with per-item results
//! - A persisted run history
//!
//! # Run lifecycle
//!
//! 1. A run is recorded as `pending` and returned to the caller
//! 2. It waits for any earlier run against the same destination
//! 3. The destination is checked; if it cannot be reached the run is `failed`
//! 4. The first item moves it to `in_progress`; items are applied in order
//! 5. After the last item it is `completed`, whatever the per-item outcomes
//!
//! A cancelled run stops before its next item and ends as `failed`.

mod executor;
mod manager;
mod planner;
mod store;
mod types;

pub use executor::SyncExecutor;
pub use manager::{CancelOutcome, SyncManager};
pub use planner::{build_payload, plan_sync};
pub use store::{SyncHistoryRepository, INTERRUPTED_MESSAGE};
pub use types::{
    HistoryQuery, ItemOutcome, ItemResult, RunStatus, SelectedItem, StoreViewMapping, SyncAction,
    SyncItem, SyncPreview, SyncRequest, SyncResult,
};

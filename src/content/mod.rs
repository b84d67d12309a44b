//! Content module
//!
//! CMS record types and the on-disk snapshot cache they are compared from.

mod store;
mod types;

pub use store::ContentStore;
pub use types::{ContentRecord, ContentType, FieldValue, STORE_FIELD};

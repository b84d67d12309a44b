//! Comparison module
//!
//! Pure functions matching two content snapshots by natural key and diffing
//! matched pairs field by field.

mod comparator;
mod differ;

pub use comparator::{
    compare, ComparisonItem, ComparisonResult, ComparisonSummary, ItemStatus, Presence, Side,
};
pub use differ::{diff, DiffField, RecordDiff};

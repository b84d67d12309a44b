//! Route modules for the CMS Sync server

pub mod compare;
pub mod health;
pub mod history;
pub mod instances;
pub mod sync;

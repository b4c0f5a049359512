//! Local cache for reference data.
//!
//! This module keeps languages and roles in a durable local store and
//! decides when to refresh them from the admin API:
//! - Missing collections are fetched individually (selective refresh)
//! - A fully populated cache older than the staleness threshold is refetched
//! - Reads fall back to the remote source when the local store fails
//! - Concurrent first reads share a single initialization

mod manager;
mod storage;
#[cfg(test)]
pub(crate) mod testing;
mod traits;

pub use manager::CacheManager;
pub use storage::{ReferenceStore, SqliteStore, SCHEMA_VERSION};
pub use traits::{CacheStatus, ReferenceSource};

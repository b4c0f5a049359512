//! Local cache for the admin application's reference data.
//!
//! Languages and roles change rarely but are read everywhere. They are kept
//! in a local SQLite store, refreshed from the admin API when missing or
//! stale, and served straight from the API when the store is unusable.

pub mod cache;
pub mod config;
pub mod error;
pub mod reference;
pub mod views;

pub use cache::{CacheManager, CacheStatus, ReferenceSource, ReferenceStore, SqliteStore};
pub use error::{CacheError, Result};
pub use reference::{AdminApiClient, Language, ReferenceKind, Role};

//! Core traits and types for the caching system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::error::Result;
use crate::reference::{Language, Role};

/// Remote source of truth for reference collections.
///
/// Every call returns a complete snapshot of the collection.
#[async_trait]
pub trait ReferenceSource: Send + Sync + 'static {
  async fn fetch_all_languages(&self) -> Result<Vec<Language>>;

  async fn fetch_all_roles(&self) -> Result<Vec<Role>>;
}

#[async_trait]
impl<T: ReferenceSource + ?Sized> ReferenceSource for Arc<T> {
  async fn fetch_all_languages(&self) -> Result<Vec<Language>> {
    (**self).fetch_all_languages().await
  }

  async fn fetch_all_roles(&self) -> Result<Vec<Role>> {
    (**self).fetch_all_roles().await
  }
}

/// Diagnostic snapshot of the cache, computed on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
  pub initialized: bool,
  pub loading: bool,
  /// Last successful sync
  pub last_update: Option<DateTime<Utc>>,
  /// Whether the next startup check would consider the data stale
  pub should_update: bool,
  pub has_languages: bool,
  pub has_roles: bool,
  pub is_empty: bool,
}

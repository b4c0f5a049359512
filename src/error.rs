//! Error types for the reference cache.

use thiserror::Error;

use crate::reference::ReferenceKind;

/// Errors produced by the durable store, the remote source and the cache manager.
///
/// Messages are captured as strings so the error is `Clone`; a single
/// initialization outcome is handed to every task waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
  /// The local store failed to open or a transaction was rejected.
  #[error("Storage unavailable: {message}")]
  StorageUnavailable { message: String },

  /// Fetching a collection from the admin API failed.
  #[error("Failed to fetch {collection}: {message}")]
  RemoteFetchFailed {
    collection: ReferenceKind,
    message: String,
  },

  #[error("Configuration error: {message}")]
  Config { message: String },
}

impl CacheError {
  pub(crate) fn storage(message: impl Into<String>) -> Self {
    Self::StorageUnavailable {
      message: message.into(),
    }
  }

  pub(crate) fn remote(collection: ReferenceKind, message: impl Into<String>) -> Self {
    Self::RemoteFetchFailed {
      collection,
      message: message.into(),
    }
  }

  pub fn is_storage(&self) -> bool {
    matches!(self, Self::StorageUnavailable { .. })
  }

  pub fn is_remote(&self) -> bool {
    matches!(self, Self::RemoteFetchFailed { .. })
  }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, CacheError>;

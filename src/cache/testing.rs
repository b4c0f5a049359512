//! Fakes and fixtures shared by the cache and view tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

use super::storage::{ReferenceStore, SqliteStore};
use super::traits::ReferenceSource;
use crate::error::{CacheError, Result};
use crate::reference::{Language, ReferenceItem, ReferenceKind, Role};

pub fn language(id: &str, code: &str, name: &str, is_active: bool) -> Language {
  Language {
    id: id.to_string(),
    code: code.to_string(),
    name: name.to_string(),
    is_active,
    script: None,
    native_name: None,
  }
}

pub fn role(id: &str, code: &str, name: &str) -> Role {
  Role {
    id: id.to_string(),
    code: code.to_string(),
    name: name.to_string(),
    description: None,
  }
}

/// en (active), fr (inactive), ka (active)
pub fn sample_languages() -> Vec<Language> {
  vec![
    language("1", "en", "English", true),
    language("2", "fr", "French", false),
    language("3", "ka", "Georgian", true),
  ]
}

pub fn sample_roles() -> Vec<Role> {
  vec![role("1", "admin", "Administrator"), role("2", "editor", "Editor")]
}

/// In-memory store, opened and seeded.
pub fn seeded_store(
  languages: &[Language],
  roles: &[Role],
  last_update: Option<DateTime<Utc>>,
) -> SqliteStore {
  let store = SqliteStore::in_memory();
  store.init().unwrap();
  store.replace_all(languages).unwrap();
  store.replace_all(roles).unwrap();
  if let Some(stamp) = last_update {
    store.put_meta(stamp).unwrap();
  }
  store
}

/// Remote source that counts calls and can be told to fail.
pub struct FakeSource {
  languages: Mutex<Vec<Language>>,
  roles: Mutex<Vec<Role>>,
  pub language_fetches: AtomicUsize,
  pub role_fetches: AtomicUsize,
  pub fail_languages: AtomicBool,
  pub fail_roles: AtomicBool,
  held: AtomicBool,
  released: Notify,
}

impl FakeSource {
  pub fn new(languages: Vec<Language>, roles: Vec<Role>) -> Self {
    Self {
      languages: Mutex::new(languages),
      roles: Mutex::new(roles),
      language_fetches: AtomicUsize::new(0),
      role_fetches: AtomicUsize::new(0),
      fail_languages: AtomicBool::new(false),
      fail_roles: AtomicBool::new(false),
      held: AtomicBool::new(false),
      released: Notify::new(),
    }
  }

  pub fn with_samples() -> Self {
    Self::new(sample_languages(), sample_roles())
  }

  pub fn set_languages(&self, languages: Vec<Language>) {
    *self.languages.lock().unwrap() = languages;
  }

  pub fn language_fetches(&self) -> usize {
    self.language_fetches.load(Ordering::SeqCst)
  }

  pub fn role_fetches(&self) -> usize {
    self.role_fetches.load(Ordering::SeqCst)
  }

  /// Park every fetch after it is counted, until [`release`](Self::release).
  pub fn hold(&self) {
    self.held.store(true, Ordering::SeqCst);
  }

  pub fn release(&self) {
    self.held.store(false, Ordering::SeqCst);
    self.released.notify_waiters();
  }

  async fn wait_until_released(&self) {
    loop {
      let released = self.released.notified();
      if !self.held.load(Ordering::SeqCst) {
        return;
      }
      released.await;
    }
  }
}

#[async_trait]
impl ReferenceSource for FakeSource {
  async fn fetch_all_languages(&self) -> Result<Vec<Language>> {
    self.language_fetches.fetch_add(1, Ordering::SeqCst);
    self.wait_until_released().await;
    // Suspend like a real request so concurrent callers interleave
    tokio::task::yield_now().await;
    if self.fail_languages.load(Ordering::SeqCst) {
      return Err(CacheError::remote(ReferenceKind::Languages, "connection reset"));
    }
    Ok(self.languages.lock().unwrap().clone())
  }

  async fn fetch_all_roles(&self) -> Result<Vec<Role>> {
    self.role_fetches.fetch_add(1, Ordering::SeqCst);
    self.wait_until_released().await;
    tokio::task::yield_now().await;
    if self.fail_roles.load(Ordering::SeqCst) {
      return Err(CacheError::remote(ReferenceKind::Roles, "server returned 500"));
    }
    Ok(self.roles.lock().unwrap().clone())
  }
}

/// Store wrapper with switchable failures.
pub struct FlakyStore {
  pub inner: SqliteStore,
  pub fail_init: AtomicBool,
  pub fail_get_all: AtomicBool,
  pub fail_active: AtomicBool,
}

impl FlakyStore {
  pub fn new(inner: SqliteStore) -> Self {
    Self {
      inner,
      fail_init: AtomicBool::new(false),
      fail_get_all: AtomicBool::new(false),
      fail_active: AtomicBool::new(false),
    }
  }

  fn check(flag: &AtomicBool, op: &str) -> Result<()> {
    if flag.load(Ordering::SeqCst) {
      Err(CacheError::storage(format!("{} rejected", op)))
    } else {
      Ok(())
    }
  }
}

impl ReferenceStore for FlakyStore {
  fn init(&self) -> Result<()> {
    Self::check(&self.fail_init, "open")?;
    self.inner.init()
  }

  fn replace_all<T: ReferenceItem>(&self, items: &[T]) -> Result<()> {
    self.inner.replace_all(items)
  }

  fn get_all<T: ReferenceItem>(&self) -> Result<Vec<T>> {
    Self::check(&self.fail_get_all, "get_all")?;
    self.inner.get_all()
  }

  fn count(&self, kind: ReferenceKind) -> Result<usize> {
    self.inner.count(kind)
  }

  fn get_active_languages(&self) -> Result<Vec<Language>> {
    Self::check(&self.fail_active, "get_active_languages")?;
    self.inner.get_active_languages()
  }

  fn put_meta(&self, last_update: DateTime<Utc>) -> Result<()> {
    self.inner.put_meta(last_update)
  }

  fn get_meta(&self) -> Result<Option<DateTime<Utc>>> {
    self.inner.get_meta()
  }

  fn clear(&self) -> Result<()> {
    self.inner.clear()
  }
}

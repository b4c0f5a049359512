use tracing::warn;

use super::{find_by_code, find_by_id, to_options, Loading, SelectOption};
use crate::cache::{CacheManager, ReferenceSource, ReferenceStore};
use crate::reference::Role;

const LOAD_FAILED: &str = "Failed to load roles";

/// Roles as seen by one consumer.
pub struct RolesView<S: ReferenceStore, R: ReferenceSource> {
  cache: CacheManager<S, R>,
  roles: Vec<Role>,
  is_loading: bool,
  error: Option<String>,
}

impl<S: ReferenceStore, R: ReferenceSource> RolesView<S, R> {
  pub fn new(cache: CacheManager<S, R>) -> Self {
    Self {
      cache,
      roles: Vec::new(),
      is_loading: false,
      error: None,
    }
  }

  pub fn roles(&self) -> &[Role] {
    &self.roles
  }

  pub fn is_loading(&self) -> bool {
    self.is_loading
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// Load all roles; same contract as [`LanguagesView::load_languages`](super::LanguagesView::load_languages).
  pub async fn load_roles(&mut self, force: bool) -> Vec<Role> {
    if !force && !self.roles.is_empty() {
      return self.roles.clone();
    }

    let result = {
      let _loading = Loading::start(&mut self.is_loading);
      self.cache.get_cached_roles().await
    };

    match result {
      Ok(roles) => {
        self.error = None;
        self.roles = roles;
        self.roles.clone()
      }
      Err(e) => {
        warn!(error = %e, "{}", LOAD_FAILED);
        self.error = Some(LOAD_FAILED.to_string());
        Vec::new()
      }
    }
  }

  pub async fn get_role_by_code(&mut self, code: &str) -> Option<Role> {
    self.load_roles(false).await;
    find_by_code(&self.roles, code).cloned()
  }

  pub async fn get_role_by_id(&mut self, id: &str) -> Option<Role> {
    self.load_roles(false).await;
    find_by_id(&self.roles, id).cloned()
  }

  pub async fn refresh_roles(&mut self) {
    self.roles.clear();
    self.load_roles(true).await;
  }

  pub fn role_options(&self) -> Vec<SelectOption> {
    to_options(&self.roles)
  }
}

use tracing::warn;

use super::{find_by_code, find_by_id, to_options, Loading, SelectOption};
use crate::cache::{CacheManager, ReferenceSource, ReferenceStore};
use crate::reference::Language;

const LOAD_FAILED: &str = "Failed to load languages";
const LOAD_ACTIVE_FAILED: &str = "Failed to load active languages";

/// Languages as seen by one consumer.
pub struct LanguagesView<S: ReferenceStore, R: ReferenceSource> {
  cache: CacheManager<S, R>,
  languages: Vec<Language>,
  active_languages: Vec<Language>,
  is_loading: bool,
  error: Option<String>,
}

impl<S: ReferenceStore, R: ReferenceSource> LanguagesView<S, R> {
  pub fn new(cache: CacheManager<S, R>) -> Self {
    Self {
      cache,
      languages: Vec::new(),
      active_languages: Vec::new(),
      is_loading: false,
      error: None,
    }
  }

  pub fn languages(&self) -> &[Language] {
    &self.languages
  }

  pub fn active_languages(&self) -> &[Language] {
    &self.active_languages
  }

  pub fn is_loading(&self) -> bool {
    self.is_loading
  }

  /// Message of the last failed load, if any
  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// Load all languages.
  ///
  /// Returns the local copy when it is non-empty and `force` is false. Never
  /// fails: on error the list is empty and [`error`](Self::error) is set.
  pub async fn load_languages(&mut self, force: bool) -> Vec<Language> {
    if !force && !self.languages.is_empty() {
      return self.languages.clone();
    }

    let result = {
      let _loading = Loading::start(&mut self.is_loading);
      self.cache.get_cached_languages().await
    };

    match result {
      Ok(languages) => {
        self.error = None;
        self.languages = languages;
        self.languages.clone()
      }
      Err(e) => {
        warn!(error = %e, "{}", LOAD_FAILED);
        self.error = Some(LOAD_FAILED.to_string());
        Vec::new()
      }
    }
  }

  /// Load languages flagged active.
  pub async fn load_active_languages(&mut self, force: bool) -> Vec<Language> {
    if !force && !self.active_languages.is_empty() {
      return self.active_languages.clone();
    }

    let result = {
      let _loading = Loading::start(&mut self.is_loading);
      self.cache.get_cached_active_languages().await
    };

    match result {
      Ok(languages) => {
        self.error = None;
        self.active_languages = languages;
        self.active_languages.clone()
      }
      Err(e) => {
        warn!(error = %e, "{}", LOAD_ACTIVE_FAILED);
        self.error = Some(LOAD_ACTIVE_FAILED.to_string());
        Vec::new()
      }
    }
  }

  pub async fn get_language_by_code(&mut self, code: &str) -> Option<Language> {
    self.load_languages(false).await;
    find_by_code(&self.languages, code).cloned()
  }

  pub async fn get_language_by_id(&mut self, id: &str) -> Option<Language> {
    self.load_languages(false).await;
    find_by_id(&self.languages, id).cloned()
  }

  /// Drop both local lists and reload them.
  ///
  /// A failure of either reload stays in [`error`](Self::error); the first one wins.
  pub async fn refresh_languages(&mut self) {
    self.languages.clear();
    self.active_languages.clear();
    self.load_languages(true).await;
    let first_error = self.error.take();
    self.load_active_languages(true).await;
    if first_error.is_some() {
      self.error = first_error;
    }
  }

  pub fn language_options(&self) -> Vec<SelectOption> {
    to_options(&self.languages)
  }

  pub fn active_language_options(&self) -> Vec<SelectOption> {
    to_options(&self.active_languages)
  }
}

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CacheError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Directory for rolling log files (stderr only when unset)
  pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the admin application, e.g. "https://admin.example.org"
  pub url: String,
  /// Page size requested for the languages list; large enough to fetch everything at once
  #[serde(default = "default_page_size")]
  pub page_size: u32,
  /// Name of the cookie carrying the JWT
  #[serde(default = "default_cookie_name")]
  pub cookie_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Database file (defaults to $XDG_DATA_HOME/refcache/cache.db)
  pub path: Option<PathBuf>,
  /// Age after which a fully populated cache is refreshed
  #[serde(default = "default_stale_after_secs")]
  pub stale_after_secs: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      path: None,
      stale_after_secs: default_stale_after_secs(),
    }
  }
}

impl CacheConfig {
  pub fn stale_after(&self) -> Duration {
    Duration::from_secs(self.stale_after_secs)
  }

  /// Resolve the database location.
  pub fn db_path(&self) -> Result<PathBuf> {
    if let Some(p) = &self.path {
      return Ok(p.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| CacheError::Config {
        message: "Could not determine data directory".to_string(),
      })?;

    Ok(data_dir.join("refcache").join("cache.db"))
  }
}

fn default_page_size() -> u32 {
  1000
}

fn default_cookie_name() -> String {
  "auth_token".to_string()
}

fn default_stale_after_secs() -> u64 {
  60 * 60
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./refcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/refcache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(config_error(format!(
          "Config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(config_error(
        "No configuration file found. Create one at ~/.config/refcache/config.yaml",
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("refcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("refcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      config_error(format!(
        "Failed to read config file {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::from_yaml(&contents)
      .map_err(|e| config_error(format!("Failed to parse config file {}: {}", path.display(), e)))
  }

  pub fn from_yaml(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  /// Get the JWT used as the auth cookie.
  ///
  /// Reads REFCACHE_AUTH_TOKEN; requests go out unauthenticated when it is unset.
  pub fn get_auth_token() -> Option<String> {
    std::env::var("REFCACHE_AUTH_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}

fn config_error(message: impl Into<String>) -> CacheError {
  CacheError::Config {
    message: message.into(),
  }
}

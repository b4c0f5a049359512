use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::cache::ReferenceSource;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::reference::api_types::{ApiLanguageList, ApiRoleList};
use crate::reference::types::{Language, ReferenceKind, Role};

/// Read-only client for the admin API reference endpoints
#[derive(Clone)]
pub struct AdminApiClient {
  http: reqwest::Client,
  base_url: Url,
  page_size: u32,
}

impl AdminApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_auth_token();
    Self::with_token(
      &config.api.url,
      config.api.page_size,
      &config.api.cookie_name,
      token.as_deref(),
    )
  }

  pub fn with_token(
    base_url: &str,
    page_size: u32,
    cookie_name: &str,
    token: Option<&str>,
  ) -> Result<Self> {
    let base_url = Url::parse(base_url).map_err(|e| CacheError::Config {
      message: format!("Invalid API url {}: {}", base_url, e),
    })?;

    let mut headers = HeaderMap::new();
    if let Some(token) = token {
      let mut value = HeaderValue::from_str(&format!("{}={}", cookie_name, token)).map_err(|e| {
        CacheError::Config {
          message: format!("Invalid auth cookie: {}", e),
        }
      })?;
      value.set_sensitive(true);
      headers.insert(COOKIE, value);
    }

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| CacheError::Config {
        message: format!("Failed to create HTTP client: {}", e),
      })?;

    Ok(Self {
      http,
      base_url,
      page_size,
    })
  }

  fn languages_url(&self) -> Result<Url> {
    let mut url = self.endpoint(ReferenceKind::Languages, "api/languages")?;
    url
      .query_pairs_mut()
      .append_pair("page", "1")
      .append_pair("limit", &self.page_size.to_string());
    Ok(url)
  }

  fn roles_url(&self) -> Result<Url> {
    self.endpoint(ReferenceKind::Roles, "api/roles")
  }

  fn endpoint(&self, kind: ReferenceKind, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path)
      .map_err(|e| CacheError::remote(kind, format!("Invalid endpoint {}: {}", path, e)))
  }

  async fn get_json<T: DeserializeOwned>(&self, kind: ReferenceKind, url: Url) -> Result<T> {
    debug!(%url, "fetching {}", kind);

    let response = self
      .http
      .get(url)
      .send()
      .await
      .map_err(|e| CacheError::remote(kind, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
      return Err(CacheError::remote(kind, format!("server returned {}", status)));
    }

    response
      .json::<T>()
      .await
      .map_err(|e| CacheError::remote(kind, format!("Failed to parse response: {}", e)))
  }
}

#[async_trait]
impl ReferenceSource for AdminApiClient {
  async fn fetch_all_languages(&self) -> Result<Vec<Language>> {
    let url = self.languages_url()?;
    let list: ApiLanguageList = self.get_json(ReferenceKind::Languages, url).await?;

    if list.is_truncated() {
      warn!(
        total = list.total,
        received = list.collection.len(),
        "language list truncated, raise api.page_size"
      );
    }

    Ok(list.collection)
  }

  async fn fetch_all_roles(&self) -> Result<Vec<Role>> {
    let url = self.roles_url()?;
    let roles: ApiRoleList = self.get_json(ReferenceKind::Roles, url).await?;
    Ok(roles)
  }
}

//! Serde-deserializable envelopes matching the admin API responses.
//!
//! The item records themselves are the domain types; only the wrapping
//! differs between endpoints.

use serde::Deserialize;

use super::types::{Language, Role};

// ============================================================================
// Languages endpoint response
// ============================================================================

/// Paginated list returned by `GET /api/languages`.
///
/// The cache always asks for one oversized page, so only `collection` is consumed.
#[derive(Debug, Deserialize)]
pub struct ApiLanguageList {
  #[serde(default)]
  pub collection: Vec<Language>,
  #[serde(default)]
  pub total: Option<u64>,
}

impl ApiLanguageList {
  /// True when the server reported more rows than it returned.
  pub fn is_truncated(&self) -> bool {
    matches!(self.total, Some(total) if total > self.collection.len() as u64)
  }
}

// ============================================================================
// Roles endpoint response
// ============================================================================

/// `GET /api/roles` returns a bare array.
pub type ApiRoleList = Vec<Role>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_language_envelope() {
    let raw = r#"{
      "collection": [
        {"id": 1, "code": "en", "name": "English", "is_active": true, "script": "Latn"},
        {"id": 2, "code": "ka", "name": "Georgian", "is_active": false, "script": "Geor"}
      ],
      "total": 2,
      "page": 1,
      "limit": 1000
    }"#;
    let list: ApiLanguageList = serde_json::from_str(raw).unwrap();
    assert_eq!(list.collection.len(), 2);
    assert_eq!(list.collection[1].script.as_deref(), Some("Geor"));
    assert!(!list.is_truncated());
  }

  #[test]
  fn test_truncated_page() {
    let raw = r#"{"collection": [{"id": 1, "code": "en", "name": "English"}], "total": 3}"#;
    let list: ApiLanguageList = serde_json::from_str(raw).unwrap();
    assert!(list.is_truncated());
  }

  #[test]
  fn test_role_array() {
    let raw = r#"[{"id": 1, "code": "admin", "name": "Administrator", "description": null}]"#;
    let roles: ApiRoleList = serde_json::from_str(raw).unwrap();
    assert_eq!(roles[0].code, "admin");
    assert_eq!(roles[0].description, None);
  }
}

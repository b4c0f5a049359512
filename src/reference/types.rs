//! Reference data records cached locally.

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// The reference collections kept in the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
  Languages,
  Roles,
}

impl ReferenceKind {
  pub const ALL: [ReferenceKind; 2] = [ReferenceKind::Languages, ReferenceKind::Roles];

  /// Table name in the local store.
  pub fn table(self) -> &'static str {
    match self {
      Self::Languages => "languages",
      Self::Roles => "roles",
    }
  }
}

impl fmt::Display for ReferenceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.table())
  }
}

/// Trait for records that live in one of the reference collections.
///
/// Within one collection snapshot both `id` and `code` are unique.
pub trait ReferenceItem: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Which collection the record belongs to
  const KIND: ReferenceKind;

  fn id(&self) -> &str;

  fn code(&self) -> &str;

  fn name(&self) -> &str;

  /// Value of the `is_active` column. Kinds without the flag store `true`.
  fn active_flag(&self) -> bool {
    true
  }
}

/// A content language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Language {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  pub code: String,
  pub name: String,
  #[serde(default, deserialize_with = "deserialize_strict_flag")]
  pub is_active: bool,
  /// ISO 15924 script code, e.g. "Latn"
  #[serde(default)]
  pub script: Option<String>,
  #[serde(default)]
  pub native_name: Option<String>,
}

/// A user role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  pub code: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
}

impl ReferenceItem for Language {
  const KIND: ReferenceKind = ReferenceKind::Languages;

  fn id(&self) -> &str {
    &self.id
  }

  fn code(&self) -> &str {
    &self.code
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn active_flag(&self) -> bool {
    self.is_active
  }
}

impl ReferenceItem for Role {
  const KIND: ReferenceKind = ReferenceKind::Roles;

  fn id(&self) -> &str {
    &self.id
  }

  fn code(&self) -> &str {
    &self.code
  }

  fn name(&self) -> &str {
    &self.name
  }
}

/// Keep only languages whose flag is exactly `true`.
pub fn active_only(languages: Vec<Language>) -> Vec<Language> {
  languages.into_iter().filter(|l| l.is_active).collect()
}

/// Accept ids sent either as JSON numbers or strings.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!(
      "expected string or number id, got {}",
      other
    ))),
  }
}

/// Only the JSON literal `true` counts as active; `1`, `"true"` and `null` do not.
fn deserialize_strict_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(matches!(Value::deserialize(deserializer)?, Value::Bool(true)))
}

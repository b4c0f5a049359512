//! Durable store trait and SQLite implementation.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::{CacheError, Result};
use crate::reference::{Language, ReferenceItem, ReferenceKind};

/// Current layout version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// Sentinel primary key of the single `cache_meta` record.
const META_KEY: &str = "last_update";

/// Trait for durable reference-data stores.
///
/// Pure storage: no retries, no refresh policy.
pub trait ReferenceStore: Send + Sync + 'static {
  /// Open the store, creating the schema on first use. Idempotent.
  fn init(&self) -> Result<()>;

  /// Atomically replace a whole collection.
  fn replace_all<T: ReferenceItem>(&self, items: &[T]) -> Result<()>;

  /// The complete current collection, empty if never populated.
  fn get_all<T: ReferenceItem>(&self) -> Result<Vec<T>>;

  /// Number of records in a collection.
  fn count(&self, kind: ReferenceKind) -> Result<usize>;

  /// Languages whose `is_active` flag is exactly `true`.
  fn get_active_languages(&self) -> Result<Vec<Language>>;

  fn put_meta(&self, last_update: DateTime<Utc>) -> Result<()>;

  fn get_meta(&self) -> Result<Option<DateTime<Utc>>>;

  /// Empty every record space in one transaction.
  fn clear(&self) -> Result<()>;
}

/// Where the SQLite database lives.
#[derive(Debug, Clone)]
enum Location {
  File(PathBuf),
  Memory,
}

/// SQLite-based reference store.
///
/// The connection is opened lazily by [`ReferenceStore::init`] and reused afterwards.
pub struct SqliteStore {
  location: Location,
  conn: Mutex<Option<Connection>>,
}

impl SqliteStore {
  /// Store backed by a database file. Nothing is touched until `init`.
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self {
      location: Location::File(path.into()),
      conn: Mutex::new(None),
    }
  }

  /// Store that lives only as long as this value.
  pub fn in_memory() -> Self {
    Self {
      location: Location::Memory,
      conn: Mutex::new(None),
    }
  }

  fn open_connection(&self) -> Result<Connection> {
    let conn = match &self.location {
      Location::File(path) => {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
          std::fs::create_dir_all(parent).map_err(|e| {
            CacheError::storage(format!("Failed to create cache directory: {}", e))
          })?;
        }

        Connection::open(path).map_err(|e| {
          CacheError::storage(format!(
            "Failed to open cache database at {}: {}",
            path.display(),
            e
          ))
        })?
      }
      Location::Memory => Connection::open_in_memory()
        .map_err(|e| CacheError::storage(format!("Failed to open in-memory cache: {}", e)))?,
    };

    run_migrations(&conn)?;
    Ok(conn)
  }

  fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
    self
      .conn
      .lock()
      .map_err(|e| CacheError::storage(format!("Lock poisoned: {}", e)))
  }

  /// Run `f` against the open connection.
  fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
    let mut guard = self.lock()?;
    match guard.as_mut() {
      Some(conn) => f(conn),
      None => Err(CacheError::storage("Cache store is not open")),
    }
  }
}

/// Bring the schema to [`SCHEMA_VERSION`].
///
/// Reference data can always be fetched again, so older layouts are dropped.
fn run_migrations(conn: &Connection) -> Result<()> {
  let version: i64 = conn
    .query_row("PRAGMA user_version", [], |row| row.get(0))
    .map_err(|e| CacheError::storage(format!("Failed to read schema version: {}", e)))?;

  if version < SCHEMA_VERSION {
    debug!(from = version, to = SCHEMA_VERSION, "resetting cache schema");
    conn
      .execute_batch(DROP_SCHEMA)
      .map_err(|e| CacheError::storage(format!("Failed to drop old cache tables: {}", e)))?;
  }

  conn
    .execute_batch(CACHE_SCHEMA)
    .map_err(|e| CacheError::storage(format!("Failed to run cache migrations: {}", e)))?;

  conn
    .pragma_update(None, "user_version", SCHEMA_VERSION)
    .map_err(|e| CacheError::storage(format!("Failed to set schema version: {}", e)))?;

  Ok(())
}

const DROP_SCHEMA: &str = r#"
DROP TABLE IF EXISTS languages;
DROP TABLE IF EXISTS roles;
DROP TABLE IF EXISTS cache_meta;
"#;

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS languages (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    is_active INTEGER NOT NULL,
    data BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS roles (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    data BLOB NOT NULL
);

-- Single-row sync bookkeeping
CREATE TABLE IF NOT EXISTS cache_meta (
    key TEXT PRIMARY KEY,
    last_update TEXT NOT NULL,
    version INTEGER NOT NULL
);
"#;

impl ReferenceStore for SqliteStore {
  fn init(&self) -> Result<()> {
    let mut guard = self.lock()?;
    if guard.is_none() {
      *guard = Some(self.open_connection()?);
      debug!(location = ?self.location, "cache store opened");
    }
    Ok(())
  }

  fn replace_all<T: ReferenceItem>(&self, items: &[T]) -> Result<()> {
    let kind = T::KIND;
    self.with_conn(|conn| {
      let tx = conn
        .transaction()
        .map_err(|e| CacheError::storage(format!("Failed to begin transaction: {}", e)))?;

      tx.execute(&format!("DELETE FROM {}", kind.table()), [])
        .map_err(|e| CacheError::storage(format!("Failed to clear {}: {}", kind, e)))?;

      {
        let mut stmt = match kind {
          ReferenceKind::Languages => tx.prepare(
            "INSERT INTO languages (id, code, name, is_active, data) VALUES (?, ?, ?, ?, ?)",
          ),
          ReferenceKind::Roles => {
            tx.prepare("INSERT INTO roles (id, code, name, data) VALUES (?, ?, ?, ?)")
          }
        }
        .map_err(|e| CacheError::storage(format!("Failed to prepare insert: {}", e)))?;

        for item in items {
          let data = serde_json::to_vec(item)
            .map_err(|e| CacheError::storage(format!("Failed to serialize {}: {}", kind, e)))?;

          let inserted = match kind {
            ReferenceKind::Languages => stmt.execute(params![
              item.id(),
              item.code(),
              item.name(),
              item.active_flag(),
              data
            ]),
            ReferenceKind::Roles => stmt.execute(params![item.id(), item.code(), item.name(), data]),
          };

          inserted.map_err(|e| {
            CacheError::storage(format!("Failed to store {} {}: {}", kind, item.code(), e))
          })?;
        }
      }

      // Dropping `tx` on any error above rolls the replacement back
      tx.commit()
        .map_err(|e| CacheError::storage(format!("Failed to commit transaction: {}", e)))?;

      debug!(count = items.len(), "replaced {}", kind);
      Ok(())
    })
  }

  fn get_all<T: ReferenceItem>(&self) -> Result<Vec<T>> {
    let kind = T::KIND;
    self.with_conn(|conn| {
      let mut stmt = conn
        .prepare(&format!("SELECT data FROM {}", kind.table()))
        .map_err(|e| CacheError::storage(format!("Failed to prepare query: {}", e)))?;

      read_items(&mut stmt)
    })
  }

  fn count(&self, kind: ReferenceKind) -> Result<usize> {
    self.with_conn(|conn| {
      let count: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {}", kind.table()), [], |row| {
          row.get(0)
        })
        .map_err(|e| CacheError::storage(format!("Failed to count {}: {}", kind, e)))?;
      Ok(count as usize)
    })
  }

  fn get_active_languages(&self) -> Result<Vec<Language>> {
    self.with_conn(|conn| {
      let mut stmt = conn
        .prepare("SELECT data FROM languages WHERE is_active = 1")
        .map_err(|e| CacheError::storage(format!("Failed to prepare query: {}", e)))?;

      read_items(&mut stmt)
    })
  }

  fn put_meta(&self, last_update: DateTime<Utc>) -> Result<()> {
    let stamp = last_update.to_rfc3339_opts(SecondsFormat::Micros, true);
    self.with_conn(|conn| {
      conn
        .execute(
          "INSERT OR REPLACE INTO cache_meta (key, last_update, version) VALUES (?, ?, ?)",
          params![META_KEY, stamp, SCHEMA_VERSION],
        )
        .map_err(|e| CacheError::storage(format!("Failed to store cache metadata: {}", e)))?;
      Ok(())
    })
  }

  fn get_meta(&self) -> Result<Option<DateTime<Utc>>> {
    self.with_conn(|conn| {
      let stamp: Option<String> = conn
        .query_row(
          "SELECT last_update FROM cache_meta WHERE key = ?",
          params![META_KEY],
          |row| row.get(0),
        )
        .optional()
        .map_err(|e| CacheError::storage(format!("Failed to read cache metadata: {}", e)))?;

      stamp.map(|s| parse_datetime(&s)).transpose()
    })
  }

  fn clear(&self) -> Result<()> {
    self.with_conn(|conn| {
      let tx = conn
        .transaction()
        .map_err(|e| CacheError::storage(format!("Failed to begin transaction: {}", e)))?;

      tx.execute_batch("DELETE FROM languages; DELETE FROM roles; DELETE FROM cache_meta;")
        .map_err(|e| CacheError::storage(format!("Failed to clear cache: {}", e)))?;

      tx.commit()
        .map_err(|e| CacheError::storage(format!("Failed to commit transaction: {}", e)))?;
      Ok(())
    })
  }
}

fn read_items<T: ReferenceItem>(stmt: &mut rusqlite::Statement<'_>) -> Result<Vec<T>> {
  let rows = stmt
    .query_map([], |row| row.get::<_, Vec<u8>>(0))
    .map_err(|e| CacheError::storage(format!("Failed to query {}: {}", T::KIND, e)))?;

  let mut items = Vec::new();
  for row in rows {
    let data = row.map_err(|e| CacheError::storage(format!("Failed to read row: {}", e)))?;
    let item = serde_json::from_slice(&data).map_err(|e| {
      CacheError::storage(format!("Failed to deserialize {}: {}", T::KIND, e))
    })?;
    items.push(item);
  }
  Ok(items)
}

/// Parse an RFC 3339 timestamp written by `put_meta`.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| CacheError::storage(format!("Failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::testing::{language, role, sample_languages, sample_roles};
  use crate::reference::Role;
  use chrono::Duration;
  use tempfile::TempDir;

  fn open_store() -> SqliteStore {
    let store = SqliteStore::in_memory();
    store.init().unwrap();
    store
  }

  #[test]
  fn test_operations_before_init_fail() {
    let store = SqliteStore::in_memory();
    let err = store.count(ReferenceKind::Roles).unwrap_err();
    assert!(err.is_storage());
  }

  #[test]
  fn test_init_is_idempotent() {
    let store = open_store();
    store.replace_all(&sample_roles()).unwrap();

    // A second init must not reopen (an in-memory reopen would lose the data)
    store.init().unwrap();
    assert_eq!(store.count(ReferenceKind::Roles).unwrap(), 2);
  }

  #[test]
  fn test_empty_collections() {
    let store = open_store();
    assert!(store.get_all::<Language>().unwrap().is_empty());
    assert_eq!(store.count(ReferenceKind::Languages).unwrap(), 0);
    assert_eq!(store.get_meta().unwrap(), None);
  }

  #[test]
  fn test_replace_all_replaces_whole_collection() {
    let store = open_store();
    store.replace_all(&sample_languages()).unwrap();
    assert_eq!(store.count(ReferenceKind::Languages).unwrap(), 3);

    store
      .replace_all(&[language("9", "pt", "Portuguese", true)])
      .unwrap();

    let all: Vec<Language> = store.get_all().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].code, "pt");
  }

  #[test]
  fn test_failed_replace_keeps_previous_contents() {
    let store = open_store();
    store.replace_all(&sample_roles()).unwrap();

    // Duplicate code violates the unique index half-way through
    let broken = vec![
      role("10", "viewer", "Viewer"),
      role("11", "viewer", "Viewer again"),
    ];
    let err = store.replace_all(&broken).unwrap_err();
    assert!(err.is_storage());

    let roles: Vec<Role> = store.get_all().unwrap();
    let mut codes: Vec<_> = roles.iter().map(|r| r.code.as_str()).collect();
    codes.sort();
    assert_eq!(codes, vec!["admin", "editor"]);
  }

  #[test]
  fn test_active_languages_are_exact() {
    let store = open_store();
    store.replace_all(&sample_languages()).unwrap();

    let active = store.get_active_languages().unwrap();
    let mut codes: Vec<_> = active.iter().map(|l| l.code.clone()).collect();
    codes.sort();
    assert_eq!(codes, vec!["en", "ka"]);
  }

  #[test]
  fn test_meta_round_trip() {
    let store = open_store();
    let stamp = Utc::now() - Duration::minutes(5);
    store.put_meta(stamp).unwrap();

    let loaded = store.get_meta().unwrap().unwrap();
    assert!((loaded - stamp).num_milliseconds().abs() < 1);

    let later = stamp + Duration::minutes(1);
    store.put_meta(later).unwrap();
    assert!(store.get_meta().unwrap().unwrap() > stamp);
  }

  #[test]
  fn test_clear_empties_everything() {
    let store = open_store();
    store.replace_all(&sample_languages()).unwrap();
    store.replace_all(&sample_roles()).unwrap();
    store.put_meta(Utc::now()).unwrap();

    store.clear().unwrap();

    assert_eq!(store.count(ReferenceKind::Languages).unwrap(), 0);
    assert_eq!(store.count(ReferenceKind::Roles).unwrap(), 0);
    assert_eq!(store.get_meta().unwrap(), None);
  }

  #[test]
  fn test_file_store_persists_across_handles() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("cache.db");

    {
      let store = SqliteStore::new(&path);
      store.init().unwrap();
      store.replace_all(&sample_roles()).unwrap();
    }

    let store = SqliteStore::new(&path);
    store.init().unwrap();
    assert_eq!(store.count(ReferenceKind::Roles).unwrap(), 2);
  }

  #[test]
  fn test_outdated_schema_is_rebuilt() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cache.db");

    {
      // Unversioned layout from an older build
      let conn = Connection::open(&path).unwrap();
      conn
        .execute_batch(
          "CREATE TABLE roles (id INTEGER PRIMARY KEY, label TEXT);
           INSERT INTO roles (id, label) VALUES (1, 'legacy');",
        )
        .unwrap();
    }

    let store = SqliteStore::new(&path);
    store.init().unwrap();
    assert_eq!(store.count(ReferenceKind::Roles).unwrap(), 0);

    store.replace_all(&sample_roles()).unwrap();
    assert_eq!(store.count(ReferenceKind::Roles).unwrap(), 2);
  }
}

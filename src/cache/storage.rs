//! Local store trait and SQLite implementation.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::traits::{Cacheable, ReferenceEntity};
use crate::error::{Result, SyncError};
use crate::models::TimeRecord;

/// Contents of a reference table.
#[derive(Debug, Clone)]
pub struct CachedTable<T> {
  /// Entities in fetch order
  pub entities: Vec<T>,
  /// When the table was last written, None if it is empty
  pub cached_at: Option<DateTime<Utc>>,
}

/// Trait for local store backends.
///
/// Reference tables are only ever replaced wholesale or patched by id.
/// Time records carry a nullable `synced_at`; a null marks the row dirty.
pub trait LocalStore: Send + Sync {
  /// Replace a reference table with `entities` (clear then insert, one transaction).
  fn replace_all<T: ReferenceEntity>(&self, entities: &[T]) -> Result<()>;

  /// Get every row of a reference table in stored order.
  fn load_all<T: ReferenceEntity>(&self) -> Result<CachedTable<T>>;

  /// Get a single reference entity by id.
  fn get<T: ReferenceEntity>(&self, id: &str) -> Result<Option<T>>;

  /// Insert or replace a single reference entity by id.
  fn put<T: ReferenceEntity>(&self, entity: &T) -> Result<()>;

  /// Remove a single reference entity. Returns whether a row existed.
  fn remove<T: ReferenceEntity>(&self, id: &str) -> Result<bool>;

  /// Insert or replace a time record, replacing any other row for the same user and day.
  fn put_record(&self, record: &TimeRecord) -> Result<()>;

  fn get_record(&self, id: &str) -> Result<Option<TimeRecord>>;

  fn record_for_day(&self, user_id: &str, date: NaiveDate) -> Result<Option<TimeRecord>>;

  /// All records of a user ordered by date, dirty ones included.
  fn records_for_user(&self, user_id: &str) -> Result<Vec<TimeRecord>>;

  /// Records of a user not yet confirmed by the remote store, ordered by date.
  fn dirty_records(&self, user_id: &str) -> Result<Vec<TimeRecord>>;

  /// Stamp `synced_at` on a record, only if the stored content still equals `record`.
  /// Returns false if the row changed or vanished in the meantime.
  fn mark_synced(&self, record: &TimeRecord, at: DateTime<Utc>) -> Result<bool>;

  /// Replace a user's synced records with the remote set. Dirty rows survive
  /// and win over remote rows with the same id or day.
  fn replace_user_records(
    &self,
    user_id: &str,
    records: &[TimeRecord],
    synced_at: DateTime<Utc>,
  ) -> Result<usize>;

  fn remove_record(&self, id: &str) -> Result<bool>;
}

/// SQLite-based local store.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| SyncError::store("Failed to create store directory", e))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      SyncError::store(&format!("Failed to open store at {}", path.display()), e)
    })?;

    Self::with_connection(conn)
  }

  /// Open a store that lives only as long as this value.
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| SyncError::store("Failed to open in-memory store", e))?;
    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| SyncError::LocalStoreFailure("Could not determine data directory".into()))?;

    Ok(data_dir.join("fleetsync").join("local.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Run database migrations for store tables.
  fn run_migrations(&self) -> Result<()> {
    self
      .conn()?
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| SyncError::store("Failed to run store migrations", e))
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| SyncError::store("Lock poisoned", e))
  }
}

/// Schema for store tables. Reference tables share a layout; their names
/// come from `Cacheable::entity_type`.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS parts (
    id TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS fleet_tags (
    id TEXT PRIMARY KEY,
    position INTEGER NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- synced_at NULL marks a dirty record
CREATE TABLE IF NOT EXISTS time_records (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    date TEXT NOT NULL,
    data BLOB NOT NULL,
    synced_at TEXT,
    UNIQUE (user_id, date)
);

CREATE INDEX IF NOT EXISTS idx_time_records_dirty
    ON time_records(user_id, synced_at);
"#;

fn encode<T: Cacheable>(entity: &T) -> Result<Vec<u8>> {
  serde_json::to_vec(entity).map_err(|source| SyncError::Serialization {
    action: "encode",
    table: T::entity_type().to_string(),
    source,
  })
}

fn decode<T: Cacheable>(data: &[u8]) -> Result<T> {
  serde_json::from_slice(data).map_err(|source| SyncError::Serialization {
    action: "decode",
    table: T::entity_type().to_string(),
    source,
  })
}

fn decode_record(data: &[u8], synced_at: Option<String>) -> Result<TimeRecord> {
  let mut record: TimeRecord = decode(data)?;
  record.synced_at = synced_at.as_deref().map(parse_timestamp).transpose()?;
  Ok(record)
}

fn insert_record(conn: &Connection, record: &TimeRecord) -> Result<()> {
  let data = encode(record)?;
  conn.execute(
    "INSERT OR REPLACE INTO time_records (id, user_id, date, data, synced_at)
     VALUES (?, ?, ?, ?, ?)",
    params![
      record.id,
      record.user_id,
      record.date.to_string(),
      data,
      record.synced_at.map(|t| t.to_rfc3339()),
    ],
  )?;
  Ok(())
}

fn query_records(conn: &Connection, sql: &str, user_id: &str) -> Result<Vec<TimeRecord>> {
  let mut stmt = conn.prepare(sql)?;
  let rows = stmt
    .query_map(params![user_id], |row| {
      Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Option<String>>(1)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  rows
    .into_iter()
    .map(|(data, synced_at)| decode_record(&data, synced_at))
    .collect()
}

impl LocalStore for SqliteStorage {
  fn replace_all<T: ReferenceEntity>(&self, entities: &[T]) -> Result<()> {
    let mut conn = self.conn()?;
    let table = T::entity_type();
    let tx = conn.transaction()?;

    tx.execute(&format!("DELETE FROM {}", table), [])?;

    {
      let mut stmt = tx.prepare(&format!(
        "INSERT OR REPLACE INTO {} (id, position, data, cached_at)
         VALUES (?, ?, ?, datetime('now'))",
        table
      ))?;
      for (position, entity) in entities.iter().enumerate() {
        stmt.execute(params![entity.cache_key(), position, encode(entity)?])?;
      }
    }

    tx.commit()?;
    Ok(())
  }

  fn load_all<T: ReferenceEntity>(&self) -> Result<CachedTable<T>> {
    let conn = self.conn()?;
    let table = T::entity_type();

    let cached_at: Option<String> = conn.query_row(
      &format!("SELECT MAX(cached_at) FROM {}", table),
      [],
      |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(&format!("SELECT data FROM {} ORDER BY position", table))?;
    let rows = stmt
      .query_map([], |row| row.get::<_, Vec<u8>>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;

    let entities = rows
      .iter()
      .map(|data| decode(data))
      .collect::<Result<Vec<T>>>()?;

    Ok(CachedTable {
      entities,
      cached_at: cached_at.as_deref().map(parse_datetime).transpose()?,
    })
  }

  fn get<T: ReferenceEntity>(&self, id: &str) -> Result<Option<T>> {
    let conn = self.conn()?;
    let data: Option<Vec<u8>> = conn
      .query_row(
        &format!("SELECT data FROM {} WHERE id = ?", T::entity_type()),
        params![id],
        |row| row.get(0),
      )
      .optional()?;

    data.map(|d| decode(&d)).transpose()
  }

  fn put<T: ReferenceEntity>(&self, entity: &T) -> Result<()> {
    let conn = self.conn()?;
    let table = T::entity_type();

    // New ids go to the end; existing ids keep their position
    conn.execute(
      &format!(
        "INSERT INTO {t} (id, position, data, cached_at)
         VALUES (?1, (SELECT COALESCE(MAX(position), -1) + 1 FROM {t}), ?2, datetime('now'))
         ON CONFLICT(id) DO UPDATE SET data = excluded.data, cached_at = excluded.cached_at",
        t = table
      ),
      params![entity.cache_key(), encode(entity)?],
    )?;

    Ok(())
  }

  fn remove<T: ReferenceEntity>(&self, id: &str) -> Result<bool> {
    let conn = self.conn()?;
    let removed = conn.execute(
      &format!("DELETE FROM {} WHERE id = ?", T::entity_type()),
      params![id],
    )?;
    Ok(removed > 0)
  }

  fn put_record(&self, record: &TimeRecord) -> Result<()> {
    let conn = self.conn()?;
    insert_record(&conn, record)
  }

  fn get_record(&self, id: &str) -> Result<Option<TimeRecord>> {
    let conn = self.conn()?;
    let row: Option<(Vec<u8>, Option<String>)> = conn
      .query_row(
        "SELECT data, synced_at FROM time_records WHERE id = ?",
        params![id],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    row
      .map(|(data, synced_at)| decode_record(&data, synced_at))
      .transpose()
  }

  fn record_for_day(&self, user_id: &str, date: NaiveDate) -> Result<Option<TimeRecord>> {
    let conn = self.conn()?;
    let row: Option<(Vec<u8>, Option<String>)> = conn
      .query_row(
        "SELECT data, synced_at FROM time_records WHERE user_id = ? AND date = ?",
        params![user_id, date.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    row
      .map(|(data, synced_at)| decode_record(&data, synced_at))
      .transpose()
  }

  fn records_for_user(&self, user_id: &str) -> Result<Vec<TimeRecord>> {
    let conn = self.conn()?;
    query_records(
      &conn,
      "SELECT data, synced_at FROM time_records WHERE user_id = ? ORDER BY date",
      user_id,
    )
  }

  fn dirty_records(&self, user_id: &str) -> Result<Vec<TimeRecord>> {
    let conn = self.conn()?;
    query_records(
      &conn,
      "SELECT data, synced_at FROM time_records
       WHERE user_id = ? AND synced_at IS NULL ORDER BY date",
      user_id,
    )
  }

  fn mark_synced(&self, record: &TimeRecord, at: DateTime<Utc>) -> Result<bool> {
    let conn = self.conn()?;
    let updated = conn.execute(
      "UPDATE time_records SET synced_at = ? WHERE id = ? AND data = ?",
      params![at.to_rfc3339(), record.id, encode(record)?],
    )?;
    Ok(updated > 0)
  }

  fn replace_user_records(
    &self,
    user_id: &str,
    records: &[TimeRecord],
    synced_at: DateTime<Utc>,
  ) -> Result<usize> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    let mut dirty_ids = HashSet::new();
    let mut dirty_days = HashSet::new();
    {
      let mut stmt =
        tx.prepare("SELECT id, date FROM time_records WHERE user_id = ? AND synced_at IS NULL")?;
      let rows = stmt.query_map(params![user_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
      })?;
      for row in rows {
        let (id, date) = row?;
        dirty_ids.insert(id);
        dirty_days.insert(date);
      }
    }

    tx.execute(
      "DELETE FROM time_records WHERE user_id = ? AND synced_at IS NOT NULL",
      params![user_id],
    )?;

    let mut written = 0;
    for record in records {
      if record.user_id != user_id
        || dirty_ids.contains(&record.id)
        || dirty_days.contains(&record.date.to_string())
      {
        continue;
      }
      let mut record = record.clone();
      record.synced_at = Some(synced_at);
      insert_record(&tx, &record)?;
      written += 1;
    }

    tx.commit()?;
    Ok(written)
  }

  fn remove_record(&self, id: &str) -> Result<bool> {
    let conn = self.conn()?;
    let removed = conn.execute("DELETE FROM time_records WHERE id = ?", params![id])?;
    Ok(removed > 0)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| SyncError::store(&format!("Failed to parse datetime '{}'", s), e))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| SyncError::store(&format!("Failed to parse timestamp '{}'", s), e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::{FleetTag, Part};

  fn part(id: &str, code: &str) -> Part {
    Part {
      id: id.into(),
      code: code.into(),
      description: format!("{} description", code),
      name: None,
      tags: None,
      related_parts: None,
    }
  }

  fn record(user: &str, day: u32) -> TimeRecord {
    let mut r = TimeRecord::new(user, NaiveDate::from_ymd_opt(2026, 10, day).unwrap());
    r.set_times(Some("08:00".into()), None);
    r
  }

  #[test]
  fn test_replace_all_drops_stale_rows() {
    let store = SqliteStorage::in_memory().unwrap();
    store.replace_all(&[part("1", "P001"), part("2", "P002")]).unwrap();
    store.replace_all(&[part("3", "P003"), part("2", "P002")]).unwrap();

    let table = store.load_all::<Part>().unwrap();
    let ids: Vec<_> = table.entities.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["3", "2"]);
    assert!(table.cached_at.is_some());
  }

  #[test]
  fn test_empty_table_has_no_cached_at() {
    let store = SqliteStorage::in_memory().unwrap();
    let table = store.load_all::<FleetTag>().unwrap();
    assert!(table.entities.is_empty());
    assert!(table.cached_at.is_none());
  }

  #[test]
  fn test_put_appends_new_and_keeps_position_of_existing() {
    let store = SqliteStorage::in_memory().unwrap();
    store.replace_all(&[part("1", "P001"), part("2", "P002")]).unwrap();

    let mut edited = part("1", "P001");
    edited.name = Some("Filtro".into());
    store.put(&edited).unwrap();
    store.put(&part("9", "P009")).unwrap();

    let parts = store.load_all::<Part>().unwrap().entities;
    let ids: Vec<_> = parts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "9"]);
    assert_eq!(parts[0].name.as_deref(), Some("Filtro"));
    assert_eq!(store.get::<Part>("9").unwrap(), Some(part("9", "P009")));
  }

  #[test]
  fn test_remove_reference_entity() {
    let store = SqliteStorage::in_memory().unwrap();
    store.put(&part("1", "P001")).unwrap();
    assert!(store.remove::<Part>("1").unwrap());
    assert!(!store.remove::<Part>("1").unwrap());
    assert_eq!(store.get::<Part>("1").unwrap(), None);
  }

  #[test]
  fn test_tables_are_independent() {
    let store = SqliteStorage::in_memory().unwrap();
    store.put(&part("1", "P001")).unwrap();
    store
      .replace_all::<FleetTag>(&[FleetTag {
        id: "a".into(),
        number: "AF-10".into(),
        description: None,
      }])
      .unwrap();
    assert_eq!(store.load_all::<Part>().unwrap().entities.len(), 1);
  }

  #[test]
  fn test_dirty_records_and_mark_synced() {
    let store = SqliteStorage::in_memory().unwrap();
    let r1 = record("u1", 1);
    let r2 = record("u1", 2);
    store.put_record(&r1).unwrap();
    store.put_record(&r2).unwrap();
    store.put_record(&record("u2", 1)).unwrap();

    assert_eq!(store.dirty_records("u1").unwrap().len(), 2);

    let at = Utc::now();
    assert!(store.mark_synced(&r1, at).unwrap());

    let dirty = store.dirty_records("u1").unwrap();
    assert_eq!(dirty, vec![r2]);

    let synced = store.get_record(&r1.id).unwrap().unwrap();
    assert_eq!(synced.synced_at.map(|t| t.timestamp()), Some(at.timestamp()));
    assert_eq!(synced.entry_time, r1.entry_time);
  }

  #[test]
  fn test_mark_synced_skips_changed_row() {
    let store = SqliteStorage::in_memory().unwrap();
    let pushed = record("u1", 1);
    store.put_record(&pushed).unwrap();

    let mut edited = pushed.clone();
    edited.set_times(Some("08:00".into()), Some("17:00".into()));
    store.put_record(&edited).unwrap();

    assert!(!store.mark_synced(&pushed, Utc::now()).unwrap());
    assert!(store.get_record(&pushed.id).unwrap().unwrap().is_dirty());
  }

  #[test]
  fn test_one_record_per_user_per_day() {
    let store = SqliteStorage::in_memory().unwrap();
    let first = record("u1", 5);
    let second = record("u1", 5);
    store.put_record(&first).unwrap();
    store.put_record(&second).unwrap();

    let records = store.records_for_user("u1").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, second.id);

    let date = NaiveDate::from_ymd_opt(2026, 10, 5).unwrap();
    assert_eq!(store.record_for_day("u1", date).unwrap().unwrap().id, second.id);
  }

  #[test]
  fn test_replace_user_records_keeps_dirty_rows() {
    let store = SqliteStorage::in_memory().unwrap();
    let stale = record("u1", 1);
    store.put_record(&stale).unwrap();
    store.mark_synced(&stale, Utc::now()).unwrap();

    let dirty = record("u1", 2);
    store.put_record(&dirty).unwrap();
    let other_user = record("u2", 1);
    store.put_record(&other_user).unwrap();

    let remote_same_day = record("u1", 2);
    let remote_new = record("u1", 3);
    let written = store
      .replace_user_records("u1", &[remote_same_day, remote_new.clone()], Utc::now())
      .unwrap();
    assert_eq!(written, 1);

    let ids: Vec<_> = store
      .records_for_user("u1")
      .unwrap()
      .into_iter()
      .map(|r| r.id)
      .collect();
    assert_eq!(ids, vec![dirty.id, remote_new.id]);
    assert_eq!(store.records_for_user("u2").unwrap().len(), 1);
  }

  #[test]
  fn test_remove_record() {
    let store = SqliteStorage::in_memory().unwrap();
    let r = record("u1", 1);
    store.put_record(&r).unwrap();
    assert!(store.remove_record(&r.id).unwrap());
    assert!(store.get_record(&r.id).unwrap().is_none());
  }

  #[test]
  fn test_file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("local.db");

    let r = record("u1", 1);
    {
      let store = SqliteStorage::open(&path).unwrap();
      store.put(&part("1", "P001")).unwrap();
      store.put_record(&r).unwrap();
    }

    let store = SqliteStorage::open(&path).unwrap();
    assert_eq!(store.load_all::<Part>().unwrap().entities.len(), 1);
    assert_eq!(store.dirty_records("u1").unwrap(), vec![r]);
  }
}

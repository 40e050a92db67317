//! Local store for authentiya.
//!
//! A small key-value store backed by `SQLite`. Each [`StoreKey`] holds one
//! JSON value whose shape is fixed by a [`Record`] or [`ListItem`] type.
//! Values are validated on read: anything that does not deserialize into the
//! expected type is logged and treated as absent.
//!
//! Appending to a list reads the whole list, pushes, and writes it back.
//! There is no locking across processes; the last write wins.

pub mod migrations;
pub mod records;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::capture::EventRecord;
use crate::error::{Error, Result};

pub use records::{
    CanvasDomains, CitationEntry, FieldInfo, KeystrokeLog, ListItem, Record, SessionData, SessionHistoryEntry,
    SessionKey, StoreKey, ToggleEntry, ToggleFlag, ToggleState,
};

/// `SQLite`-backed key-value store.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    conn: Connection,
}

impl Store {
    /// Open or create a store at the given path.
    ///
    /// Creates parent directories as needed and brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created or the
    /// schema cannot be initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening store at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Store opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The raw JSON stored under a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored text is not JSON.
    pub fn get_raw(&self, key: StoreKey) -> Result<Option<Value>> {
        let text: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM records WHERE key = ?1",
                [key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        text.map(|t| serde_json::from_str(&t).map_err(Error::from))
            .transpose()
    }

    fn put_raw(&self, key: StoreKey, value: &Value) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.conn.execute(
            r"
            INSERT INTO records (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            ",
            params![key.as_str(), text, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Load the record stored under `R::KEY`.
    ///
    /// Returns `None` when the key is absent or its value has the wrong shape.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn load<R: Record>(&self) -> Result<Option<R>> {
        let Some(value) = self.raw_or_none(R::KEY)? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(key = %R::KEY, error = %e, "ignoring malformed record");
                Ok(None)
            }
        }
    }

    /// Store a record under `R::KEY`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database operation fails.
    pub fn save<R: Record>(&self, record: &R) -> Result<()> {
        self.put_raw(R::KEY, &serde_json::to_value(record)?)
    }

    /// Load the list stored under `T::KEY`.
    ///
    /// Elements that do not parse are skipped; a value that is not a list
    /// reads as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn load_list<T: ListItem>(&self) -> Result<Vec<T>> {
        match self.raw_or_none(T::KEY)? {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => Ok(items
                .into_iter()
                .enumerate()
                .filter_map(|(i, item)| match serde_json::from_value(item) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!(key = %T::KEY, index = i, error = %e, "skipping malformed list item");
                        None
                    }
                })
                .collect()),
            Some(_) => {
                warn!(key = %T::KEY, "ignoring non-list value");
                Ok(Vec::new())
            }
        }
    }

    /// Replace the list stored under `T::KEY`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database operation fails.
    pub fn save_list<T: ListItem>(&self, items: &[T]) -> Result<()> {
        self.put_raw(T::KEY, &serde_json::to_value(items)?)
    }

    /// Append to the list stored under `T::KEY`, returning its new length.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn append<T: ListItem>(&self, item: T) -> Result<usize> {
        let mut items = self.load_list::<T>()?;
        items.push(item);
        self.save_list(&items)?;
        Ok(items.len())
    }

    /// Append an Event Record to the keystroke log, returning the log length.
    ///
    /// A missing or malformed log is replaced by a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn append_event(&self, record: EventRecord) -> Result<usize> {
        let mut log = self.load::<KeystrokeLog>()?.unwrap_or_default();
        log.data.push(record);
        self.save(&log)?;
        Ok(log.data.len())
    }

    /// Remove the value stored under a key. Returns `true` if one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove(&self, key: StoreKey) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM records WHERE key = ?1", [key.as_str()])?;
        Ok(affected > 0)
    }

    /// Remove several keys, returning how many existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn remove_all(&self, keys: &[StoreKey]) -> Result<usize> {
        let mut removed = 0;
        for key in keys {
            if self.remove(*key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Remove every record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn clear(&self) -> Result<usize> {
        let affected = self.conn.execute("DELETE FROM records", [])?;
        info!("Cleared {} store records", affected);
        Ok(affected)
    }

    /// Statistics about the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StoreStats> {
        let records: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;

        let last: Option<String> = self
            .conn
            .query_row("SELECT MAX(updated_at) FROM records", [], |row| row.get(0))
            .optional()?
            .flatten();
        let last_updated = last
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StoreStats {
            records,
            last_updated,
            schema_version: migrations::schema_version(&self.conn)?,
            db_size_bytes,
        })
    }

    fn raw_or_none(&self, key: StoreKey) -> Result<Option<Value>> {
        match self.get_raw(key) {
            Err(Error::Json(e)) => {
                warn!(key = %key, error = %e, "ignoring value that is not JSON");
                Ok(None)
            }
            other => other,
        }
    }

    #[cfg(test)]
    fn put_text(&self, key: StoreKey, text: &str) {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO records (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key.as_str(), text, Utc::now().to_rfc3339()],
            )
            .unwrap();
    }
}

/// Statistics about the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored keys.
    pub records: i64,
    /// When any key was last written.
    pub last_updated: Option<DateTime<Utc>>,
    /// Schema version of the database.
    pub schema_version: i32,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ClipboardKind, EventKind};

    fn store() -> Store {
        Store::open_in_memory().expect("failed to create test store")
    }

    fn record(key: &str, timestamp: i64) -> EventRecord {
        EventRecord {
            kind: EventKind::KeyDown,
            key: key.to_string(),
            timestamp,
            hostname: "example.com".to_string(),
            element_id: "body".to_string(),
            element_name: String::new(),
        }
    }

    fn toggle(state: ToggleState) -> ToggleEntry {
        ToggleEntry {
            state,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_load_missing() {
        let store = store();
        assert!(store.load::<SessionData>().unwrap().is_none());
        assert!(store.load_list::<ToggleEntry>().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let store = store();
        let data = SessionData {
            session_active: true,
            word_count: 9,
            ..SessionData::default()
        };
        store.save(&data).unwrap();
        assert_eq!(store.load::<SessionData>().unwrap(), Some(data));

        let raw = store.get_raw(StoreKey::SessionData).unwrap().unwrap();
        assert_eq!(raw["wordCount"], 9);
    }

    #[test]
    fn test_malformed_record_reads_as_absent() {
        let store = store();
        store.put_text(StoreKey::SessionData, r#"{"sessionActive": "yes"}"#);
        assert!(store.load::<SessionData>().unwrap().is_none());

        store.put_text(StoreKey::SessionKey, "not json");
        assert!(store.load::<SessionKey>().unwrap().is_none());
    }

    #[test]
    fn test_append_list() {
        let store = store();
        assert_eq!(store.append(toggle(ToggleState::On)).unwrap(), 1);
        assert_eq!(store.append(toggle(ToggleState::Off)).unwrap(), 2);

        let entries = store.load_list::<ToggleEntry>().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].state, ToggleState::On);
        assert_eq!(entries[1].state, ToggleState::Off);
    }

    #[test]
    fn test_list_skips_bad_items() {
        let store = store();
        store.put_text(
            StoreKey::ToggleTrackingData,
            r#"[{"state":"on","timestamp":"2025-01-01T00:00:00Z"},{"state":"up"}]"#,
        );
        assert_eq!(store.load_list::<ToggleEntry>().unwrap().len(), 1);

        store.put_text(StoreKey::ToggleTrackingData, r#"{"state":"on"}"#);
        assert!(store.load_list::<ToggleEntry>().unwrap().is_empty());
    }

    #[test]
    fn test_append_event_keeps_order() {
        let store = store();
        store.append_event(record("a", 1)).unwrap();
        store.append_event(record("a", 2)).unwrap();
        assert_eq!(store.append_event(record("b", 3)).unwrap(), 3);

        let log = store.load::<KeystrokeLog>().unwrap().unwrap();
        let keys: Vec<_> = log.data.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["a", "a", "b"]);
        assert_eq!(log.label.len(), 6);
    }

    #[test]
    fn test_append_event_replaces_malformed_log() {
        let store = store();
        store.put_text(StoreKey::KeystrokeData, "[1, 2, 3]");
        assert_eq!(store.append_event(record("x", 1)).unwrap(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = store();
        store.save(&SessionKey("1".to_string())).unwrap();
        store.save(&ToggleFlag(true)).unwrap();
        store
            .append(CitationEntry {
                kind: ClipboardKind::Paste,
                text: "quote".to_string(),
                timestamp: Utc::now(),
                url: String::new(),
                cited: false,
                content_hash: String::new(),
            })
            .unwrap();

        assert!(store.remove(StoreKey::SessionKey).unwrap());
        assert!(!store.remove(StoreKey::SessionKey).unwrap());
        assert_eq!(
            store
                .remove_all(&[StoreKey::CitationHistory, StoreKey::SessionData])
                .unwrap(),
            1
        );
        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.load::<ToggleFlag>().unwrap().is_none());
    }

    #[test]
    fn test_stats() {
        let store = store();
        let stats = store.stats().unwrap();
        assert_eq!(stats.records, 0);
        assert!(stats.last_updated.is_none());
        assert_eq!(stats.schema_version, migrations::CURRENT_VERSION);

        store.save(&ToggleFlag(false)).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.records, 1);
        assert!(stats.last_updated.is_some());
    }

    #[test]
    fn test_open_file_backed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");
        {
            let store = Store::open(&path).unwrap();
            store.save(&SessionKey("42".to_string())).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.path(), path);
        assert_eq!(
            store.load::<SessionKey>().unwrap(),
            Some(SessionKey("42".to_string()))
        );
        assert!(store.stats().unwrap().db_size_bytes > 0);
    }
}

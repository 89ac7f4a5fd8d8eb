//! SQLite-backed log of analyzed images.

use anyhow::{anyhow, bail, Context, Result};
use chrono::Local;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::mood::Mood;

/// Timestamp layout of `created_at`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS mood_logs (
    record_id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL,
    mood_label TEXT NOT NULL,
    confidence_score REAL NOT NULL,
    image_blob BLOB NOT NULL,
    created_at TEXT NOT NULL
)";

const SELECT_COLUMNS: &str =
    "SELECT record_id, filename, mood_label, confidence_score, image_blob, created_at FROM mood_logs";

/// One analysis event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodRecord {
    pub record_id: i64,
    pub filename: String,
    pub mood: Mood,
    pub confidence: f32,
    #[serde(skip)]
    pub image: Vec<u8>,
    pub created_at: String,
}

/// Current local time formatted for `created_at`
pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

fn row_to_record(row: &Row) -> Result<MoodRecord> {
    let label: String = row.get("mood_label")?;
    let mood = Mood::from_str(&label)
        .map_err(|_| anyhow!("Unknown mood label '{}' in mood_logs", label))?;
    let confidence: f64 = row.get("confidence_score")?;

    Ok(MoodRecord {
        record_id: row.get("record_id")?,
        filename: row.get("filename")?,
        mood,
        confidence: confidence as f32,
        image: row.get("image_blob")?,
        created_at: row.get("created_at")?,
    })
}

/// The record store: one connection, serialized behind a mutex
pub struct MoodStore {
    conn: Mutex<Connection>,
}

impl MoodStore {
    /// Open (creating if needed) the database file and its table
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database directory {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("failed to open SQLite database {}", path.display()))?;
        log::debug!("Opened mood database {}", path.display());
        Self::with_connection(conn)
    }

    /// Store that lives only as long as the process
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("database connection lock poisoned"))
    }

    /// Create the table if it does not exist; safe to call repeatedly
    pub fn initialize(&self) -> Result<()> {
        self.lock()?
            .execute(CREATE_TABLE, [])
            .context("failed to create mood_logs table")?;
        Ok(())
    }

    /// Insert a record stamped with the current time
    pub fn insert(&self, filename: &str, mood: Mood, confidence: f32, image: &[u8]) -> Result<i64> {
        self.insert_at(filename, mood, confidence, image, &now_timestamp())
    }

    /// Insert a record with an explicit timestamp, returning its id
    pub fn insert_at(
        &self,
        filename: &str,
        mood: Mood,
        confidence: f32,
        image: &[u8],
        created_at: &str,
    ) -> Result<i64> {
        if !(0.0..=1.0).contains(&confidence) {
            bail!("confidence {} is outside [0, 1]", confidence);
        }

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO mood_logs (filename, mood_label, confidence_score, image_blob, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![filename, mood.as_str(), confidence as f64, image, created_at],
        )
        .with_context(|| format!("failed to insert record for {}", filename))?;

        let record_id = conn.last_insert_rowid();
        log::debug!("Stored {} as record {} ({})", filename, record_id, mood);
        Ok(record_id)
    }

    /// Every record, newest first
    pub fn list_all(&self) -> Result<Vec<MoodRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY record_id DESC", SELECT_COLUMNS))?;
        let mut rows = stmt.query([])?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_record(row)?);
        }
        Ok(records)
    }

    pub fn get(&self, record_id: i64) -> Result<Option<MoodRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{} WHERE record_id = ?1", SELECT_COLUMNS))?;
        let mut rows = stmt.query(params![record_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_record(row)?)),
            None => Ok(None),
        }
    }

    /// Delete one record. Returns `false` when no such record exists.
    pub fn delete(&self, record_id: i64) -> Result<bool> {
        let deleted = self
            .lock()?
            .execute("DELETE FROM mood_logs WHERE record_id = ?1", params![record_id])
            .with_context(|| format!("failed to delete record {}", record_id))?;
        Ok(deleted > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let count: Option<i64> = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM mood_logs", [], |row| row.get(0))
            .optional()?;
        Ok(count.unwrap_or(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_db_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("moodvision-test-{}", uuid::Uuid::new_v4()))
            .join("mood_records.db")
    }

    #[test]
    fn test_insert_then_list_returns_record() {
        let store = MoodStore::open_in_memory().unwrap();
        let id = store
            .insert_at("cat.jpg", Mood::Happy, 0.87, b"<bytes>", "2024-01-01 10:00:00")
            .unwrap();
        assert_eq!(id, 1);

        let records = store.list_all().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.record_id, 1);
        assert_eq!(record.filename, "cat.jpg");
        assert_eq!(record.mood, Mood::Happy);
        assert!((record.confidence - 0.87).abs() < 1e-6);
        assert_eq!(record.image, b"<bytes>".to_vec());
        assert_eq!(record.created_at, "2024-01-01 10:00:00");
    }

    #[test]
    fn test_list_is_newest_first() {
        let store = MoodStore::open_in_memory().unwrap();
        store.insert("a.jpg", Mood::Sad, 0.5, b"a").unwrap();
        store.insert("b.jpg", Mood::Fear, 0.6, b"b").unwrap();
        store.insert("c.jpg", Mood::Neutral, 0.7, b"c").unwrap();

        let names: Vec<String> = store
            .list_all()
            .unwrap()
            .into_iter()
            .map(|r| r.filename)
            .collect();
        assert_eq!(names, vec!["c.jpg", "b.jpg", "a.jpg"]);
    }

    #[test]
    fn test_insert_uses_current_timestamp() {
        let store = MoodStore::open_in_memory().unwrap();
        let id = store.insert("x.png", Mood::Angry, 0.4, b"x").unwrap();
        let record = store.get(id).unwrap().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(&record.created_at, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        let store = MoodStore::open_in_memory().unwrap();
        assert!(store.insert("x.png", Mood::Angry, 1.5, b"x").is_err());
        assert!(store.insert("x.png", Mood::Angry, -0.1, b"x").is_err());
        assert!(store.insert("x.png", Mood::Angry, f32::NAN, b"x").is_err());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let path = temp_db_path();
        {
            let store = MoodStore::open(&path).unwrap();
            store.insert("keep.jpg", Mood::Happy, 0.9, b"k").unwrap();
            store.initialize().unwrap();
            store.initialize().unwrap();
        }

        let reopened = MoodStore::open(&path).unwrap();
        assert_eq!(reopened.count().unwrap(), 1);
        assert_eq!(reopened.list_all().unwrap()[0].filename, "keep.jpg");

        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_delete_removes_exactly_one_row() {
        let store = MoodStore::open_in_memory().unwrap();
        let first = store.insert("1.jpg", Mood::Happy, 0.9, b"1").unwrap();
        let second = store.insert("2.jpg", Mood::Sad, 0.8, b"2").unwrap();

        assert!(store.delete(first).unwrap());
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.get(first).unwrap().is_none());
        assert!(store.get(second).unwrap().is_some());

        // Second delete of the same id is a no-op
        assert!(!store.delete(first).unwrap());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_delete_on_empty_store() {
        let store = MoodStore::open_in_memory().unwrap();
        assert!(!store.delete(1).unwrap());
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_ids_are_not_reused_after_delete() {
        let store = MoodStore::open_in_memory().unwrap();
        let first = store.insert("1.jpg", Mood::Happy, 0.9, b"1").unwrap();
        store.delete(first).unwrap();
        let second = store.insert("2.jpg", Mood::Happy, 0.9, b"2").unwrap();
        assert!(second > first);
    }
}

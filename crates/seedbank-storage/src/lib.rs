//! Durable UI preferences.
//!
//! Values are stored as JSON text keyed by a stable preference name. Reads
//! that fail for any reason fall back to the caller's default; writes that
//! fail are logged and otherwise ignored, leaving the in-memory value in
//! charge for the rest of the session.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Raw key → JSON text storage.
pub trait PreferenceBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&mut self, key: &str, json: &str) -> Result<(), StorageError>;
    fn label(&self) -> &'static str;
}

impl<B: PreferenceBackend + ?Sized> PreferenceBackend for Box<B> {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, json: &str) -> Result<(), StorageError> {
        (**self).write(key, json)
    }

    fn label(&self) -> &'static str {
        (**self).label()
    }
}

pub struct PreferenceStore<B> {
    backend: B,
}

impl<B: PreferenceBackend> PreferenceStore<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let raw = match self.backend.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return default,
            Err(err) => {
                warn!(event = "preference_read_failed", key, backend = self.backend.label(), error = %err);
                return default;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(event = "preference_decode_failed", key, error = %err);
                default
            }
        }
    }

    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(err) => {
                warn!(event = "preference_encode_failed", key, error = %err);
                return;
            }
        };
        if let Err(err) = self.backend.write(key, &json) {
            warn!(event = "preference_write_failed", key, backend = self.backend.label(), error = %err);
        }
    }
}

/// A preference rehydrated once and then owned in memory.
#[derive(Debug, Clone)]
pub struct Persistent<T> {
    key: &'static str,
    value: T,
}

impl<T> Persistent<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn load<B: PreferenceBackend>(store: &PreferenceStore<B>, key: &'static str, default: T) -> Self {
        let value = store.get(key, default);
        Self { key, value }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn set<B: PreferenceBackend>(&mut self, store: &mut PreferenceStore<B>, value: T) {
        self.value = value;
        store.set(self.key, &self.value);
    }

    pub fn update<B: PreferenceBackend>(&mut self, store: &mut PreferenceStore<B>, f: impl FnOnce(&mut T)) {
        f(&mut self.value);
        store.set(self.key, &self.value);
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: BTreeMap<String, String>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, key: &str, json: &str) -> Self {
        self.entries.insert(key.to_string(), json.to_string());
        self
    }
}

impl PreferenceBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, json: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), json.to_string());
        Ok(())
    }

    fn label(&self) -> &'static str {
        "memory"
    }
}

/// All preferences in one JSON object file, rewritten atomically per change.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileBackend {
    /// A missing or unreadable file starts empty; it is only replaced on the
    /// next write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(event = "preference_file_corrupt", path = %path.display(), error = %err);
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => {
                warn!(event = "preference_file_unreadable", path = %path.display(), error = %err);
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }
}

impl PreferenceBackend for JsonFileBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, json: &str) -> Result<(), StorageError> {
        let mut next = self.entries.clone();
        next.insert(key.to_string(), json.to_string());
        let payload = serde_json::to_string_pretty(&next)?;
        write_atomic(&self.path, &payload)?;
        self.entries = next;
        Ok(())
    }

    fn label(&self) -> &'static str {
        "file"
    }
}

pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        let backend = Self { conn };
        backend.migrate()?;
        Ok(backend)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let backend = Self { conn };
        backend.migrate()?;
        Ok(backend)
    }

    fn migrate(&self) -> Result<(), StorageError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )?;
        Ok(())
    }
}

impl PreferenceBackend for SqliteBackend {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn write(&mut self, key: &str, json: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn label(&self) -> &'static str {
        "sqlite"
    }
}

fn write_atomic(path: &Path, payload: &str) -> Result<(), StorageError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| StorageError::Io { path, source }
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let temp_path = match path.file_name() {
        Some(name) => path.with_file_name(format!("{}.tmp", name.to_string_lossy())),
        None => path.with_extension("tmp"),
    };

    std::fs::write(&temp_path, payload).map_err(io_err(&temp_path))?;
    std::fs::rename(&temp_path, path).map_err(io_err(path))?;
    Ok(())
}

//! The read-timestamp table: when did this client last read a key from the network.
//!
//! Values are stored as epoch milliseconds keyed by the logical path (or synthetic key such as
//! `allProfile`) they were recorded for. The file backend keeps them across process restarts.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::firestore::error::{internal_error, FirestoreResult};
use crate::firestore::model::Timestamp;

/// Durable key → timestamp table consulted by the cache policy.
#[async_trait]
pub trait ReadTimestampStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> FirestoreResult<Option<Timestamp>>;
    async fn set(&self, key: &str, timestamp: Timestamp) -> FirestoreResult<()>;
    /// Forgets the entry for `key`; missing keys are not an error.
    async fn reset(&self, key: &str) -> FirestoreResult<()>;
}

pub type ReadTimestampStoreArc = Arc<dyn ReadTimestampStore>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ReadTimestampRecord {
    #[serde(default)]
    entries: BTreeMap<String, i64>,
}

impl ReadTimestampRecord {
    fn get(&self, key: &str) -> Option<Timestamp> {
        self.entries.get(key).copied().map(Timestamp::from_millis)
    }
}

/// Process-local table; forgotten on restart.
#[derive(Default)]
pub struct InMemoryReadTimestampStore {
    inner: Mutex<ReadTimestampRecord>,
}

impl InMemoryReadTimestampStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadTimestampStore for InMemoryReadTimestampStore {
    async fn get(&self, key: &str) -> FirestoreResult<Option<Timestamp>> {
        Ok(self.inner.lock().unwrap().get(key))
    }

    async fn set(&self, key: &str, timestamp: Timestamp) -> FirestoreResult<()> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .insert(key.to_string(), timestamp.to_millis());
        Ok(())
    }

    async fn reset(&self, key: &str) -> FirestoreResult<()> {
        self.inner.lock().unwrap().entries.remove(key);
        Ok(())
    }
}

/// JSON file backed table laid out as `{"entries": {"<key>": <epoch millis>}}`.
///
/// The whole table is rewritten on every change.
pub struct FileReadTimestampStore {
    path: PathBuf,
    inner: Mutex<ReadTimestampRecord>,
}

impl FileReadTimestampStore {
    /// Opens the table at `path`, loading existing entries when the file exists.
    pub fn new(path: PathBuf) -> FirestoreResult<Self> {
        let record = if path.exists() {
            Self::load_record(&path)?
        } else {
            ReadTimestampRecord::default()
        };
        Ok(Self {
            path,
            inner: Mutex::new(record),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn load_record(path: &PathBuf) -> FirestoreResult<ReadTimestampRecord> {
        let data =
            fs::read(path).map_err(|err| internal_error(format!("failed to read timestamp file: {err}")))?;
        serde_json::from_slice(&data)
            .map_err(|err| internal_error(format!("failed to parse timestamp file as JSON: {err}")))
    }

    fn persist(&self, record: &ReadTimestampRecord) -> FirestoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| internal_error(format!("failed to create timestamp directory: {err}")))?;
        }
        let serialized = serde_json::to_vec_pretty(record)
            .map_err(|err| internal_error(format!("failed to serialize timestamp table: {err}")))?;
        fs::write(&self.path, serialized)
            .map_err(|err| internal_error(format!("failed to write timestamp file: {err}")))?;
        Ok(())
    }
}

#[async_trait]
impl ReadTimestampStore for FileReadTimestampStore {
    async fn get(&self, key: &str) -> FirestoreResult<Option<Timestamp>> {
        Ok(self.inner.lock().unwrap().get(key))
    }

    async fn set(&self, key: &str, timestamp: Timestamp) -> FirestoreResult<()> {
        let mut record = self.inner.lock().unwrap();
        record.entries.insert(key.to_string(), timestamp.to_millis());
        self.persist(&record)
    }

    async fn reset(&self, key: &str) -> FirestoreResult<()> {
        let mut record = self.inner.lock().unwrap();
        if record.entries.remove(key).is_some() {
            self.persist(&record)?;
        }
        Ok(())
    }
}

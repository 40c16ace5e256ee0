// LogSift - platform/json_store.rs
//
// File-backed document store used by the CLI. Documents live in memory
// while a command runs and are persisted as one JSON snapshot afterwards.
//
// - The snapshot is written atomically (temp file, then rename) so an
//   interrupted save never corrupts the previous snapshot.
// - A missing snapshot is a fresh, empty store.
// - A malformed snapshot is an error: silently starting empty would re-parse
//   every file and lose every checkpoint.

use crate::core::memory_store::{Indices, MemoryStore};
use crate::core::model::LogLine;
use crate::core::store::{BulkAction, BulkResponse, DocumentStore, LineQuery, TermFilter};
use crate::util::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Bump when the snapshot layout changes incompatibly.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(default)]
    indices: Indices,
}

pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonFileStore {
    /// Open the snapshot at `path`, or start empty if it does not exist.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No store snapshot; starting empty");
                return Ok(Self {
                    path: path.to_path_buf(),
                    inner: MemoryStore::new(),
                });
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let snapshot: Snapshot =
            serde_json::from_str(&content).map_err(|e| StoreError::Serialization {
                path: path.to_path_buf(),
                source: e,
            })?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::UnsupportedSnapshot {
                path: path.to_path_buf(),
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }

        tracing::info!(
            path = %path.display(),
            indices = snapshot.indices.len(),
            "Store snapshot loaded"
        );
        Ok(Self {
            path: path.to_path_buf(),
            inner: MemoryStore::from_indices(snapshot.indices),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the current contents atomically.
    pub fn save(&self) -> Result<(), StoreError> {
        let io_err = |path: &Path, source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
            }
        }

        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            indices: self.inner.snapshot(),
        };
        let json = serde_json::to_string(&snapshot).map_err(|e| StoreError::Serialization {
            path: self.path.clone(),
            source: e,
        })?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json.as_bytes()).map_err(|e| io_err(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            io_err(&self.path, e)
        })?;

        tracing::debug!(path = %self.path.display(), bytes = json.len(), "Store snapshot saved");
        Ok(())
    }
}

impl DocumentStore for JsonFileStore {
    fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping()
    }

    fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        self.inner.index_exists(index)
    }

    fn create_index(&self, index: &str) -> Result<(), StoreError> {
        self.inner.create_index(index)
    }

    fn delete_index(&self, index: &str) -> Result<bool, StoreError> {
        self.inner.delete_index(index)
    }

    fn get(&self, index: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(index, id)
    }

    fn upsert(&self, index: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        self.inner.upsert(index, id, doc)
    }

    fn delete(&self, index: &str, id: &str) -> Result<bool, StoreError> {
        self.inner.delete(index, id)
    }

    fn bulk(&self, actions: Vec<BulkAction>) -> Result<BulkResponse, StoreError> {
        self.inner.bulk(actions)
    }

    fn scan_lines(&self, index: &str, query: &LineQuery) -> Result<Vec<LogLine>, StoreError> {
        self.inner.scan_lines(index, query)
    }

    fn distinct_values(
        &self,
        index: &str,
        field: &str,
        filter: &TermFilter,
    ) -> Result<Vec<String>, StoreError> {
        self.inner.distinct_values(index, field, filter)
    }

    fn search(&self, index: &str, filter: &TermFilter) -> Result<Vec<(String, Value)>, StoreError> {
        self.inner.search(index, filter)
    }
}

// LogSift - core/memory_store.rs
//
// In-memory `DocumentStore`. Used by the file-backed store, by tests, and by
// embedders that want the pipeline without a search cluster.
//
// Failure injection hooks let tests exercise write errors, scan errors and
// an unreachable store without a real backend.

use crate::core::model::LogLine;
use crate::core::store::{
    fields, line_from_document, BulkAction, BulkItemFailure, BulkResponse, DocumentStore,
    LineQuery, TermFilter,
};
use crate::util::error::StoreError;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Index name -> (document id -> document).
pub type Indices = BTreeMap<String, BTreeMap<String, Value>>;

/// Line documents of one index ordered by (file id, line number) -> doc id.
type LineKeys = BTreeMap<(String, u64), String>;

/// Documents plus the ordered line view `scan_lines` pages through.
#[derive(Debug, Default)]
struct State {
    docs: Indices,
    lines: BTreeMap<String, LineKeys>,
}

fn line_key(doc: &Value) -> Option<(String, u64)> {
    let file_id = doc.get(fields::LOG_FILE_ID)?.as_str()?;
    let line_number = doc.get(fields::LINE_NUMBER)?.as_u64()?;
    Some((file_id.to_string(), line_number))
}

impl State {
    fn from_docs(docs: Indices) -> Self {
        let mut lines: BTreeMap<String, LineKeys> = BTreeMap::new();
        for (index, index_docs) in &docs {
            let keys = lines.entry(index.clone()).or_default();
            for (id, doc) in index_docs {
                if let Some(key) = line_key(doc) {
                    keys.insert(key, id.clone());
                }
            }
        }
        Self { docs, lines }
    }

    fn create_index(&mut self, index: &str) {
        self.docs.entry(index.to_string()).or_default();
    }

    fn remove_index(&mut self, index: &str) -> bool {
        self.lines.remove(index);
        self.docs.remove(index).is_some()
    }

    fn insert(&mut self, index: String, id: String, doc: Value) {
        let new_key = line_key(&doc);
        let previous = self
            .docs
            .entry(index.clone())
            .or_default()
            .insert(id.clone(), doc);
        let keys = self.lines.entry(index).or_default();
        if let Some(old_key) = previous.as_ref().and_then(line_key) {
            if keys.get(&old_key) == Some(&id) {
                keys.remove(&old_key);
            }
        }
        if let Some(key) = new_key {
            keys.insert(key, id);
        }
    }

    fn remove(&mut self, index: &str, id: &str) -> bool {
        let Some(previous) = self.docs.get_mut(index).and_then(|docs| docs.remove(id)) else {
            return false;
        };
        if let (Some(key), Some(keys)) = (line_key(&previous), self.lines.get_mut(index)) {
            if keys.get(&key).map(String::as_str) == Some(id) {
                keys.remove(&key);
            }
        }
        true
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
    failing_writes: RwLock<HashSet<String>>,
    failing_scans: RwLock<HashSet<String>>,
    /// Bulk requests numbered at or above this (1-based) fail outright.
    failing_bulk_from: RwLock<Option<usize>>,
    bulk_requests: AtomicUsize,
    documents_written: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated from a snapshot.
    pub fn from_indices(indices: Indices) -> Self {
        Self {
            state: RwLock::new(State::from_docs(indices)),
            ..Self::default()
        }
    }

    /// Copy of every index, for persistence.
    pub fn snapshot(&self) -> Indices {
        self.read().docs.clone()
    }

    /// Simulate an unreachable backend: every call fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make bulk index operations for `id` fail (any index).
    pub fn fail_writes_for(&self, id: &str) {
        self.failing_writes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string());
    }

    /// Make `scan_lines` fail for one file id.
    pub fn fail_scans_for(&self, file_id: &str) {
        self.failing_scans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file_id.to_string());
    }

    /// Make the `nth` bulk request from now (1-based) and every later one
    /// fail as a whole, as a dropped connection would.
    pub fn fail_bulk_requests_from(&self, nth: usize) {
        let base = self.bulk_requests.load(Ordering::SeqCst);
        *self
            .failing_bulk_from
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(base + nth);
    }

    pub fn clear_failures(&self) {
        *self
            .failing_bulk_from
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
        self.failing_writes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.failing_scans
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of documents successfully created or replaced so far.
    pub fn documents_written(&self) -> usize {
        self.documents_written.load(Ordering::SeqCst)
    }

    /// Number of documents in `index` (0 if absent).
    pub fn count(&self, index: &str) -> usize {
        self.read().docs.get(index).map_or(0, BTreeMap::len)
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "store marked unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn write_fails(&self, id: &str) -> bool {
        self.failing_writes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }
}

impl DocumentStore for MemoryStore {
    fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    fn index_exists(&self, index: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.read().docs.contains_key(index))
    }

    fn create_index(&self, index: &str) -> Result<(), StoreError> {
        self.check_available()?;
        self.write().create_index(index);
        Ok(())
    }

    fn delete_index(&self, index: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.write().remove_index(index))
    }

    fn get(&self, index: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.check_available()?;
        Ok(self
            .read()
            .docs
            .get(index)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    fn upsert(&self, index: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        self.check_available()?;
        self.write()
            .insert(index.to_string(), id.to_string(), doc);
        self.documents_written.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, index: &str, id: &str) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.write().remove(index, id))
    }

    fn bulk(&self, actions: Vec<BulkAction>) -> Result<BulkResponse, StoreError> {
        self.check_available()?;
        let request = self.bulk_requests.fetch_add(1, Ordering::SeqCst) + 1;
        let failing_from = *self
            .failing_bulk_from
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if failing_from.is_some_and(|from| request >= from) {
            return Err(StoreError::Unavailable {
                reason: format!("injected failure of bulk request {request}"),
            });
        }
        let mut response = BulkResponse::default();
        let mut state = self.write();

        for action in actions {
            match action {
                BulkAction::Index { index, id, body } => {
                    if self.write_fails(&id) {
                        response.failures.push(BulkItemFailure {
                            index,
                            id,
                            reason: "injected write failure".to_string(),
                        });
                        continue;
                    }
                    if !body.is_object() {
                        response.failures.push(BulkItemFailure {
                            index,
                            id,
                            reason: "document body must be an object".to_string(),
                        });
                        continue;
                    }
                    state.insert(index, id, body);
                    self.documents_written.fetch_add(1, Ordering::SeqCst);
                    response.succeeded += 1;
                }
                BulkAction::Delete { index, id } => {
                    state.remove(&index, &id);
                    response.succeeded += 1;
                }
            }
        }
        Ok(response)
    }

    /// A page is a range read over the ordered line view, so a full keyset
    /// scan costs one lookup per returned line.
    fn scan_lines(&self, index: &str, query: &LineQuery) -> Result<Vec<LogLine>, StoreError> {
        self.check_available()?;
        if self
            .failing_scans
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&query.file_id)
        {
            return Err(StoreError::Unavailable {
                reason: format!("injected scan failure for '{}'", query.file_id),
            });
        }

        let state = self.read();
        let docs = state.docs.get(index).ok_or_else(|| StoreError::IndexNotFound {
            index: index.to_string(),
        })?;

        let first = query.after_line.saturating_add(1);
        let last = query.up_to.unwrap_or(u64::MAX);
        let Some(keys) = state.lines.get(index) else {
            return Ok(Vec::new());
        };
        if first > last || query.after_line == u64::MAX {
            return Ok(Vec::new());
        }

        let range = (query.file_id.clone(), first)..=(query.file_id.clone(), last);
        let mut lines = Vec::with_capacity(query.limit.min(keys.len()));
        for (_, id) in keys.range(range).take(query.limit) {
            if let Some(doc) = docs.get(id) {
                lines.push(line_from_document(index, id, doc)?);
            }
        }
        Ok(lines)
    }

    fn distinct_values(
        &self,
        index: &str,
        field: &str,
        filter: &TermFilter,
    ) -> Result<Vec<String>, StoreError> {
        self.check_available()?;
        let state = self.read();
        let Some(docs) = state.docs.get(index) else {
            return Ok(Vec::new());
        };
        let values: BTreeSet<String> = docs
            .values()
            .filter(|doc| filter.matches(doc))
            .filter_map(|doc| doc.get(field).and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        Ok(values.into_iter().collect())
    }

    fn search(&self, index: &str, filter: &TermFilter) -> Result<Vec<(String, Value)>, StoreError> {
        self.check_available()?;
        let state = self.read();
        let Some(docs) = state.docs.get(index) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect())
    }
}

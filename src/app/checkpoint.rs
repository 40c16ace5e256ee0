// LogSift - app/checkpoint.rs
//
// Checkpoint Store: one document per log file recording how far parsing
// has progressed, plus read access to the collector's per-file totals.

use crate::core::model::{CheckpointStatus, ParseCheckpoint};
use crate::core::store::{delete_docs, fields, DocumentStore, TermFilter};
use crate::util::error::StoreError;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;

fn sort_key(cp: &ParseCheckpoint) -> (&str, &str, &str) {
    (
        cp.group_name.as_str(),
        cp.log_file_relative_path.as_str(),
        cp.log_file_id.as_str(),
    )
}

pub struct CheckpointStore {
    store: Arc<dyn DocumentStore>,
    index: String,
    collector_index: String,
}

impl CheckpointStore {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: impl Into<String>,
        collector_index: impl Into<String>,
    ) -> Self {
        Self {
            store,
            index: index.into(),
            collector_index: collector_index.into(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Create the checkpoint index if it does not exist.
    pub fn ensure_index(&self) -> Result<(), StoreError> {
        if !self.store.index_exists(&self.index)? {
            tracing::info!(index = %self.index, "Creating checkpoint index");
            self.store.create_index(&self.index)?;
        }
        Ok(())
    }

    /// Checkpoint for `file_id`, or zero defaults when none is stored.
    pub fn get_checkpoint(&self, file_id: &str) -> Result<ParseCheckpoint, StoreError> {
        match self.store.get(&self.index, file_id)? {
            Some(doc) => self.decode(file_id, doc),
            None => Ok(ParseCheckpoint {
                log_file_id: file_id.to_string(),
                ..ParseCheckpoint::default()
            }),
        }
    }

    /// Last line number the collector confirmed for `file_id` (0 when unknown).
    pub fn get_collector_total_lines(&self, file_id: &str) -> Result<u64, StoreError> {
        let total = self
            .store
            .get(&self.collector_index, file_id)?
            .and_then(|doc| doc.get(fields::LAST_LINE_NUMBER).and_then(Value::as_u64))
            .unwrap_or(0);
        Ok(total)
    }

    /// Upsert the checkpoint for `file_id`, stamped with the current time.
    pub fn save_checkpoint(
        &self,
        file_id: &str,
        group_name: &str,
        relative_path: &str,
        last_line_parsed: u64,
        last_total_lines: u64,
        status: CheckpointStatus,
    ) -> Result<ParseCheckpoint, StoreError> {
        let checkpoint = ParseCheckpoint {
            log_file_id: file_id.to_string(),
            group_name: group_name.to_string(),
            log_file_relative_path: relative_path.to_string(),
            last_line_number_parsed: last_line_parsed,
            last_total_lines_by_collector: last_total_lines,
            last_parse_timestamp: Some(Utc::now()),
            last_parse_status: status,
        };
        let doc = serde_json::to_value(&checkpoint).map_err(|e| StoreError::InvalidDocument {
            index: self.index.clone(),
            id: file_id.to_string(),
            reason: e.to_string(),
        })?;
        self.store.upsert(&self.index, file_id, doc)?;
        tracing::debug!(
            file_id,
            group = group_name,
            last_line_parsed,
            status = %status,
            "Checkpoint saved"
        );
        Ok(checkpoint)
    }

    /// Best-effort delete. Returns `(deleted, failed)`.
    pub fn delete_checkpoints(&self, file_ids: &[String]) -> (usize, usize) {
        let (ok, failed) = delete_docs(self.store.as_ref(), &self.index, file_ids);
        if failed > 0 {
            tracing::warn!(deleted = ok, failed, "Some checkpoints could not be deleted");
        }
        (ok, failed)
    }

    /// File ids that have a checkpoint for `group_name`.
    pub fn file_ids_for_group(&self, group_name: &str) -> Result<Vec<String>, StoreError> {
        self.store.distinct_values(
            &self.index,
            fields::LOG_FILE_ID,
            &TermFilter::new().term(fields::GROUP_NAME, group_name),
        )
    }

    /// Every stored checkpoint, sorted by group then path.
    ///
    /// Documents that fail to decode are logged and skipped.
    pub fn list(&self) -> Result<Vec<ParseCheckpoint>, StoreError> {
        let mut out = Vec::new();
        for (id, doc) in self.store.search(&self.index, &TermFilter::new())? {
            match self.decode(&id, doc) {
                Ok(cp) => out.push(cp),
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable checkpoint"),
            }
        }
        out.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        Ok(out)
    }

    fn decode(&self, id: &str, doc: Value) -> Result<ParseCheckpoint, StoreError> {
        serde_json::from_value(doc).map_err(|e| StoreError::InvalidDocument {
            index: self.index.clone(),
            id: id.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory_store::MemoryStore;
    use serde_json::json;

    fn setup() -> (Arc<MemoryStore>, CheckpointStore) {
        let mem = Arc::new(MemoryStore::new());
        let cps = CheckpointStore::new(mem.clone(), "cp", "collector");
        (mem, cps)
    }

    #[test]
    fn test_absent_checkpoint_defaults_to_zero() {
        let (_, cps) = setup();
        let cp = cps.get_checkpoint("f1").unwrap();
        assert_eq!(cp.log_file_id, "f1");
        assert_eq!(cp.last_line_number_parsed, 0);
        assert_eq!(cp.last_parse_status, CheckpointStatus::NeverParsed);
        assert_eq!(cps.get_collector_total_lines("f1").unwrap(), 0);
    }

    #[test]
    fn test_save_then_get_overwrites() {
        let (_, cps) = setup();
        cps.save_checkpoint("f1", "web", "a.log", 3, 3, CheckpointStatus::CompletedNewData)
            .unwrap();
        cps.save_checkpoint("f1", "web", "a.log", 5, 5, CheckpointStatus::CompletedNewData)
            .unwrap();
        let cp = cps.get_checkpoint("f1").unwrap();
        assert_eq!(cp.last_line_number_parsed, 5);
        assert!(cp.last_parse_timestamp.is_some());
    }

    #[test]
    fn test_collector_total() {
        let (mem, cps) = setup();
        mem.upsert("collector", "f1", json!({ "log_file_id": "f1", "last_line_number": 42 }))
            .unwrap();
        assert_eq!(cps.get_collector_total_lines("f1").unwrap(), 42);
    }

    #[test]
    fn test_list_sorted_and_delete() {
        let (_, cps) = setup();
        cps.save_checkpoint("f2", "web", "b.log", 1, 1, CheckpointStatus::CompletedNewData)
            .unwrap();
        cps.save_checkpoint("f1", "web", "a.log", 1, 1, CheckpointStatus::CompletedNewData)
            .unwrap();
        cps.save_checkpoint("f3", "app", "z.log", 1, 1, CheckpointStatus::CompletedNewData)
            .unwrap();

        let ids: Vec<String> = cps.list().unwrap().into_iter().map(|c| c.log_file_id).collect();
        assert_eq!(ids, vec!["f3", "f1", "f2"]);
        assert_eq!(cps.file_ids_for_group("web").unwrap(), vec!["f1", "f2"]);

        let (ok, failed) = cps.delete_checkpoints(&["f1".to_string(), "f2".to_string()]);
        assert_eq!((ok, failed), (2, 0));
        assert_eq!(cps.list().unwrap().len(), 1);
    }

    #[test]
    fn test_store_outage_is_an_error() {
        let (mem, cps) = setup();
        mem.set_unavailable(true);
        assert!(cps.get_checkpoint("f1").is_err());
        assert_eq!(cps.delete_checkpoints(&["f1".to_string()]), (0, 1));
    }
}

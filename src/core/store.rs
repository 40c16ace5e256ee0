// LogSift - core/store.rs
//
// Document store abstraction. The pipeline only ever talks to a
// `DocumentStore`; engines (in-memory, JSON snapshot, a search cluster) live
// behind this trait.
//
// Layout of the documents the pipeline reads:
//   source lines      id `{file_id}_{line}`  log_file_id, line_number, content,
//                                            log_file_relative_path, group_name
//   collector status  id `{file_id}`         log_file_id, group_name,
//                                            log_file_relative_path, last_line_number
//   groups            id `{group_name}`      group_name, [source|parsed|unparsed]_index

use crate::core::model::{record_id, LogLine};
use crate::util::error::StoreError;
use serde_json::{Map, Value};

/// Field names shared by the source, collector and group documents.
pub mod fields {
    pub const LOG_FILE_ID: &str = "log_file_id";
    pub const LINE_NUMBER: &str = "line_number";
    pub const CONTENT: &str = "content";
    pub const RELATIVE_PATH: &str = "log_file_relative_path";
    pub const GROUP_NAME: &str = "group_name";
    pub const LAST_LINE_NUMBER: &str = "last_line_number";
    pub const LAST_BYTE_OFFSET: &str = "last_byte_offset";
    pub const SOURCE_INDEX: &str = "source_index";
    pub const PARSED_INDEX: &str = "parsed_index";
    pub const UNPARSED_INDEX: &str = "unparsed_index";
}

// =============================================================================
// Requests and responses
// =============================================================================

/// One operation in a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    /// Create or replace `id` in `index` with `body`.
    Index {
        index: String,
        id: String,
        body: Value,
    },
    /// Remove `id` from `index`. Removing an absent document succeeds.
    Delete { index: String, id: String },
}

impl BulkAction {
    pub fn index(&self) -> &str {
        match self {
            Self::Index { index, .. } | Self::Delete { index, .. } => index,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Index { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

/// A single rejected item of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemFailure {
    pub index: String,
    pub id: String,
    pub reason: String,
}

/// Outcome of a bulk request. Items fail independently.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    pub succeeded: usize,
    pub failures: Vec<BulkItemFailure>,
}

/// One page of a keyset-paginated line scan.
///
/// Returns lines of `file_id` with `after_line < line_number <= up_to`,
/// ascending by line number, at most `limit` of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineQuery {
    pub file_id: String,
    pub after_line: u64,
    pub up_to: Option<u64>,
    pub limit: usize,
}

impl LineQuery {
    /// Whether a line number falls inside this query's window.
    pub fn contains(&self, line_number: u64) -> bool {
        line_number > self.after_line && self.up_to.map_or(true, |max| line_number <= max)
    }
}

/// Conjunction of exact-match terms over top-level document fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TermFilter {
    terms: Vec<(String, Value)>,
}

impl TermFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn term(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.terms.push((field.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.terms
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }
}

// =============================================================================
// Trait
// =============================================================================

/// Storage primitives the pipeline needs.
///
/// Reads of a missing index return `Ok(None)` / empty results, except
/// `scan_lines`, which reports `IndexNotFound` so a misconfigured group
/// fails loudly. Writes create missing indices.
pub trait DocumentStore: Send + Sync {
    /// Cheap reachability check used once at run start.
    fn ping(&self) -> Result<(), StoreError>;

    fn index_exists(&self, index: &str) -> Result<bool, StoreError>;

    /// Create `index` if it does not exist.
    fn create_index(&self, index: &str) -> Result<(), StoreError>;

    /// Delete `index`. Returns whether it existed.
    fn delete_index(&self, index: &str) -> Result<bool, StoreError>;

    fn get(&self, index: &str, id: &str) -> Result<Option<Value>, StoreError>;

    fn upsert(&self, index: &str, id: &str, doc: Value) -> Result<(), StoreError>;

    /// Delete one document. Returns whether it existed.
    fn delete(&self, index: &str, id: &str) -> Result<bool, StoreError>;

    fn bulk(&self, actions: Vec<BulkAction>) -> Result<BulkResponse, StoreError>;

    fn scan_lines(&self, index: &str, query: &LineQuery) -> Result<Vec<LogLine>, StoreError>;

    /// Sorted distinct string values of `field` among documents matching `filter`.
    fn distinct_values(
        &self,
        index: &str,
        field: &str,
        filter: &TermFilter,
    ) -> Result<Vec<String>, StoreError>;

    /// `(id, document)` pairs matching `filter`, sorted by id.
    fn search(&self, index: &str, filter: &TermFilter) -> Result<Vec<(String, Value)>, StoreError>;
}

// =============================================================================
// Helpers
// =============================================================================

/// Build a source line document.
pub fn line_document(line: &LogLine, group_name: &str) -> Value {
    let mut doc = Map::new();
    doc.insert(fields::LOG_FILE_ID.to_string(), Value::from(line.file_id.as_str()));
    doc.insert(fields::LINE_NUMBER.to_string(), Value::from(line.line_number));
    doc.insert(fields::CONTENT.to_string(), Value::from(line.content.as_str()));
    doc.insert(fields::RELATIVE_PATH.to_string(), Value::from(line.path.as_str()));
    doc.insert(fields::GROUP_NAME.to_string(), Value::from(group_name));
    Value::Object(doc)
}

/// Id of a source line document.
pub fn line_document_id(line: &LogLine) -> String {
    record_id(&line.file_id, line.line_number)
}

/// Read a `LogLine` back out of a source line document.
pub fn line_from_document(index: &str, id: &str, doc: &Value) -> Result<LogLine, StoreError> {
    let invalid = |reason: &str| StoreError::InvalidDocument {
        index: index.to_string(),
        id: id.to_string(),
        reason: reason.to_string(),
    };
    let file_id = doc
        .get(fields::LOG_FILE_ID)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing log_file_id"))?;
    let line_number = doc
        .get(fields::LINE_NUMBER)
        .and_then(Value::as_u64)
        .ok_or_else(|| invalid("missing or non-integer line_number"))?;
    Ok(LogLine {
        file_id: file_id.to_string(),
        line_number,
        content: doc
            .get(fields::CONTENT)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        path: doc
            .get(fields::RELATIVE_PATH)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

/// Delete documents by id in one bulk request.
///
/// Best-effort: returns `(deleted, failed)`. A request-level failure counts
/// every id as failed.
pub fn delete_docs(store: &dyn DocumentStore, index: &str, ids: &[String]) -> (usize, usize) {
    if ids.is_empty() {
        return (0, 0);
    }
    let actions = ids
        .iter()
        .map(|id| BulkAction::Delete {
            index: index.to_string(),
            id: id.clone(),
        })
        .collect();
    match store.bulk(actions) {
        Ok(resp) => {
            for failure in resp.failures.iter().take(3) {
                tracing::warn!(index, id = %failure.id, reason = %failure.reason, "Delete failed");
            }
            (resp.succeeded, resp.failures.len())
        }
        Err(e) => {
            tracing::warn!(index, count = ids.len(), error = %e, "Bulk delete failed");
            (0, ids.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn line(n: u64) -> LogLine {
        LogLine {
            file_id: "f1".to_string(),
            line_number: n,
            content: format!("line {n}"),
            path: "app.log".to_string(),
        }
    }

    #[test]
    fn test_line_document_round_trip() {
        let l = line(4);
        let doc = line_document(&l, "g1");
        assert_eq!(doc[fields::GROUP_NAME], "g1");
        assert_eq!(line_document_id(&l), "f1_4");
        assert_eq!(line_from_document("src", "f1_4", &doc).unwrap(), l);
    }

    #[test]
    fn test_line_from_document_rejects_bad_shape() {
        let doc = json!({ "log_file_id": "f1", "line_number": "three" });
        let err = line_from_document("src", "f1_3", &doc).unwrap_err();
        assert!(matches!(err, StoreError::InvalidDocument { .. }));
    }

    #[test]
    fn test_line_query_window() {
        let q = LineQuery {
            file_id: "f1".to_string(),
            after_line: 2,
            up_to: Some(5),
            limit: 10,
        };
        assert!(!q.contains(2));
        assert!(q.contains(3));
        assert!(q.contains(5));
        assert!(!q.contains(6));

        let open = LineQuery { up_to: None, ..q };
        assert!(open.contains(1_000));
    }

    #[test]
    fn test_term_filter() {
        let doc = json!({ "group_name": "web", "n": 3 });
        assert!(TermFilter::new().matches(&doc));
        assert!(TermFilter::new().term("group_name", "web").matches(&doc));
        assert!(!TermFilter::new().term("group_name", "db").matches(&doc));
        assert!(!TermFilter::new().term("missing", "x").matches(&doc));
    }
}

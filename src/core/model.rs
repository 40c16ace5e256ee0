// LogSift - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no platform
// dependencies.
//
// These types are the shared vocabulary across all layers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Extracted or derived fields of one log line, keyed by field name.
pub type FieldMap = Map<String, Value>;

/// Document id shared by source lines, parsed records and unparsed records.
///
/// Re-indexing the same line always targets the same id, which makes every
/// write idempotent.
pub fn record_id(file_id: &str, line_number: u64) -> String {
    format!("{file_id}_{line_number}")
}

// =============================================================================
// Groups, files and lines (read-only inputs)
// =============================================================================

/// A named partition of log files sharing one parsing pattern and one pair
/// of output sinks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogGroup {
    /// Unique group name.
    pub name: String,
    /// Index holding the raw lines of every file in the group.
    pub source_index: String,
    /// Index receiving parsed records.
    pub parsed_index: String,
    /// Index receiving unparsed records.
    pub unparsed_index: String,
}

/// One raw line of a log file as written by the upstream collector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Stable file identifier.
    pub file_id: String,
    /// 1-indexed, gap-free line number within the file.
    pub line_number: u64,
    /// Raw text of the line.
    pub content: String,
    /// Relative display path of the file.
    pub path: String,
}

// =============================================================================
// Pattern specification
// =============================================================================

/// What happens when a derived field has the same name as an extracted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// The derived value replaces the extracted value.
    #[default]
    Overwrite,
    /// The extracted value wins; the derived field is skipped.
    KeepExtracted,
}

/// One derived field: output name plus its format template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedField {
    pub name: String,
    pub template: String,
}

/// Per-group pattern configuration as supplied by the pattern source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSpec {
    /// Grok match expression, e.g. `%{LOGLEVEL:level} %{GREEDYDATA:msg}`.
    pub expression: String,
    /// Require the expression to match the whole line.
    pub anchored: bool,
    /// Group-local `%{NAME}` definitions, in declaration order.
    pub custom_patterns: Vec<(String, String)>,
    /// Derived fields, applied in declaration order.
    pub derived_fields: Vec<DerivedField>,
    /// Policy for derived/extracted name collisions.
    pub on_collision: CollisionPolicy,
}

impl PatternSpec {
    /// Spec with only an expression and all other settings at their defaults.
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            anchored: true,
            custom_patterns: Vec::new(),
            derived_fields: Vec::new(),
            on_collision: CollisionPolicy::default(),
        }
    }

    /// Builder-style helper used by tests and embedders.
    pub fn with_derived(mut self, name: &str, template: &str) -> Self {
        self.derived_fields.push(DerivedField {
            name: name.to_string(),
            template: template.to_string(),
        });
        self
    }
}

// =============================================================================
// Checkpoint
// =============================================================================

/// Outcome recorded on a checkpoint by the last run that touched the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    /// No run has parsed this file yet.
    #[default]
    NeverParsed,
    CompletedNewData,
    CompletedNoNewData,
    SkippedUpToDate,
    /// Some writes failed; the checkpoint stops before the first failed line.
    CompletedWithWriteErrors,
    /// A status written by a newer or older version.
    #[serde(other)]
    Unknown,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeverParsed => "never_parsed",
            Self::CompletedNewData => "completed_new_data",
            Self::CompletedNoNewData => "completed_no_new_data",
            Self::SkippedUpToDate => "skipped_up_to_date",
            Self::CompletedWithWriteErrors => "completed_with_write_errors",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file record of how far incremental parsing has progressed.
///
/// Field names are the persisted document layout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParseCheckpoint {
    pub log_file_id: String,
    #[serde(default)]
    pub group_name: String,
    #[serde(default)]
    pub log_file_relative_path: String,
    #[serde(default)]
    pub last_line_number_parsed: u64,
    #[serde(default)]
    pub last_total_lines_by_collector: u64,
    #[serde(default)]
    pub last_parse_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_parse_status: CheckpointStatus,
}

// =============================================================================
// Output records
// =============================================================================

/// Where a record came from. Attached to both parsed and unparsed output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub file_id: String,
    pub path: String,
    pub line_number: u64,
    pub raw_content: String,
    pub group_name: String,
}

impl Provenance {
    pub fn from_line(line: &LogLine, group_name: &str) -> Self {
        Self {
            file_id: line.file_id.clone(),
            path: line.path.clone(),
            line_number: line.line_number,
            raw_content: line.content.clone(),
            group_name: group_name.to_string(),
        }
    }

    pub fn record_id(&self) -> String {
        record_id(&self.file_id, self.line_number)
    }

    /// Insert the provenance fields into `doc`.
    ///
    /// Provenance is written last so a capture named e.g. `group_name`
    /// cannot falsify where the record came from.
    fn write_into(&self, doc: &mut FieldMap, parsed_at: DateTime<Utc>) {
        doc.insert(
            "source_log_file_id".to_string(),
            Value::String(self.file_id.clone()),
        );
        doc.insert(
            "source_log_file_relative_path".to_string(),
            Value::String(self.path.clone()),
        );
        doc.insert(
            "source_line_number".to_string(),
            Value::from(self.line_number),
        );
        doc.insert(
            "raw_content".to_string(),
            Value::String(self.raw_content.clone()),
        );
        doc.insert(
            "group_name".to_string(),
            Value::String(self.group_name.clone()),
        );
        doc.insert(
            "parsed_at".to_string(),
            Value::String(parsed_at.to_rfc3339()),
        );
    }
}

/// A successfully matched line: extracted + derived fields plus provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecord {
    pub fields: FieldMap,
    pub provenance: Provenance,
}

impl ParsedRecord {
    pub fn into_document(self, parsed_at: DateTime<Utc>) -> Value {
        let mut doc = self.fields;
        self.provenance.write_into(&mut doc, parsed_at);
        Value::Object(doc)
    }
}

/// A line that could not be parsed, with the reason code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnparsedRecord {
    pub provenance: Provenance,
    pub reason: String,
}

impl UnparsedRecord {
    pub fn into_document(self, parsed_at: DateTime<Utc>) -> Value {
        let mut doc = FieldMap::new();
        self.provenance.write_into(&mut doc, parsed_at);
        doc.insert("reason_unparsed".to_string(), Value::String(self.reason));
        Value::Object(doc)
    }
}

// =============================================================================
// Run report
// =============================================================================

/// Final state of one file within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    CompletedNewData,
    CompletedNoNewData,
    SkippedUpToDate,
    CompletedWithWriteErrors,
    /// Another worker held the file; nothing was done.
    SkippedBusy,
    /// The run was cancelled before the file started.
    Cancelled,
    /// An unexpected error aborted the file; its checkpoint was not touched.
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompletedNewData => "completed_new_data",
            Self::CompletedNoNewData => "completed_no_new_data",
            Self::SkippedUpToDate => "skipped_up_to_date",
            Self::CompletedWithWriteErrors => "completed_with_write_errors",
            Self::SkippedBusy => "skipped_busy",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Checkpoint status persisted for this outcome, if any is persisted.
    pub fn checkpoint_status(&self) -> Option<CheckpointStatus> {
        match self {
            Self::CompletedNewData => Some(CheckpointStatus::CompletedNewData),
            Self::CompletedNoNewData => Some(CheckpointStatus::CompletedNoNewData),
            Self::SkippedUpToDate => Some(CheckpointStatus::SkippedUpToDate),
            Self::CompletedWithWriteErrors => Some(CheckpointStatus::CompletedWithWriteErrors),
            Self::SkippedBusy | Self::Cancelled | Self::Failed => None,
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-file processing summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub status: FileStatus,
    pub path: String,
    pub lines_scanned: u64,
    pub parsed: u64,
    pub unparsed: u64,
    pub write_errors: u64,
    pub checkpoint_before: u64,
    pub checkpoint_after: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    /// Report for a file that was never processed.
    pub fn untouched(status: FileStatus, error: Option<String>) -> Self {
        Self {
            status,
            path: String::new(),
            lines_scanned: 0,
            parsed: 0,
            unparsed: 0,
            write_errors: 0,
            checkpoint_before: 0,
            checkpoint_after: 0,
            error,
        }
    }
}

/// Final state of one group within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    Completed,
    /// Every file ran, but at least one failed or had write errors.
    CompletedWithErrors,
    CompletedNoFiles,
    FailedNoPattern,
    FailedPatternCompile,
    FailedEnumeration,
    Cancelled,
}

impl GroupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CompletedWithErrors => "completed_with_errors",
            Self::CompletedNoFiles => "completed_no_files",
            Self::FailedNoPattern => "failed_no_pattern",
            Self::FailedPatternCompile => "failed_pattern_compile",
            Self::FailedEnumeration => "failed_enumeration",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::FailedNoPattern | Self::FailedPatternCompile | Self::FailedEnumeration
        )
    }
}

impl std::fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-group outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupReport {
    pub status: GroupStatus,
    pub errors: Vec<String>,
    /// Keyed by file id.
    pub files: BTreeMap<String, FileReport>,
}

impl GroupReport {
    pub fn failed(status: GroupStatus, error: String) -> Self {
        Self {
            status,
            errors: vec![error],
            files: BTreeMap::new(),
        }
    }
}

/// Overall state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedNoGroups,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::CompletedNoGroups => "completed_no_groups",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one full run, keyed by group name.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub groups: BTreeMap<String, GroupReport>,
}

/// Aggregate counters over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub files: usize,
    pub lines_scanned: u64,
    pub parsed: u64,
    pub unparsed: u64,
    pub write_errors: u64,
    pub failed_groups: usize,
}

impl RunReport {
    pub fn totals(&self) -> RunTotals {
        let mut totals = RunTotals::default();
        for group in self.groups.values() {
            if group.status.is_failure() {
                totals.failed_groups += 1;
            }
            for file in group.files.values() {
                totals.files += 1;
                totals.lines_scanned += file.lines_scanned;
                totals.parsed += file.parsed;
                totals.unparsed += file.unparsed;
                totals.write_errors += file.write_errors;
            }
        }
        totals
    }
}

/// What a reset deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub groups: Vec<String>,
    pub indices_deleted: usize,
    pub checkpoints_deleted: usize,
    pub checkpoint_errors: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance() -> Provenance {
        Provenance {
            file_id: "f1".to_string(),
            path: "app/server.log".to_string(),
            line_number: 7,
            raw_content: "ERROR boom".to_string(),
            group_name: "g1".to_string(),
        }
    }

    #[test]
    fn test_record_id_scheme() {
        assert_eq!(record_id("f1", 3), "f1_3");
        assert_eq!(provenance().record_id(), "f1_7");
    }

    #[test]
    fn test_parsed_document_provenance_wins_over_capture() {
        let mut fields = FieldMap::new();
        fields.insert("level".to_string(), Value::from("ERROR"));
        fields.insert("group_name".to_string(), Value::from("spoofed"));
        let doc = ParsedRecord {
            fields,
            provenance: provenance(),
        }
        .into_document(Utc::now());

        assert_eq!(doc["level"], "ERROR");
        assert_eq!(doc["group_name"], "g1");
        assert_eq!(doc["source_line_number"], 7);
        assert_eq!(doc["raw_content"], "ERROR boom");
    }

    #[test]
    fn test_unparsed_document_has_reason() {
        let doc = UnparsedRecord {
            provenance: provenance(),
            reason: "grok_mismatch".to_string(),
        }
        .into_document(Utc::now());
        assert_eq!(doc["reason_unparsed"], "grok_mismatch");
        assert_eq!(doc["source_log_file_id"], "f1");
    }

    #[test]
    fn test_checkpoint_unknown_status_deserialises() {
        let cp: ParseCheckpoint = serde_json::from_value(serde_json::json!({
            "log_file_id": "f1",
            "last_line_number_parsed": 4,
            "last_parse_status": "some_future_status"
        }))
        .unwrap();
        assert_eq!(cp.last_line_number_parsed, 4);
        assert_eq!(cp.last_parse_status, CheckpointStatus::Unknown);
        assert_eq!(cp.last_total_lines_by_collector, 0);
    }

    #[test]
    fn test_file_status_checkpoint_mapping() {
        assert_eq!(
            FileStatus::SkippedUpToDate.checkpoint_status(),
            Some(CheckpointStatus::SkippedUpToDate)
        );
        assert_eq!(FileStatus::Failed.checkpoint_status(), None);
    }
}

// LogSift - app/group.rs
//
// Group Orchestrator: resolves a group's indices, loads and compiles its
// pattern, enumerates its files and drives the File Processor over each.
//
// Files of one group run in parallel on the current rayon pool. A
// `FileClaims` set guarantees that no two workers touch the same file id
// at once, and each file runs behind `catch_unwind` so one file's panic is
// recorded as that file's failure.

use crate::app::checkpoint::CheckpointStore;
use crate::app::file_processor::{BatchSettings, FileJob, FileProcessor};
use crate::core::grok::GrokMatcher;
use crate::core::model::{FileReport, FileStatus, GroupReport, GroupStatus, LogGroup, PatternSpec};
use crate::core::pattern::PatternRegistry;
use crate::core::store::{fields, DocumentStore, TermFilter};
use crate::util::constants;
use crate::util::error::StoreError;
use rayon::prelude::*;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

// =============================================================================
// Index naming
// =============================================================================

/// Names of the shared indices and prefixes of the per-group ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    pub checkpoint_index: String,
    pub collector_index: String,
    pub groups_index: String,
    pub source_prefix: String,
    pub parsed_prefix: String,
    pub unparsed_prefix: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            checkpoint_index: constants::DEFAULT_CHECKPOINT_INDEX.to_string(),
            collector_index: constants::DEFAULT_COLLECTOR_INDEX.to_string(),
            groups_index: constants::DEFAULT_GROUPS_INDEX.to_string(),
            source_prefix: constants::DEFAULT_SOURCE_PREFIX.to_string(),
            parsed_prefix: constants::DEFAULT_PARSED_PREFIX.to_string(),
            unparsed_prefix: constants::DEFAULT_UNPARSED_PREFIX.to_string(),
        }
    }
}

/// Index-safe form of a group name: lowercase, non-alphanumerics as `_`.
pub fn slug(group_name: &str) -> String {
    group_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

impl IndexSettings {
    /// Default indices for a group, before any group-document override.
    pub fn default_group(&self, group_name: &str) -> LogGroup {
        let slug = slug(group_name);
        LogGroup {
            name: group_name.to_string(),
            source_index: format!("{}{slug}", self.source_prefix),
            parsed_index: format!("{}{slug}", self.parsed_prefix),
            unparsed_index: format!("{}{slug}", self.unparsed_prefix),
        }
    }
}

/// Resolve a group's indices, applying overrides from its group document.
pub fn resolve_group(
    store: &dyn DocumentStore,
    indices: &IndexSettings,
    group_name: &str,
) -> Result<LogGroup, StoreError> {
    let mut group = indices.default_group(group_name);
    if let Some(doc) = store.get(&indices.groups_index, group_name)? {
        let override_with = |field: &str, target: &mut String| {
            if let Some(name) = doc.get(field).and_then(Value::as_str) {
                if !name.is_empty() {
                    *target = name.to_string();
                }
            }
        };
        override_with(fields::SOURCE_INDEX, &mut group.source_index);
        override_with(fields::PARSED_INDEX, &mut group.parsed_index);
        override_with(fields::UNPARSED_INDEX, &mut group.unparsed_index);
    }
    Ok(group)
}

/// Every group known to the store, sorted.
pub fn list_groups(
    store: &dyn DocumentStore,
    indices: &IndexSettings,
) -> Result<Vec<String>, StoreError> {
    let names: BTreeSet<String> = store
        .search(&indices.groups_index, &TermFilter::new())?
        .into_iter()
        .map(|(id, doc)| {
            doc.get(fields::GROUP_NAME)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(id)
        })
        .collect();
    Ok(names.into_iter().collect())
}

// =============================================================================
// File claims
// =============================================================================

/// File ids currently being processed.
#[derive(Debug, Default)]
pub struct FileClaims {
    active: Mutex<HashSet<String>>,
}

/// Held while a file is processed; releases the claim on drop.
#[derive(Debug)]
pub struct FileClaim<'a> {
    claims: &'a FileClaims,
    file_id: String,
}

impl FileClaims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `file_id`, or `None` if another worker holds it.
    pub fn try_claim(&self, file_id: &str) -> Option<FileClaim<'_>> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if !active.insert(file_id.to_string()) {
            return None;
        }
        Some(FileClaim {
            claims: self,
            file_id: file_id.to_string(),
        })
    }

    pub fn is_claimed(&self, file_id: &str) -> bool {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(file_id)
    }
}

impl Drop for FileClaim<'_> {
    fn drop(&mut self) {
        self.claims
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.file_id);
    }
}

// =============================================================================
// Group Orchestrator
// =============================================================================

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Shared collaborators for running groups.
pub struct GroupOrchestrator<'a> {
    pub store: &'a dyn DocumentStore,
    pub checkpoints: &'a CheckpointStore,
    pub registry: &'a PatternRegistry,
    pub claims: &'a FileClaims,
    pub indices: &'a IndexSettings,
    pub batch: BatchSettings,
    pub cancel: &'a AtomicBool,
}

impl GroupOrchestrator<'_> {
    /// Run one group end to end. Never fails; every problem ends up in
    /// the returned report.
    pub fn run_group(&self, group_name: &str) -> GroupReport {
        tracing::info!(group = group_name, "Group started");

        if self.cancel.load(Ordering::SeqCst) {
            return GroupReport::failed(GroupStatus::Cancelled, "run cancelled".to_string());
        }

        let group = match resolve_group(self.store, self.indices, group_name) {
            Ok(g) => g,
            Err(e) => {
                return self.fail(group_name, GroupStatus::FailedEnumeration, e.to_string());
            }
        };

        let Some(spec) = self.registry.get_pattern_spec(group_name) else {
            return self.fail(
                group_name,
                GroupStatus::FailedNoPattern,
                format!("no pattern defined for group '{group_name}'"),
            );
        };

        let matcher = match self.registry.get_compiled_matcher(group_name, &spec) {
            Ok(m) => m,
            Err(e) => {
                return self.fail(group_name, GroupStatus::FailedPatternCompile, e.to_string());
            }
        };

        let file_ids = match self.enumerate_files(&group) {
            Ok(ids) => ids,
            Err(e) => {
                return self.fail(group_name, GroupStatus::FailedEnumeration, e.to_string());
            }
        };

        if file_ids.is_empty() {
            tracing::info!(group = group_name, "Group has no files");
            return GroupReport {
                status: GroupStatus::CompletedNoFiles,
                errors: Vec::new(),
                files: BTreeMap::new(),
            };
        }

        for index in [&group.parsed_index, &group.unparsed_index] {
            if let Err(e) = self.store.create_index(index) {
                return self.fail(
                    group_name,
                    GroupStatus::FailedEnumeration,
                    format!("cannot create output index '{index}': {e}"),
                );
            }
        }

        let files: BTreeMap<String, FileReport> = file_ids
            .par_iter()
            .map(|file_id| {
                let report = self.run_file(&group, file_id, &spec, &matcher);
                (file_id.clone(), report)
            })
            .collect();

        let report = summarise(files);
        tracing::info!(
            group = group_name,
            status = %report.status,
            files = report.files.len(),
            errors = report.errors.len(),
            "Group finished"
        );
        report
    }

    fn fail(&self, group_name: &str, status: GroupStatus, error: String) -> GroupReport {
        tracing::warn!(group = group_name, status = %status, error = %error, "Group failed");
        GroupReport::failed(status, error)
    }

    fn enumerate_files(&self, group: &LogGroup) -> Result<Vec<String>, StoreError> {
        if !self.store.index_exists(&group.source_index)? {
            return Err(StoreError::IndexNotFound {
                index: group.source_index.clone(),
            });
        }
        self.store
            .distinct_values(&group.source_index, fields::LOG_FILE_ID, &TermFilter::new())
    }

    fn run_file(
        &self,
        group: &LogGroup,
        file_id: &str,
        spec: &PatternSpec,
        matcher: &GrokMatcher,
    ) -> FileReport {
        if self.cancel.load(Ordering::SeqCst) {
            return FileReport::untouched(FileStatus::Cancelled, None);
        }

        let Some(_claim) = self.claims.try_claim(file_id) else {
            tracing::warn!(group = %group.name, file_id, "File busy in another worker; skipped");
            return FileReport::untouched(
                FileStatus::SkippedBusy,
                Some("file is being processed by another worker".to_string()),
            );
        };

        let processor = FileProcessor::new(self.store, self.checkpoints, self.batch);
        let job = FileJob {
            group,
            file_id,
            matcher,
            spec,
        };

        match panic::catch_unwind(AssertUnwindSafe(|| processor.process(&job))) {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                tracing::warn!(group = %group.name, file_id, error = %e, "File failed");
                FileReport::untouched(FileStatus::Failed, Some(e.to_string()))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(
                    group = %group.name,
                    file_id,
                    panic = %message,
                    "File worker panicked"
                );
                FileReport::untouched(FileStatus::Failed, Some(format!("panicked: {message}")))
            }
        }
    }
}

/// Fold per-file reports into the group's status and error list.
fn summarise(files: BTreeMap<String, FileReport>) -> GroupReport {
    let mut errors = Vec::new();
    let mut cancelled = false;
    let mut had_errors = false;

    for (file_id, file) in &files {
        match file.status {
            FileStatus::Cancelled => cancelled = true,
            FileStatus::Failed | FileStatus::SkippedBusy => {
                had_errors = true;
                let reason = file.error.as_deref().unwrap_or("unknown error");
                errors.push(format!("file '{file_id}': {reason}"));
            }
            FileStatus::CompletedWithWriteErrors => {
                had_errors = true;
                errors.push(format!(
                    "file '{file_id}': {} write errors; checkpoint held at line {}",
                    file.write_errors, file.checkpoint_after
                ));
            }
            _ => {}
        }
    }

    let status = if cancelled {
        GroupStatus::Cancelled
    } else if had_errors {
        GroupStatus::CompletedWithErrors
    } else {
        GroupStatus::Completed
    };
    GroupReport {
        status,
        errors,
        files,
    }
}

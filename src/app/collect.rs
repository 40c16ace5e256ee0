// LogSift - app/collect.rs
//
// Local log collector. Walks a directory, and for every matching file
// appends the lines the store has not seen yet to the group's source index,
// then records the last confirmed line in the collector status index.
//
// Rules:
//   - Each pass resumes at the byte offset recorded with the last confirmed
//     line, so unchanged files cost one metadata call.
//   - Only newline-terminated lines are collected; a partially written last
//     line waits for the next pass.
//   - A file smaller than the recorded offset was truncated or rotated: it
//     is re-collected from line 1 and the stale tail is deleted.
//   - The confirmed total stops before the first line that failed to write,
//     so the parser never treats an unwritten line as available.
//   - Exclude patterns without wildcards also prune directories.

use crate::app::group::{resolve_group, IndexSettings};
use crate::core::model::{record_id, LogLine};
use crate::core::store::{
    delete_docs, fields, line_document, line_document_id, BulkAction, DocumentStore,
};
use crate::util::constants;
use crate::util::error::CollectError;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// Maximum directory recursion depth.
    pub max_depth: usize,
    /// Maximum number of files per pass; the most recently modified win.
    pub max_files: usize,
    /// Filename globs a file must match. Empty means everything.
    pub include_patterns: Vec<String>,
    /// Filename globs to skip; literal entries also prune directories.
    pub exclude_patterns: Vec<String>,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            max_depth: constants::DEFAULT_MAX_DEPTH,
            max_files: constants::DEFAULT_MAX_FILES,
            include_patterns: constants::DEFAULT_INCLUDE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            exclude_patterns: constants::DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

/// What one pass did to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedFile {
    pub file_id: String,
    pub relative_path: String,
    /// Last line number confirmed in the store after this pass.
    pub confirmed_lines: u64,
    pub lines_added: u64,
    /// The file shrank and was re-collected from line 1.
    pub restarted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectSummary {
    pub group: String,
    pub files: Vec<CollectedFile>,
    pub lines_added: u64,
    pub write_errors: u64,
    pub warnings: Vec<String>,
}

/// Stable id of a file within a group: survives restarts and re-collection.
pub fn file_id_for(group_name: &str, relative_path: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(group_name.as_bytes());
    hasher.update(&[0]);
    hasher.update(relative_path.as_bytes());
    let hex = hasher.finalize().to_hex();
    hex[..16].to_string()
}

// =============================================================================
// Discovery
// =============================================================================

fn compile_patterns(patterns: &[String]) -> Result<Vec<glob::Pattern>, CollectError> {
    patterns
        .iter()
        .map(|p| {
            glob::Pattern::new(p).map_err(|e| CollectError::InvalidGlob {
                pattern: p.clone(),
                source: e,
            })
        })
        .collect()
}

fn is_literal(p: &glob::Pattern) -> bool {
    !p.as_str().contains(|c: char| matches!(c, '*' | '?' | '['))
}

/// Find matching files under `root`.
///
/// Returns the files (sorted by path) and non-fatal warnings.
pub fn discover_files(
    root: &Path,
    config: &CollectConfig,
) -> Result<(Vec<PathBuf>, Vec<String>), CollectError> {
    match std::fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(CollectError::NotADirectory {
                path: root.to_path_buf(),
            })
        }
        Err(_) => {
            return Err(CollectError::RootNotFound {
                path: root.to_path_buf(),
            })
        }
    }

    let include = compile_patterns(&config.include_patterns)?;
    let exclude = compile_patterns(&config.exclude_patterns)?;
    let max_depth = config.max_depth.min(constants::ABSOLUTE_MAX_DEPTH);
    let max_files = config
        .max_files
        .clamp(constants::MIN_MAX_FILES, constants::ABSOLUTE_MAX_FILES);

    let mut found: Vec<(PathBuf, Option<DateTime<Utc>>)> = Vec::new();
    let mut warnings = Vec::new();

    let walker = walkdir::WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_str().unwrap_or("");
            !exclude.iter().any(|p| is_literal(p) && p.matches(name))
        });

    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(e) => {
                let msg = format!("Cannot access entry under '{}': {e}", root.display());
                tracing::debug!(warning = %msg, "Collect warning");
                warnings.push(msg);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            warnings.push(format!(
                "Skipping '{}': non-UTF-8 filename",
                entry.path().display()
            ));
            continue;
        };
        if exclude.iter().any(|p| p.matches(file_name)) {
            tracing::trace!(file = file_name, "Excluded by pattern");
            continue;
        }
        if !include.is_empty() && !include.iter().any(|p| p.matches(file_name)) {
            continue;
        }
        let modified = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);
        found.push((entry.path().to_path_buf(), modified));
    }

    let total_found = found.len();
    if total_found > max_files {
        // Newest first; files without an mtime are dropped first.
        found.sort_unstable_by(|a, b| b.1.cmp(&a.1));
        found.truncate(max_files);
        warnings.push(format!(
            "{total_found} files matched but the limit is {max_files}; \
             only the most recently modified were collected"
        ));
    }

    let mut files: Vec<PathBuf> = found.into_iter().map(|(p, _)| p).collect();
    files.sort();
    tracing::debug!(root = %root.display(), files = files.len(), "Discovery complete");
    Ok((files, warnings))
}

/// Path relative to `root`, always with `/` separators.
fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// =============================================================================
// Incremental reading
// =============================================================================

/// Where the previous pass stopped in a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ResumePoint {
    /// Last line number confirmed in the store.
    line: u64,
    /// Byte offset just past that line.
    offset: u64,
}

/// One complete line and the byte offset it starts at.
struct RawLine {
    number: u64,
    start: u64,
    content: String,
}

/// Reads complete lines from a byte offset onward.
struct LineReader {
    reader: BufReader<File>,
    offset: u64,
    last_line: u64,
    buf: Vec<u8>,
}

impl LineReader {
    fn open(path: &Path, at: ResumePoint) -> std::io::Result<Self> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(at.offset))?;
        Ok(Self {
            reader: BufReader::new(file),
            offset: at.offset,
            last_line: at.line,
            buf: Vec::new(),
        })
    }

    /// Next newline-terminated line, lossily decoded. `None` at end of file
    /// or when only a partial line remains.
    fn next_line(&mut self) -> std::io::Result<Option<RawLine>> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 || self.buf.last() != Some(&b'\n') {
            return Ok(None);
        }
        let start = self.offset;
        self.offset += n as u64;
        self.last_line += 1;

        let mut text = &self.buf[..n - 1];
        if let Some(stripped) = text.strip_suffix(b"\r") {
            text = stripped;
        }
        Ok(Some(RawLine {
            number: self.last_line,
            start,
            content: String::from_utf8_lossy(text).into_owned(),
        }))
    }

    /// Skip `count` lines. False if the file ends first.
    fn skip_lines(&mut self, count: u64) -> std::io::Result<bool> {
        while self.last_line < count {
            if self.next_line()?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn position(&self) -> ResumePoint {
        ResumePoint {
            line: self.last_line,
            offset: self.offset,
        }
    }
}

/// Open `path` positioned after the previously confirmed lines.
///
/// Returns the reader and whether the file had to be restarted from line 1.
/// A status written without a byte offset is resumed by counting lines.
fn open_resumed(
    path: &Path,
    previous: ResumePoint,
    has_offset: bool,
) -> std::io::Result<(LineReader, bool)> {
    if has_offset {
        let size = std::fs::metadata(path)?.len();
        if size < previous.offset {
            return Ok((LineReader::open(path, ResumePoint::default())?, true));
        }
        return Ok((LineReader::open(path, previous)?, false));
    }

    let mut reader = LineReader::open(path, ResumePoint::default())?;
    if reader.skip_lines(previous.line)? {
        Ok((reader, false))
    } else {
        Ok((LineReader::open(path, ResumePoint::default())?, true))
    }
}

// =============================================================================
// Collector
// =============================================================================

pub struct Collector<'a> {
    store: &'a dyn DocumentStore,
    indices: &'a IndexSettings,
}

impl<'a> Collector<'a> {
    pub fn new(store: &'a dyn DocumentStore, indices: &'a IndexSettings) -> Self {
        Self { store, indices }
    }

    /// Collect every matching file under `root` into `group_name`.
    ///
    /// Per-file read and write problems become warnings; only an invalid
    /// root, a bad glob, or an unreachable store fail the pass.
    pub fn collect(
        &self,
        group_name: &str,
        root: &Path,
        config: &CollectConfig,
    ) -> Result<CollectSummary, CollectError> {
        let (paths, warnings) = discover_files(root, config)?;
        self.register_group(group_name)?;
        let group = resolve_group(self.store, self.indices, group_name)?;
        self.store.create_index(&group.source_index)?;
        self.store.create_index(&self.indices.collector_index)?;

        let mut summary = CollectSummary {
            group: group_name.to_string(),
            warnings,
            ..CollectSummary::default()
        };

        for path in paths {
            let rel = relative_path(root, &path);
            let (file, write_errors) =
                match self.collect_file(group_name, &group.source_index, &rel, &path) {
                    Ok(outcome) => outcome,
                    Err(e @ CollectError::Read { .. }) => {
                        let msg = e.to_string();
                        tracing::warn!(warning = %msg, "File skipped");
                        summary.warnings.push(msg);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
            summary.lines_added += file.lines_added;
            summary.write_errors += write_errors;
            if write_errors > 0 {
                summary
                    .warnings
                    .push(format!("'{rel}': {write_errors} lines failed to write"));
            }
            summary.files.push(file);
        }

        tracing::info!(
            group = group_name,
            files = summary.files.len(),
            lines_added = summary.lines_added,
            warnings = summary.warnings.len(),
            "Collection complete"
        );
        Ok(summary)
    }

    /// Create the group's document unless one exists (keeps overrides).
    fn register_group(&self, group_name: &str) -> Result<(), CollectError> {
        if self.store.get(&self.indices.groups_index, group_name)?.is_none() {
            let mut doc = Map::new();
            doc.insert(fields::GROUP_NAME.to_string(), Value::from(group_name));
            self.store
                .upsert(&self.indices.groups_index, group_name, Value::Object(doc))?;
            tracing::info!(group = group_name, "Group registered");
        }
        Ok(())
    }

    fn collect_file(
        &self,
        group_name: &str,
        source_index: &str,
        rel: &str,
        path: &Path,
    ) -> Result<(CollectedFile, u64), CollectError> {
        let file_id = file_id_for(group_name, rel);
        let status = self.store.get(&self.indices.collector_index, &file_id)?;
        let status_u64 = |field: &str| {
            status
                .as_ref()
                .and_then(|doc| doc.get(field))
                .and_then(Value::as_u64)
        };
        let previous = ResumePoint {
            line: status_u64(fields::LAST_LINE_NUMBER).unwrap_or(0),
            offset: status_u64(fields::LAST_BYTE_OFFSET).unwrap_or(0),
        };
        let has_offset = status_u64(fields::LAST_BYTE_OFFSET).is_some() || previous.line == 0;

        let read_err = |source| CollectError::Read {
            path: path.to_path_buf(),
            source,
        };
        let (mut reader, restarted) =
            open_resumed(path, previous, has_offset).map_err(read_err)?;
        if restarted {
            tracing::warn!(
                group = group_name,
                file = rel,
                previous_line = previous.line,
                previous_offset = previous.offset,
                "File shrank; re-collecting from line 1"
            );
        }

        let mut first_failed: Option<ResumePoint> = None;
        let mut write_errors = 0u64;
        let mut lines_read = 0u64;
        let mut chunk: Vec<(LogLine, u64)> = Vec::with_capacity(constants::COLLECT_BATCH_SIZE);

        loop {
            let next = reader.next_line().map_err(read_err)?;
            let done = next.is_none();
            if let Some(raw) = next {
                lines_read += 1;
                chunk.push((
                    LogLine {
                        file_id: file_id.clone(),
                        line_number: raw.number,
                        content: raw.content,
                        path: rel.to_string(),
                    },
                    raw.start,
                ));
            }
            if chunk.len() >= constants::COLLECT_BATCH_SIZE || (done && !chunk.is_empty()) {
                let failed = self.write_chunk(group_name, source_index, &chunk)?;
                write_errors += failed.len() as u64;
                for point in failed {
                    if first_failed.map_or(true, |f| point.line < f.line) {
                        first_failed = Some(point);
                    }
                }
                chunk.clear();
            }
            if done {
                break;
            }
        }

        let end = reader.position();
        if end.line < previous.line {
            let stale: Vec<String> = (end.line + 1..=previous.line)
                .map(|n| record_id(&file_id, n))
                .collect();
            delete_docs(self.store, source_index, &stale);
        }

        // A failed line's start offset is where the line before it ends.
        let confirmed = match first_failed {
            Some(failed) => ResumePoint {
                line: failed.line - 1,
                offset: failed.offset,
            },
            None => end,
        };

        let mut status = Map::new();
        status.insert(fields::LOG_FILE_ID.to_string(), Value::from(file_id.as_str()));
        status.insert(fields::GROUP_NAME.to_string(), Value::from(group_name));
        status.insert(fields::RELATIVE_PATH.to_string(), Value::from(rel));
        status.insert(fields::LAST_LINE_NUMBER.to_string(), Value::from(confirmed.line));
        status.insert(fields::LAST_BYTE_OFFSET.to_string(), Value::from(confirmed.offset));
        self.store
            .upsert(&self.indices.collector_index, &file_id, Value::Object(status))?;

        tracing::debug!(
            group = group_name,
            file = rel,
            file_id = %file_id,
            read = lines_read,
            confirmed = confirmed.line,
            offset = confirmed.offset,
            "File collected"
        );

        Ok((
            CollectedFile {
                file_id,
                relative_path: rel.to_string(),
                confirmed_lines: confirmed.line,
                lines_added: lines_read - write_errors.min(lines_read),
                restarted,
            },
            write_errors,
        ))
    }

    /// Bulk-index one chunk; returns the line number and start offset of
    /// every line that failed to write.
    fn write_chunk(
        &self,
        group_name: &str,
        source_index: &str,
        chunk: &[(LogLine, u64)],
    ) -> Result<Vec<ResumePoint>, CollectError> {
        let actions = chunk
            .iter()
            .map(|(line, _)| BulkAction::Index {
                index: source_index.to_string(),
                id: line_document_id(line),
                body: line_document(line, group_name),
            })
            .collect();
        let resp = self.store.bulk(actions)?;
        Ok(resp
            .failures
            .iter()
            .map(|failure| {
                let (line, start) = chunk
                    .iter()
                    .find(|(l, _)| line_document_id(l) == failure.id)
                    .unwrap_or(&chunk[0]);
                ResumePoint {
                    line: line.line_number,
                    offset: *start,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory_store::MemoryStore;
    use std::fs;
    use tempfile::TempDir;

    fn make_temp_tree() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("app.log"), "INFO one\nWARN two\n").unwrap();
        fs::write(root.join("backup.log.gz"), "binary").unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub").join("worker.log"), "ERROR three\n").unwrap();
        fs::create_dir(root.join(".git")).unwrap();
        fs::write(root.join(".git").join("hidden.log"), "nope\n").unwrap();
        dir
    }

    #[test]
    fn test_discover_applies_patterns() {
        let dir = make_temp_tree();
        let (files, warnings) = discover_files(dir.path(), &CollectConfig::default()).unwrap();
        let rels: Vec<String> = files.iter().map(|p| relative_path(dir.path(), p)).collect();
        assert_eq!(rels, vec!["app.log", "sub/worker.log"]);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_discover_root_errors() {
        assert!(matches!(
            discover_files(Path::new("/nonexistent/logsift"), &CollectConfig::default()),
            Err(CollectError::RootNotFound { .. })
        ));
        let dir = make_temp_tree();
        assert!(matches!(
            discover_files(&dir.path().join("app.log"), &CollectConfig::default()),
            Err(CollectError::NotADirectory { .. })
        ));
    }

    #[test]
    fn test_invalid_glob_rejected() {
        let dir = make_temp_tree();
        let config = CollectConfig {
            include_patterns: vec!["[bad".to_string()],
            ..CollectConfig::default()
        };
        assert!(matches!(
            discover_files(dir.path(), &config),
            Err(CollectError::InvalidGlob { .. })
        ));
    }

    fn read_all(path: &Path, at: ResumePoint) -> Vec<(u64, u64, String)> {
        let mut reader = LineReader::open(path, at).unwrap();
        let mut out = Vec::new();
        while let Some(raw) = reader.next_line().unwrap() {
            out.push((raw.number, raw.start, raw.content));
        }
        out
    }

    #[test]
    fn test_partial_last_line_waits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "one\r\ntwo\npartial").unwrap();
        let lines = read_all(&path, ResumePoint::default());
        assert_eq!(
            lines,
            vec![(1, 0, "one".to_string()), (2, 5, "two".to_string())]
        );
    }

    #[test]
    fn test_reader_resumes_at_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");
        fs::write(&path, "one\ntwo\nthree\n").unwrap();
        let lines = read_all(&path, ResumePoint { line: 1, offset: 4 });
        assert_eq!(
            lines,
            vec![(2, 4, "two".to_string()), (3, 8, "three".to_string())]
        );
    }

    #[test]
    fn test_file_id_is_stable_and_group_scoped() {
        assert_eq!(file_id_for("web", "a.log"), file_id_for("web", "a.log"));
        assert_ne!(file_id_for("web", "a.log"), file_id_for("db", "a.log"));
        assert_eq!(file_id_for("web", "a.log").len(), 16);
    }

    #[test]
    fn test_collect_appends_and_restarts() {
        let dir = make_temp_tree();
        let store = MemoryStore::new();
        let indices = IndexSettings::default();
        let collector = Collector::new(&store, &indices);

        let summary = collector
            .collect("web", dir.path(), &CollectConfig::default())
            .unwrap();
        assert_eq!(summary.lines_added, 3);
        assert_eq!(store.count("logs_web"), 3);
        assert!(store.get("log_groups", "web").unwrap().is_some());

        // Append one line: only it is added.
        fs::write(dir.path().join("app.log"), "INFO one\nWARN two\nDEBUG four\n").unwrap();
        let summary = collector
            .collect("web", dir.path(), &CollectConfig::default())
            .unwrap();
        assert_eq!(summary.lines_added, 1);
        let app_id = file_id_for("web", "app.log");
        let status = store.get("collector_status", &app_id).unwrap().unwrap();
        assert_eq!(status["last_line_number"], 3);

        // Truncate: re-collected from line 1, stale tail removed.
        fs::write(dir.path().join("app.log"), "FATAL new\n").unwrap();
        let summary = collector
            .collect("web", dir.path(), &CollectConfig::default())
            .unwrap();
        let app = summary
            .files
            .iter()
            .find(|f| f.relative_path == "app.log")
            .unwrap();
        assert!(app.restarted);
        assert_eq!(app.confirmed_lines, 1);
        assert!(store
            .get("logs_web", &record_id(&app_id, 2))
            .unwrap()
            .is_none());
        let first = store.get("logs_web", &record_id(&app_id, 1)).unwrap().unwrap();
        assert_eq!(first["content"], "FATAL new");
    }

    #[test]
    fn test_collect_records_byte_offset_and_completes_partial_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "alpha\nbe").unwrap();
        let store = MemoryStore::new();
        let indices = IndexSettings::default();
        let collector = Collector::new(&store, &indices);
        let app_id = file_id_for("web", "app.log");

        collector
            .collect("web", dir.path(), &CollectConfig::default())
            .unwrap();
        let status = store.get("collector_status", &app_id).unwrap().unwrap();
        assert_eq!(status["last_line_number"], 1);
        assert_eq!(status["last_byte_offset"], 6);

        // The partial line is finished by the writer; only it is collected.
        fs::write(&path, "alpha\nbeta\n").unwrap();
        let summary = collector
            .collect("web", dir.path(), &CollectConfig::default())
            .unwrap();
        assert_eq!(summary.lines_added, 1);
        let second = store.get("logs_web", &record_id(&app_id, 2)).unwrap().unwrap();
        assert_eq!(second["content"], "beta");
        let status = store.get("collector_status", &app_id).unwrap().unwrap();
        assert_eq!(status["last_byte_offset"], 11);

        // Nothing new: no lines, offset unchanged.
        let summary = collector
            .collect("web", dir.path(), &CollectConfig::default())
            .unwrap();
        assert_eq!(summary.lines_added, 0);
    }

    #[test]
    fn test_earlier_bytes_are_not_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "one\ntwo\n").unwrap();
        let store = MemoryStore::new();
        let indices = IndexSettings::default();
        let collector = Collector::new(&store, &indices);
        let app_id = file_id_for("web", "app.log");
        collector
            .collect("web", dir.path(), &CollectConfig::default())
            .unwrap();

        // Same-length rewrite of collected bytes plus one appended line.
        fs::write(&path, "ONE\nTWO\nthree\n").unwrap();
        collector
            .collect("web", dir.path(), &CollectConfig::default())
            .unwrap();
        let first = store.get("logs_web", &record_id(&app_id, 1)).unwrap().unwrap();
        assert_eq!(first["content"], "one");
        let third = store.get("logs_web", &record_id(&app_id, 3)).unwrap().unwrap();
        assert_eq!(third["content"], "three");
    }

    #[test]
    fn test_status_without_offset_resumes_by_line_count() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.log"), "one\ntwo\nthree\n").unwrap();
        let store = MemoryStore::new();
        let indices = IndexSettings::default();
        let app_id = file_id_for("web", "app.log");
        store
            .upsert("collector_status", &app_id, serde_json::json!({ "last_line_number": 2 }))
            .unwrap();

        let summary = Collector::new(&store, &indices)
            .collect("web", dir.path(), &CollectConfig::default())
            .unwrap();
        assert_eq!(summary.lines_added, 1);
        let status = store.get("collector_status", &app_id).unwrap().unwrap();
        assert_eq!(status["last_line_number"], 3);
        assert_eq!(status["last_byte_offset"], 14);
    }

    #[test]
    fn test_write_failure_holds_confirmed_total() {
        let dir = make_temp_tree();
        let store = MemoryStore::new();
        let indices = IndexSettings::default();
        let app_id = file_id_for("web", "app.log");
        store.fail_writes_for(&record_id(&app_id, 2));

        let summary = Collector::new(&store, &indices)
            .collect("web", dir.path(), &CollectConfig::default())
            .unwrap();
        assert_eq!(summary.write_errors, 1);
        let status = store.get("collector_status", &app_id).unwrap().unwrap();
        assert_eq!(status["last_line_number"], 1);
    }
}

// LogSift - app/file_processor.rs
//
// File Processor: one file's incremental scan.
//
//   pending -> determining_range -> skipped_up_to_date -> done
//                                -> scanning -> flushing -> done
//
// Rules:
//   - Lines are scanned in increasing line-number order, one keyset page at
//     a time. When the collector has confirmed a total, the scan stops there.
//   - Parsed and unparsed actions are buffered separately and flushed when
//     either buffer reaches the write batch size, so memory stays bounded.
//   - The checkpoint is saved exactly once, after the final flush. It
//     advances only to the line before the first failed write, so a
//     re-run rewrites from that line (writes are idempotent by id).

use crate::app::checkpoint::CheckpointStore;
use crate::core::derive::{self, DeriveContext};
use crate::core::grok::{self, GrokMatcher};
use crate::core::model::{
    CheckpointStatus, FileReport, FileStatus, LogGroup, LogLine, ParsedRecord, PatternSpec,
    Provenance, UnparsedRecord,
};
use crate::core::store::{BulkAction, DocumentStore, LineQuery};
use crate::util::constants;
use crate::util::error::StoreError;
use crate::util::logging::preview;
use chrono::Utc;
use std::collections::HashMap;

// =============================================================================
// Settings
// =============================================================================

/// Batch sizes used while processing a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Lines fetched per scan page.
    pub scan_batch_size: usize,
    /// Buffered actions per sink that trigger a flush.
    pub write_batch_size: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            scan_batch_size: constants::DEFAULT_SCAN_BATCH_SIZE,
            write_batch_size: constants::DEFAULT_WRITE_BATCH_SIZE,
        }
    }
}

// =============================================================================
// State machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    Pending,
    DeterminingRange,
    SkippedUpToDate,
    Scanning,
    Flushing,
    Done,
}

impl FileState {
    pub fn can_transition_to(self, next: FileState) -> bool {
        matches!(
            (self, next),
            (FileState::Pending, FileState::DeterminingRange)
                | (FileState::DeterminingRange, FileState::SkippedUpToDate)
                | (FileState::DeterminingRange, FileState::Scanning)
                | (FileState::SkippedUpToDate, FileState::Done)
                | (FileState::Scanning, FileState::Flushing)
                | (FileState::Flushing, FileState::Done)
        )
    }
}

/// Tracks the current state and logs every transition.
struct StateTracker<'a> {
    file_id: &'a str,
    state: FileState,
}

impl<'a> StateTracker<'a> {
    fn new(file_id: &'a str) -> Self {
        Self {
            file_id,
            state: FileState::Pending,
        }
    }

    fn enter(&mut self, next: FileState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(file_id = self.file_id, from = ?self.state, to = ?next, "File state");
        self.state = next;
    }
}

// =============================================================================
// Range determination
// =============================================================================

/// Where a scan starts and stops, derived from checkpoint and collector total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    /// Scan lines strictly after this one.
    pub start_after: u64,
    /// Upper bound (inclusive) when the collector has confirmed a total.
    pub up_to: Option<u64>,
    /// Nothing new to scan.
    pub up_to_date: bool,
    /// The checkpoint was discarded because the source shrank or vanished.
    pub reset: bool,
}

/// Decide the scan range for a file.
pub fn determine_range(last_line_parsed: u64, collector_total: u64) -> ScanRange {
    let truncated = (collector_total > 0 && collector_total < last_line_parsed)
        || (collector_total == 0 && last_line_parsed > 0);
    let start_after = if truncated { 0 } else { last_line_parsed };
    ScanRange {
        start_after,
        up_to: (collector_total > 0).then_some(collector_total),
        up_to_date: collector_total > 0 && start_after >= collector_total,
        reset: truncated,
    }
}

// =============================================================================
// Write buffering
// =============================================================================

/// One sink's pending actions, each tagged with its source line number.
struct WriteBuffer {
    sink: &'static str,
    actions: Vec<(u64, BulkAction)>,
}

impl WriteBuffer {
    fn new(sink: &'static str, capacity: usize) -> Self {
        Self {
            sink,
            actions: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, line_number: u64, action: BulkAction) {
        self.actions.push((line_number, action));
    }

    fn len(&self) -> usize {
        self.actions.len()
    }
}

/// Outcome counters accumulated while scanning.
#[derive(Debug, Default)]
struct ScanTally {
    lines_scanned: u64,
    parsed: u64,
    unparsed: u64,
    write_errors: u64,
    max_line_seen: u64,
    first_failed_line: Option<u64>,
    path: Option<String>,
}

impl ScanTally {
    fn record_failure(&mut self, line_number: u64) {
        self.write_errors += 1;
        self.first_failed_line = Some(
            self.first_failed_line
                .map_or(line_number, |first| first.min(line_number)),
        );
    }
}

// =============================================================================
// File Processor
// =============================================================================

/// Everything the processor needs to know about one file's group.
pub struct FileJob<'a> {
    pub group: &'a LogGroup,
    pub file_id: &'a str,
    pub matcher: &'a GrokMatcher,
    pub spec: &'a PatternSpec,
}

pub struct FileProcessor<'a> {
    store: &'a dyn DocumentStore,
    checkpoints: &'a CheckpointStore,
    settings: BatchSettings,
}

impl<'a> FileProcessor<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        checkpoints: &'a CheckpointStore,
        settings: BatchSettings,
    ) -> Self {
        Self {
            store,
            checkpoints,
            settings,
        }
    }

    /// Process one file. Store errors while reading the checkpoint, scanning,
    /// or saving the checkpoint are returned; write errors are counted.
    pub fn process(&self, job: &FileJob<'_>) -> Result<FileReport, StoreError> {
        let file_id = job.file_id;
        let group_name = job.group.name.as_str();
        let mut tracker = StateTracker::new(file_id);

        // ---------------------------------------------------------------------
        // Determining range
        // ---------------------------------------------------------------------
        tracker.enter(FileState::DeterminingRange);
        let checkpoint = self.checkpoints.get_checkpoint(file_id)?;
        let collector_total = self.checkpoints.get_collector_total_lines(file_id)?;
        let before = checkpoint.last_line_number_parsed;
        let range = determine_range(before, collector_total);

        if range.reset {
            tracing::warn!(
                group = group_name,
                file_id,
                last_line_parsed = before,
                collector_total,
                "Source shrank below checkpoint; re-scanning from the start"
            );
        }

        if range.up_to_date {
            tracker.enter(FileState::SkippedUpToDate);
            // Only the collector total and timestamp change; the last
            // outcome (e.g. completed_with_write_errors) stays visible.
            self.checkpoints.save_checkpoint(
                file_id,
                group_name,
                &checkpoint.log_file_relative_path,
                range.start_after,
                collector_total,
                checkpoint.last_parse_status,
            )?;
            tracker.enter(FileState::Done);
            tracing::debug!(group = group_name, file_id, checkpoint = before, "File up to date");
            return Ok(FileReport {
                status: FileStatus::SkippedUpToDate,
                path: checkpoint.log_file_relative_path,
                lines_scanned: 0,
                parsed: 0,
                unparsed: 0,
                write_errors: 0,
                checkpoint_before: before,
                checkpoint_after: range.start_after,
                error: None,
            });
        }

        // ---------------------------------------------------------------------
        // Scanning
        // ---------------------------------------------------------------------
        tracker.enter(FileState::Scanning);
        let mut tally = ScanTally::default();
        let mut parsed_buf = WriteBuffer::new("parsed", self.settings.write_batch_size);
        let mut unparsed_buf = WriteBuffer::new("unparsed", self.settings.write_batch_size);

        let scan_result = self.scan(job, range, &mut tally, &mut parsed_buf, &mut unparsed_buf);

        // ---------------------------------------------------------------------
        // Flushing (after normal completion or early stop)
        // ---------------------------------------------------------------------
        tracker.enter(FileState::Flushing);
        self.flush(group_name, &mut parsed_buf, &mut tally);
        self.flush(group_name, &mut unparsed_buf, &mut tally);

        if let Err(e) = scan_result {
            tracing::warn!(group = group_name, file_id, error = %e, "Scan aborted");
            return Err(e);
        }

        // ---------------------------------------------------------------------
        // Done: single checkpoint save
        // ---------------------------------------------------------------------
        let mut after = if tally.lines_scanned > 0 {
            tally.max_line_seen
        } else {
            range.start_after
        };
        if let Some(first_failed) = tally.first_failed_line {
            after = after.min(first_failed.saturating_sub(1));
        }

        let status = if tally.write_errors > 0 {
            FileStatus::CompletedWithWriteErrors
        } else if tally.lines_scanned > 0 {
            FileStatus::CompletedNewData
        } else {
            FileStatus::CompletedNoNewData
        };
        let checkpoint_status = status
            .checkpoint_status()
            .unwrap_or(CheckpointStatus::CompletedNoNewData);

        let path = tally
            .path
            .take()
            .unwrap_or(checkpoint.log_file_relative_path);
        self.checkpoints.save_checkpoint(
            file_id,
            group_name,
            &path,
            after,
            collector_total,
            checkpoint_status,
        )?;
        tracker.enter(FileState::Done);

        tracing::debug!(
            group = group_name,
            file_id,
            status = %status,
            scanned = tally.lines_scanned,
            parsed = tally.parsed,
            unparsed = tally.unparsed,
            write_errors = tally.write_errors,
            checkpoint = after,
            "File processed"
        );

        Ok(FileReport {
            status,
            path,
            lines_scanned: tally.lines_scanned,
            parsed: tally.parsed,
            unparsed: tally.unparsed,
            write_errors: tally.write_errors,
            checkpoint_before: before,
            checkpoint_after: after,
            error: None,
        })
    }

    /// Page through the range, matching each line and buffering its record.
    fn scan(
        &self,
        job: &FileJob<'_>,
        range: ScanRange,
        tally: &mut ScanTally,
        parsed_buf: &mut WriteBuffer,
        unparsed_buf: &mut WriteBuffer,
    ) -> Result<(), StoreError> {
        let group_name = job.group.name.as_str();
        let mut query = LineQuery {
            file_id: job.file_id.to_string(),
            after_line: range.start_after,
            up_to: range.up_to,
            limit: self.settings.scan_batch_size,
        };

        loop {
            let page = self.store.scan_lines(&job.group.source_index, &query)?;
            let page_len = page.len();

            for line in page {
                // Pages are keyset-ordered; anything at or below the cursor is
                // a store bug and would break checkpoint monotonicity.
                if line.line_number <= query.after_line {
                    tracing::warn!(
                        file_id = job.file_id,
                        line = line.line_number,
                        "Out-of-order line ignored"
                    );
                    continue;
                }
                query.after_line = line.line_number;
                tally.lines_scanned += 1;
                tally.max_line_seen = tally.max_line_seen.max(line.line_number);
                if tally.path.is_none() && !line.path.is_empty() {
                    tally.path = Some(line.path.clone());
                }

                self.handle_line(job, line, tally, parsed_buf, unparsed_buf);

                if parsed_buf.len() >= self.settings.write_batch_size {
                    self.flush(group_name, parsed_buf, tally);
                }
                if unparsed_buf.len() >= self.settings.write_batch_size {
                    self.flush(group_name, unparsed_buf, tally);
                }
            }

            if page_len < self.settings.scan_batch_size {
                break;
            }
        }
        Ok(())
    }

    /// Line Matcher + Derived Field Processor for one line.
    fn handle_line(
        &self,
        job: &FileJob<'_>,
        line: LogLine,
        tally: &mut ScanTally,
        parsed_buf: &mut WriteBuffer,
        unparsed_buf: &mut WriteBuffer,
    ) {
        let group = job.group;
        let line_number = line.line_number;
        let provenance = Provenance::from_line(&line, &group.name);
        let id = provenance.record_id();
        let now = Utc::now();

        match grok::match_line(&line.content, job.matcher) {
            Some(fields) => {
                let ctx = DeriveContext {
                    group: &group.name,
                    file_id: job.file_id,
                    line_number,
                    on_collision: job.spec.on_collision,
                };
                let fields = derive::derive(fields, &job.spec.derived_fields, &ctx);
                tracing::trace!(line = line_number, content = preview(&line.content), "Parsed");
                let body = ParsedRecord { fields, provenance }.into_document(now);
                parsed_buf.push(
                    line_number,
                    BulkAction::Index {
                        index: group.parsed_index.clone(),
                        id,
                        body,
                    },
                );
                tally.parsed += 1;
            }
            None => {
                tracing::trace!(line = line_number, content = preview(&line.content), "Unparsed");
                let body = UnparsedRecord {
                    provenance,
                    reason: constants::REASON_GROK_MISMATCH.to_string(),
                }
                .into_document(now);
                unparsed_buf.push(
                    line_number,
                    BulkAction::Index {
                        index: group.unparsed_index.clone(),
                        id,
                        body,
                    },
                );
                tally.unparsed += 1;
            }
        }
    }

    /// Send a buffer to the store and record which lines failed.
    fn flush(&self, group_name: &str, buffer: &mut WriteBuffer, tally: &mut ScanTally) {
        if buffer.actions.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut buffer.actions);
        let count = batch.len();
        let line_by_id: HashMap<String, u64> = batch
            .iter()
            .map(|(line, action)| (action.id().to_string(), *line))
            .collect();
        let actions: Vec<BulkAction> = batch.into_iter().map(|(_, action)| action).collect();

        match self.store.bulk(actions) {
            Ok(resp) => {
                tracing::trace!(sink = buffer.sink, count, ok = resp.succeeded, "Flushed");
                if resp.failures.is_empty() {
                    return;
                }
                for failure in resp
                    .failures
                    .iter()
                    .take(constants::MAX_LOGGED_WRITE_FAILURES)
                {
                    tracing::warn!(
                        group = group_name,
                        sink = buffer.sink,
                        index = %failure.index,
                        id = %failure.id,
                        reason = %failure.reason,
                        "Write failed"
                    );
                }
                if resp.failures.len() > constants::MAX_LOGGED_WRITE_FAILURES {
                    tracing::warn!(
                        group = group_name,
                        sink = buffer.sink,
                        more = resp.failures.len() - constants::MAX_LOGGED_WRITE_FAILURES,
                        "Further write failures not logged"
                    );
                }
                for failure in &resp.failures {
                    match line_by_id.get(&failure.id) {
                        Some(line) => tally.record_failure(*line),
                        // A failure we cannot attribute poisons the whole batch.
                        None => {
                            if let Some(min) = line_by_id.values().min() {
                                tally.record_failure(*min);
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    group = group_name,
                    sink = buffer.sink,
                    count,
                    error = %e,
                    "Bulk write failed"
                );
                let mut lines: Vec<u64> = line_by_id.into_values().collect();
                lines.sort_unstable();
                for line in lines {
                    tally.record_failure(line);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory_store::MemoryStore;
    use crate::core::store::{line_document, line_document_id};
    use serde_json::json;
    use std::sync::Arc;

    struct Fixture {
        mem: Arc<MemoryStore>,
        checkpoints: CheckpointStore,
        group: LogGroup,
        spec: PatternSpec,
        matcher: GrokMatcher,
    }

    impl Fixture {
        fn new(spec: PatternSpec) -> Self {
            let mem = Arc::new(MemoryStore::new());
            let checkpoints = CheckpointStore::new(mem.clone(), "cp", "collector");
            let matcher = grok::compile("g1", &spec).unwrap();
            Self {
                mem,
                checkpoints,
                group: LogGroup {
                    name: "g1".to_string(),
                    source_index: "logs_g1".to_string(),
                    parsed_index: "parsed_g1".to_string(),
                    unparsed_index: "unparsed_g1".to_string(),
                },
                spec,
                matcher,
            }
        }

        fn level_msg() -> Self {
            Self::new(PatternSpec::new("%{LOGLEVEL:level} %{GREEDYDATA:msg}"))
        }

        /// Append lines and confirm them through the collector status.
        fn append(&self, lines: &[&str]) {
            let start = self
                .checkpoints
                .get_collector_total_lines("f1")
                .unwrap();
            for (i, content) in lines.iter().enumerate() {
                let line = LogLine {
                    file_id: "f1".to_string(),
                    line_number: start + i as u64 + 1,
                    content: content.to_string(),
                    path: "app/f1.log".to_string(),
                };
                self.mem
                    .upsert(
                        &self.group.source_index,
                        &line_document_id(&line),
                        line_document(&line, "g1"),
                    )
                    .unwrap();
            }
            self.set_total(start + lines.len() as u64);
        }

        fn set_total(&self, total: u64) {
            let status = json!({ "log_file_id": "f1", "last_line_number": total });
            self.mem.upsert("collector", "f1", status).unwrap();
        }

        fn run(&self, settings: BatchSettings) -> Result<FileReport, StoreError> {
            let processor = FileProcessor::new(self.mem.as_ref(), &self.checkpoints, settings);
            processor.process(&FileJob {
                group: &self.group,
                file_id: "f1",
                matcher: &self.matcher,
                spec: &self.spec,
            })
        }

        fn checkpoint(&self) -> u64 {
            self.checkpoints
                .get_checkpoint("f1")
                .unwrap()
                .last_line_number_parsed
        }
    }

    fn small_batches() -> BatchSettings {
        BatchSettings {
            scan_batch_size: 2,
            write_batch_size: 2,
        }
    }

    #[test]
    fn test_range_rules() {
        assert_eq!(
            determine_range(0, 3),
            ScanRange { start_after: 0, up_to: Some(3), up_to_date: false, reset: false }
        );
        assert!(determine_range(3, 3).up_to_date);
        let shrunk = determine_range(5, 2);
        assert!(shrunk.reset);
        assert_eq!(shrunk.start_after, 0);
        let vanished = determine_range(5, 0);
        assert!(vanished.reset);
        assert_eq!(vanished.up_to, None);
        assert!(!determine_range(0, 0).up_to_date);
    }

    #[test]
    fn test_state_transitions() {
        use super::FileState::*;
        assert!(Pending.can_transition_to(DeterminingRange));
        assert!(DeterminingRange.can_transition_to(SkippedUpToDate));
        assert!(Scanning.can_transition_to(Flushing));
        assert!(!Pending.can_transition_to(Scanning));
        assert!(!SkippedUpToDate.can_transition_to(Flushing));
        assert!(!Done.can_transition_to(Pending));
    }

    #[test]
    fn test_first_run_splits_parsed_and_unparsed() {
        let fx = Fixture::level_msg();
        fx.append(&["ERROR boom", "not a match!!", "WARN slow"]);

        let report = fx.run(BatchSettings::default()).unwrap();
        assert_eq!(report.status, FileStatus::CompletedNewData);
        assert_eq!((report.parsed, report.unparsed), (2, 1));
        assert_eq!(report.path, "app/f1.log");
        assert_eq!(fx.checkpoint(), 3);

        let doc = fx.mem.get("parsed_g1", "f1_1").unwrap().unwrap();
        assert_eq!(doc["level"], "ERROR");
        assert_eq!(doc["msg"], "boom");
        let bad = fx.mem.get("unparsed_g1", "f1_2").unwrap().unwrap();
        assert_eq!(bad["reason_unparsed"], "grok_mismatch");
        assert!(fx.mem.get("parsed_g1", "f1_2").unwrap().is_none());
    }

    #[test]
    fn test_rerun_skips_and_appends_resume() {
        let fx = Fixture::level_msg();
        fx.append(&["ERROR boom", "not a match!!", "WARN slow"]);
        fx.run(BatchSettings::default()).unwrap();

        let report = fx.run(BatchSettings::default()).unwrap();
        assert_eq!(report.status, FileStatus::SkippedUpToDate);
        assert_eq!(fx.mem.count("parsed_g1") + fx.mem.count("unparsed_g1"), 3);

        fx.append(&["INFO four", "DEBUG five"]);
        let report = fx.run(BatchSettings::default()).unwrap();
        assert_eq!(report.lines_scanned, 2);
        assert_eq!(report.checkpoint_before, 3);
        assert_eq!(fx.checkpoint(), 5);
    }

    #[test]
    fn test_small_batches_write_every_line() {
        let fx = Fixture::level_msg();
        let lines: Vec<String> = (0..7)
            .map(|i| if i % 3 == 0 { format!("junk {i}") } else { format!("INFO line {i}") })
            .collect();
        let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        fx.append(&refs);

        let report = fx.run(small_batches()).unwrap();
        assert_eq!(report.lines_scanned, 7);
        assert_eq!(fx.mem.count("parsed_g1") + fx.mem.count("unparsed_g1"), 7);
        assert_eq!(fx.checkpoint(), 7);
    }

    #[test]
    fn test_scan_bounded_by_collector_total() {
        let fx = Fixture::level_msg();
        fx.append(&["INFO a", "INFO b", "INFO c"]);
        fx.set_total(2);

        let report = fx.run(BatchSettings::default()).unwrap();
        assert_eq!(report.lines_scanned, 2);
        assert_eq!(fx.checkpoint(), 2);
    }

    #[test]
    fn test_write_failure_caps_checkpoint() {
        let fx = Fixture::level_msg();
        fx.append(&["INFO a", "INFO b", "INFO c", "INFO d"]);
        fx.mem.fail_writes_for("f1_3");

        let report = fx.run(small_batches()).unwrap();
        assert_eq!(report.status, FileStatus::CompletedWithWriteErrors);
        assert_eq!(report.write_errors, 1);
        assert_eq!(fx.checkpoint(), 2);
        // Line 4 was still written; the scan did not stop.
        assert!(fx.mem.get("parsed_g1", "f1_4").unwrap().is_some());

        fx.mem.clear_failures();
        let report = fx.run(small_batches()).unwrap();
        assert_eq!(report.status, FileStatus::CompletedNewData);
        assert_eq!(report.lines_scanned, 2);
        assert_eq!(fx.checkpoint(), 4);
        assert_eq!(fx.mem.count("parsed_g1"), 4);
    }

    #[test]
    fn test_truncation_resets_checkpoint() {
        let fx = Fixture::level_msg();
        fx.append(&["INFO a", "INFO b", "INFO c"]);
        fx.run(BatchSettings::default()).unwrap();
        fx.set_total(1);

        let report = fx.run(BatchSettings::default()).unwrap();
        assert_eq!(report.checkpoint_before, 3);
        assert_eq!(report.lines_scanned, 1);
        assert_eq!(fx.checkpoint(), 1);
    }

    #[test]
    fn test_up_to_date_keeps_previous_outcome() {
        let fx = Fixture::level_msg();
        fx.append(&["INFO a", "INFO b", "INFO c", "INFO d"]);
        fx.mem.fail_writes_for("f1_4");
        fx.run(BatchSettings::default()).unwrap();
        let failed = fx.checkpoints.get_checkpoint("f1").unwrap();
        assert_eq!(failed.last_parse_status, CheckpointStatus::CompletedWithWriteErrors);
        assert_eq!(failed.last_line_number_parsed, 3);

        // The collector now only confirms what was parsed.
        fx.set_total(3);
        let report = fx.run(BatchSettings::default()).unwrap();
        assert_eq!(report.status, FileStatus::SkippedUpToDate);
        let cp = fx.checkpoints.get_checkpoint("f1").unwrap();
        assert_eq!(cp.last_parse_status, CheckpointStatus::CompletedWithWriteErrors);
        assert_eq!(cp.last_total_lines_by_collector, 3);
        assert_eq!(cp.last_line_number_parsed, 3);
        assert!(cp.last_parse_timestamp >= failed.last_parse_timestamp);
    }

    #[test]
    fn test_bulk_request_error_mid_file_fails_whole_batch() {
        let fx = Fixture::level_msg();
        fx.append(&["INFO a", "INFO b", "INFO c", "INFO d", "INFO e", "INFO f"]);
        // Lines 1-2 go out in the first flush; the second request drops.
        fx.mem.fail_bulk_requests_from(2);

        let report = fx.run(small_batches()).unwrap();
        assert_eq!(report.status, FileStatus::CompletedWithWriteErrors);
        assert_eq!(report.lines_scanned, 6);
        assert_eq!(report.write_errors, 4);
        assert_eq!(fx.checkpoint(), 2);
        assert!(fx.mem.get("parsed_g1", "f1_2").unwrap().is_some());
        assert!(fx.mem.get("parsed_g1", "f1_3").unwrap().is_none());

        fx.mem.clear_failures();
        let report = fx.run(small_batches()).unwrap();
        assert_eq!(report.checkpoint_before, 2);
        assert_eq!(report.lines_scanned, 4);
        assert_eq!(fx.checkpoint(), 6);
        assert_eq!(fx.mem.count("parsed_g1"), 6);
    }

    #[test]
    fn test_vanished_collector_total_rescans_from_start() {
        let fx = Fixture::level_msg();
        fx.append(&["INFO a", "INFO b", "INFO c"]);
        fx.run(BatchSettings::default()).unwrap();
        assert_eq!(fx.checkpoint(), 3);

        fx.mem.delete("collector", "f1").unwrap();
        let report = fx.run(BatchSettings::default()).unwrap();
        assert_eq!(report.status, FileStatus::CompletedNewData);
        assert_eq!(report.checkpoint_before, 3);
        assert_eq!(report.lines_scanned, 3);
        assert_eq!(fx.checkpoint(), 3);
        let cp = fx.checkpoints.get_checkpoint("f1").unwrap();
        assert_eq!(cp.last_total_lines_by_collector, 0);
    }

    #[test]
    fn test_scan_failure_leaves_checkpoint() {
        let fx = Fixture::level_msg();
        fx.append(&["INFO a"]);
        fx.mem.fail_scans_for("f1");
        assert!(fx.run(BatchSettings::default()).is_err());
        assert_eq!(fx.checkpoint(), 0);
        assert!(fx
            .checkpoints
            .file_ids_for_group("g1")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_derived_fields_applied() {
        let spec = PatternSpec::new("%{LOGLEVEL:level} %{GREEDYDATA:msg}")
            .with_derived("summary", "[{level}] {msg}")
            .with_derived("who", "{user}");
        let fx = Fixture::new(spec);
        fx.append(&["ERROR boom"]);
        fx.run(BatchSettings::default()).unwrap();

        let doc = fx.mem.get("parsed_g1", "f1_1").unwrap().unwrap();
        assert_eq!(doc["summary"], "[ERROR] boom");
        assert!(doc.get("who").is_none());
        assert_eq!(doc["source_line_number"], 1);
    }
}

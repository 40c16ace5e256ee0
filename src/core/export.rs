// LogSift - core/export.rs
//
// CSV and JSON export of checkpoints and run reports, plus the plain-text
// run summary printed by the CLI.
// Core layer: writes to any Write trait object; `target` only labels errors.

use crate::core::model::{ParseCheckpoint, RunReport};
use crate::util::error::ExportError;
use std::io::Write;

fn csv_err(target: &str) -> impl Fn(csv::Error) -> ExportError + '_ {
    move |e| ExportError::Csv {
        target: target.to_string(),
        source: e,
    }
}

/// Export checkpoints to CSV, one row per file.
///
/// Columns: group, file_id, path, last_line_parsed, collector_total,
/// status, last_parsed_at
pub fn export_checkpoints_csv<W: Write>(
    checkpoints: &[ParseCheckpoint],
    writer: W,
    target: &str,
) -> Result<usize, ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record([
            "group",
            "file_id",
            "path",
            "last_line_parsed",
            "collector_total",
            "status",
            "last_parsed_at",
        ])
        .map_err(csv_err(target))?;

    for cp in checkpoints {
        let ts = cp
            .last_parse_timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        csv_writer
            .write_record([
                cp.group_name.as_str(),
                cp.log_file_id.as_str(),
                cp.log_file_relative_path.as_str(),
                &cp.last_line_number_parsed.to_string(),
                &cp.last_total_lines_by_collector.to_string(),
                cp.last_parse_status.as_str(),
                &ts,
            ])
            .map_err(csv_err(target))?;
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        target: target.to_string(),
        source: e,
    })?;

    Ok(checkpoints.len())
}

/// Export checkpoints as a pretty-printed JSON array.
pub fn export_checkpoints_json<W: Write>(
    checkpoints: &[ParseCheckpoint],
    writer: W,
    target: &str,
) -> Result<usize, ExportError> {
    serde_json::to_writer_pretty(writer, checkpoints).map_err(|e| ExportError::Json {
        target: target.to_string(),
        source: e,
    })?;
    Ok(checkpoints.len())
}

/// Export a run report as pretty-printed JSON.
pub fn export_report_json<W: Write>(
    report: &RunReport,
    writer: W,
    target: &str,
) -> Result<(), ExportError> {
    serde_json::to_writer_pretty(writer, report).map_err(|e| ExportError::Json {
        target: target.to_string(),
        source: e,
    })
}

/// Export a run report to CSV, one row per file.
///
/// Groups without files get a single row with empty file columns so
/// failed groups stay visible.
pub fn export_report_csv<W: Write>(
    report: &RunReport,
    writer: W,
    target: &str,
) -> Result<usize, ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer
        .write_record([
            "group",
            "group_status",
            "file_id",
            "path",
            "file_status",
            "lines_scanned",
            "parsed",
            "unparsed",
            "write_errors",
            "checkpoint_after",
            "error",
        ])
        .map_err(csv_err(target))?;

    let mut rows = 0;
    for (group_name, group) in &report.groups {
        if group.files.is_empty() {
            let error = group.errors.join("; ");
            csv_writer
                .write_record([
                    group_name.as_str(),
                    group.status.as_str(),
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    "",
                    error.as_str(),
                ])
                .map_err(csv_err(target))?;
            rows += 1;
            continue;
        }
        for (file_id, file) in &group.files {
            csv_writer
                .write_record([
                    group_name.as_str(),
                    group.status.as_str(),
                    file_id.as_str(),
                    file.path.as_str(),
                    file.status.as_str(),
                    &file.lines_scanned.to_string(),
                    &file.parsed.to_string(),
                    &file.unparsed.to_string(),
                    &file.write_errors.to_string(),
                    &file.checkpoint_after.to_string(),
                    file.error.as_deref().unwrap_or(""),
                ])
                .map_err(csv_err(target))?;
            rows += 1;
        }
    }

    csv_writer.flush().map_err(|e| ExportError::Io {
        target: target.to_string(),
        source: e,
    })?;
    Ok(rows)
}

/// Write a human-readable run summary: a totals line, then each group with
/// its errors and one line of counts per file.
pub fn export_report_summary<W: Write>(
    report: &RunReport,
    mut writer: W,
    target: &str,
) -> Result<(), ExportError> {
    let io_err = |e| ExportError::Io {
        target: target.to_string(),
        source: e,
    };
    let totals = report.totals();
    writeln!(
        writer,
        "run {}: {} groups, {} files, {} lines, {} parsed, {} unparsed, {} write errors ({} ms)",
        report.status,
        report.groups.len(),
        totals.files,
        totals.lines_scanned,
        totals.parsed,
        totals.unparsed,
        totals.write_errors,
        report.duration_ms
    )
    .map_err(io_err)?;

    for (name, group) in &report.groups {
        writeln!(writer, "  {name}: {} ({} files)", group.status, group.files.len())
            .map_err(io_err)?;
        for error in &group.errors {
            writeln!(writer, "    error: {error}").map_err(io_err)?;
        }
        for (file_id, file) in &group.files {
            write!(
                writer,
                "    {} [{file_id}]: {} scanned={} parsed={} unparsed={} \
                 write_errors={} checkpoint={}->{}",
                file.path,
                file.status,
                file.lines_scanned,
                file.parsed,
                file.unparsed,
                file.write_errors,
                file.checkpoint_before,
                file.checkpoint_after
            )
            .map_err(io_err)?;
            if let Some(error) = &file.error {
                write!(writer, " ({error})").map_err(io_err)?;
            }
            writeln!(writer).map_err(io_err)?;
        }
    }
    writer.flush().map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{
        CheckpointStatus, FileReport, FileStatus, GroupReport, GroupStatus, RunStatus,
    };
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn make_checkpoint(id: &str, line: u64) -> ParseCheckpoint {
        ParseCheckpoint {
            log_file_id: id.to_string(),
            group_name: "web".to_string(),
            log_file_relative_path: format!("{id}.log"),
            last_line_number_parsed: line,
            last_total_lines_by_collector: line,
            last_parse_timestamp: Some(Utc::now()),
            last_parse_status: CheckpointStatus::CompletedNewData,
        }
    }

    fn make_report() -> RunReport {
        let mut files = BTreeMap::new();
        files.insert(
            "f1".to_string(),
            FileReport {
                status: FileStatus::CompletedNewData,
                path: "a.log".to_string(),
                lines_scanned: 3,
                parsed: 2,
                unparsed: 1,
                write_errors: 0,
                checkpoint_before: 0,
                checkpoint_after: 3,
                error: None,
            },
        );
        let mut groups = BTreeMap::new();
        groups.insert(
            "web".to_string(),
            GroupReport {
                status: GroupStatus::Completed,
                errors: Vec::new(),
                files,
            },
        );
        groups.insert(
            "db".to_string(),
            GroupReport::failed(GroupStatus::FailedNoPattern, "no pattern".to_string()),
        );
        let now = Utc::now();
        RunReport {
            status: RunStatus::Completed,
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            groups,
        }
    }

    #[test]
    fn test_checkpoints_csv_export() {
        let cps = vec![make_checkpoint("f1", 3), make_checkpoint("f2", 9)];
        let mut buf = Vec::new();
        let count = export_checkpoints_csv(&cps, &mut buf, "out.csv").unwrap();
        assert_eq!(count, 2);

        let output = String::from_utf8(buf).unwrap();
        assert!(output.starts_with("group,file_id,path"));
        assert!(output.contains("web,f2,f2.log,9,9,completed_new_data"));
    }

    #[test]
    fn test_checkpoints_json_export() {
        let cps = vec![make_checkpoint("f1", 3)];
        let mut buf = Vec::new();
        export_checkpoints_json(&cps, &mut buf, "out.json").unwrap();
        let parsed: Vec<ParseCheckpoint> = serde_json::from_slice(&buf).unwrap();
        assert_eq!(parsed, cps);
    }

    #[test]
    fn test_report_csv_keeps_failed_groups() {
        let mut buf = Vec::new();
        let rows = export_report_csv(&make_report(), &mut buf, "report.csv").unwrap();
        assert_eq!(rows, 2);
        let output = String::from_utf8(buf).unwrap();
        assert!(output.contains("db,failed_no_pattern"));
        assert!(output.contains("web,completed,f1,a.log,completed_new_data,3,2,1,0,3,"));
    }

    #[test]
    fn test_summary_lists_every_file() {
        let mut report = make_report();
        if let Some(web) = report.groups.get_mut("web") {
            web.files.insert(
                "f2".to_string(),
                FileReport {
                    path: "b.log".to_string(),
                    ..FileReport::untouched(FileStatus::Failed, Some("boom".to_string()))
                },
            );
        }

        let mut buf = Vec::new();
        export_report_summary(&report, &mut buf, "stdout").unwrap();
        let output = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert!(lines[0].starts_with("run completed: 2 groups, 2 files, 3 lines, 2 parsed"));
        assert!(output.contains("    error: no pattern"));
        assert!(output.contains(
            "    a.log [f1]: completed_new_data scanned=3 parsed=2 unparsed=1 \
             write_errors=0 checkpoint=0->3\n"
        ));
        assert!(output.contains("    b.log [f2]: failed scanned=0"));
        assert!(output.contains("checkpoint=0->0 (boom)"));
    }

    #[test]
    fn test_report_json_export() {
        let mut buf = Vec::new();
        export_report_json(&make_report(), &mut buf, "report.json").unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value["status"], "completed");
        assert_eq!(value["groups"]["web"]["files"]["f1"]["parsed"], 2);
    }
}

// LogSift - app/run.rs
//
// Run Orchestrator: selects groups, optionally resets them, and runs each
// on a bounded worker pool.
//
// Architecture:
//   - One `rayon::ThreadPool` per orchestrator, sized by `worker_threads`.
//   - Each group is a pool task; its files fan out on the same pool.
//   - Group reports flow back over one mpsc channel drained by the calling
//     thread, which alone builds the result map.
//   - An `Arc<AtomicBool>` cancel flag is checked before every group and
//     every file. Work already started runs to its checkpoint save.

use crate::app::checkpoint::CheckpointStore;
use crate::app::file_processor::BatchSettings;
use crate::app::group::{list_groups, resolve_group, FileClaims, GroupOrchestrator, IndexSettings};
use crate::core::model::{GroupReport, ParseCheckpoint, ResetSummary, RunReport, RunStatus};
use crate::core::pattern::{PatternRegistry, PatternSource};
use crate::core::store::DocumentStore;
use crate::util::error::{LogSiftError, StoreError};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

// =============================================================================
// Group filter
// =============================================================================

/// Selects groups by exact name or glob pattern. Empty selects everything.
#[derive(Debug, Clone, Default)]
pub struct GroupFilter {
    names: Vec<String>,
    patterns: Vec<glob::Pattern>,
}

fn is_glob(s: &str) -> bool {
    s.contains(|c: char| matches!(c, '*' | '?' | '['))
}

impl GroupFilter {
    /// A filter matching every group.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a filter from CLI/API entries. Entries containing glob
    /// metacharacters are compiled as patterns; an invalid pattern is
    /// logged and kept as an exact name.
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut filter = Self::default();
        for entry in entries {
            let entry = entry.as_ref();
            if is_glob(entry) {
                match glob::Pattern::new(entry) {
                    Ok(p) => {
                        filter.patterns.push(p);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(
                            filter = entry,
                            error = %e,
                            "Invalid group glob; matching literally"
                        );
                    }
                }
            }
            filter.names.push(entry.to_string());
        }
        filter
    }

    pub fn is_all(&self) -> bool {
        self.names.is_empty() && self.patterns.is_empty()
    }

    pub fn matches(&self, group_name: &str) -> bool {
        self.is_all()
            || self.names.iter().any(|n| n == group_name)
            || self.patterns.iter().any(|p| p.matches(group_name))
    }

    /// Names given literally (they select a group even if the store does
    /// not list it).
    pub fn exact_names(&self) -> &[String] {
        &self.names
    }
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct RunSettings {
    pub batch: BatchSettings,
    /// 0 = one worker per CPU core.
    pub worker_threads: usize,
    pub indices: IndexSettings,
}

// =============================================================================
// Run Orchestrator
// =============================================================================

pub struct RunOrchestrator {
    store: Arc<dyn DocumentStore>,
    checkpoints: CheckpointStore,
    registry: PatternRegistry,
    claims: FileClaims,
    settings: RunSettings,
    pool: rayon::ThreadPool,
    cancel: Arc<AtomicBool>,
}

impl RunOrchestrator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        patterns: Arc<dyn PatternSource>,
        settings: RunSettings,
    ) -> Result<Self, LogSiftError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.worker_threads)
            .thread_name(|i| format!("logsift-worker-{i}"))
            .build()
            .map_err(|e| LogSiftError::WorkerPool {
                reason: e.to_string(),
            })?;

        tracing::debug!(workers = pool.current_num_threads(), "Worker pool ready");

        let checkpoints = CheckpointStore::new(
            Arc::clone(&store),
            settings.indices.checkpoint_index.clone(),
            settings.indices.collector_index.clone(),
        );

        Ok(Self {
            store,
            checkpoints,
            registry: PatternRegistry::new(patterns),
            claims: FileClaims::new(),
            settings,
            pool,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared cancel flag; setting it stops the run at the next file boundary.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        tracing::info!("Cancellation requested");
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn registry(&self) -> &PatternRegistry {
        &self.registry
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Store reachability and checkpoint index. The only fatal check.
    fn startup_check(&self) -> Result<(), StoreError> {
        self.store.ping()?;
        self.checkpoints.ensure_index()
    }

    /// `run(group_filter?, reset_first?)`.
    ///
    /// Returns `Err` only when the store is unreachable at startup (or the
    /// explicit reset step cannot reach it). Every other failure is in the
    /// report.
    pub fn run(&self, filter: &GroupFilter, reset_first: bool) -> Result<RunReport, StoreError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        self.cancel.store(false, Ordering::SeqCst);

        if let Err(e) = self.startup_check() {
            tracing::error!(error = %e, "Document store unreachable; run aborted");
            return Err(e);
        }

        if reset_first {
            self.reset(filter)?;
        }

        let groups: Vec<String> = list_groups(self.store.as_ref(), &self.settings.indices)?
            .into_iter()
            .filter(|g| filter.matches(g))
            .collect();

        tracing::info!(groups = groups.len(), reset_first, "Run started");

        if groups.is_empty() {
            tracing::info!("No groups to process");
            let groups = BTreeMap::new();
            return Ok(self.finish(RunStatus::CompletedNoGroups, started_at, clock, groups));
        }

        let orchestrator = GroupOrchestrator {
            store: self.store.as_ref(),
            checkpoints: &self.checkpoints,
            registry: &self.registry,
            claims: &self.claims,
            indices: &self.settings.indices,
            batch: self.settings.batch,
            cancel: self.cancel.as_ref(),
        };

        let (tx, rx) = mpsc::channel::<(String, GroupReport)>();
        self.pool.scope(|scope| {
            for group in &groups {
                let tx = tx.clone();
                let orchestrator = &orchestrator;
                scope.spawn(move |_| {
                    let report = orchestrator.run_group(group);
                    // The receiver lives until after the scope; a send
                    // failure cannot happen here.
                    let _ = tx.send((group.clone(), report));
                });
            }
        });
        drop(tx);

        let mut results = BTreeMap::new();
        for (name, report) in rx {
            results.insert(name, report);
        }

        let status = if self.cancel.load(Ordering::SeqCst) {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        Ok(self.finish(status, started_at, clock, results))
    }

    fn finish(
        &self,
        status: RunStatus,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
        groups: BTreeMap<String, GroupReport>,
    ) -> RunReport {
        let report = RunReport {
            status,
            started_at,
            finished_at: Utc::now(),
            duration_ms: clock.elapsed().as_millis() as u64,
            groups,
        };
        let totals = report.totals();
        tracing::info!(
            status = status.as_str(),
            groups = report.groups.len(),
            failed_groups = totals.failed_groups,
            files = totals.files,
            scanned = totals.lines_scanned,
            parsed = totals.parsed,
            unparsed = totals.unparsed,
            write_errors = totals.write_errors,
            duration_ms = report.duration_ms,
            "Run complete"
        );
        report
    }

    /// Every group the store knows about: registered groups plus groups
    /// that still have checkpoints.
    fn known_groups(&self) -> Result<BTreeSet<String>, StoreError> {
        let mut names: BTreeSet<String> =
            list_groups(self.store.as_ref(), &self.settings.indices)?
                .into_iter()
                .collect();
        for cp in self.checkpoints.list()? {
            if !cp.group_name.is_empty() {
                names.insert(cp.group_name);
            }
        }
        Ok(names)
    }

    /// `reset(group_filter | all)`: delete parsed and unparsed output and the
    /// checkpoints of the selected groups. Source lines are never touched.
    pub fn reset(&self, filter: &GroupFilter) -> Result<ResetSummary, StoreError> {
        let mut selected: BTreeSet<String> = self
            .known_groups()?
            .into_iter()
            .filter(|g| filter.matches(g))
            .collect();
        selected.extend(filter.exact_names().iter().cloned());

        let mut summary = ResetSummary::default();
        for group_name in selected {
            let group = resolve_group(self.store.as_ref(), &self.settings.indices, &group_name)?;

            for index in [&group.parsed_index, &group.unparsed_index] {
                match self.store.delete_index(index) {
                    Ok(true) => summary.indices_deleted += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(
                            group = %group_name,
                            index = %index,
                            error = %e,
                            "Index delete failed"
                        );
                    }
                }
            }

            let file_ids = self.checkpoints.file_ids_for_group(&group_name)?;
            let (ok, failed) = self.checkpoints.delete_checkpoints(&file_ids);
            summary.checkpoints_deleted += ok;
            summary.checkpoint_errors += failed;

            tracing::info!(
                group = %group_name,
                checkpoints = ok,
                "Group reset"
            );
            summary.groups.push(group_name);
        }
        Ok(summary)
    }

    /// `list_checkpoints(group_filter?)`, sorted by group then path.
    pub fn list_checkpoints(
        &self,
        filter: &GroupFilter,
    ) -> Result<Vec<ParseCheckpoint>, StoreError> {
        Ok(self
            .checkpoints
            .list()?
            .into_iter()
            .filter(|cp| filter.matches(&cp.group_name))
            .collect())
    }
}

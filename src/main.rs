// LogSift - main.rs
//
// Command-line entry point. Handles:
// 1. CLI argument parsing
// 2. config.toml loading and logging initialisation
// 3. Pattern loading and store snapshot open/save
// 4. Dispatch to collect / run / reset / checkpoints / patterns
//
// Exit codes: 0 = success, 1 = finished but some group or file failed,
// 2 = fatal (store unreachable, bad arguments, unreadable snapshot).

use clap::{Parser, Subcommand, ValueEnum};
use logsift::app::collect::Collector;
use logsift::app::pattern_mgr;
use logsift::app::run::{GroupFilter, RunOrchestrator};
use logsift::core::export;
use logsift::core::model::RunStatus;
use logsift::core::pattern::{PatternCatalog, PatternRegistry, PatternSource};
use logsift::core::store::DocumentStore;
use logsift::platform::config::{self, AppConfig, PlatformPaths};
use logsift::platform::json_store::JsonFileStore;
use logsift::util::{constants, error::LogSiftError, logging};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// LogSift - incremental, checkpointed grok log parser.
///
/// Reads raw log lines from per-group source indices, matches them against
/// each group's grok pattern and writes parsed and unparsed records, resuming
/// from a per-file checkpoint on every run.
#[derive(Parser, Debug)]
#[command(name = "logsift", version, about)]
struct Cli {
    /// Path to config.toml (default: platform config directory).
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Store snapshot file (overrides [store] path).
    #[arg(short = 's', long = "store", global = true)]
    store: Option<PathBuf>,

    /// Pattern directory (overrides [patterns] directory).
    #[arg(short = 'p', long = "patterns", global = true)]
    patterns: Option<PathBuf>,

    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect new lines from a directory of log files into a group.
    Collect {
        #[arg(short, long)]
        group: String,
        #[arg(long)]
        dir: PathBuf,
    },

    /// Parse new lines for every selected group.
    Run {
        /// Group name or glob; repeatable. Default: every group.
        #[arg(short, long = "group")]
        groups: Vec<String>,
        /// Reset the selected groups before parsing.
        #[arg(long)]
        reset: bool,
        /// Worker threads (0 = one per core).
        #[arg(short, long)]
        workers: Option<usize>,
        #[arg(long, value_enum, default_value_t = ReportFormat::Summary)]
        format: ReportFormat,
        /// Write the report here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete parsed output and checkpoints so groups re-parse from line 1.
    Reset {
        #[arg(short, long = "group", required_unless_present = "all")]
        groups: Vec<String>,
        #[arg(long, conflicts_with = "groups")]
        all: bool,
    },

    /// List parse checkpoints.
    Checkpoints {
        #[arg(short, long = "group")]
        groups: Vec<String>,
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load and compile every pattern, reporting problems.
    Patterns,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReportFormat {
    Summary,
    Json,
    Csv,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExportFormat {
    Json,
    Csv,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let platform_paths = PlatformPaths::resolve();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| platform_paths.config_file());
    let (app_config, config_warnings) = config::load_config(&config_path);

    logging::init(
        cli.debug,
        app_config.log_level.as_deref(),
        app_config.log_file.as_deref(),
    );
    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        "{} starting",
        constants::APP_NAME
    );
    for warning in &config_warnings {
        tracing::warn!(warning = %warning, "Config warning");
    }

    match execute(&cli, &app_config, &platform_paths) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

fn execute(
    cli: &Cli,
    app_config: &AppConfig,
    paths: &PlatformPaths,
) -> Result<ExitCode, LogSiftError> {
    let store_path = cli
        .store
        .clone()
        .or_else(|| app_config.store_path.clone())
        .unwrap_or_else(|| paths.store_file());
    let store = Arc::new(JsonFileStore::open(&store_path)?);

    match &cli.command {
        Command::Collect { group, dir } => {
            let summary = Collector::new(store.as_ref(), &app_config.indices).collect(
                group,
                dir,
                &app_config.collect,
            )?;
            store.save()?;
            for warning in &summary.warnings {
                eprintln!("warning: {warning}");
            }
            println!(
                "{group}: {} files, {} new lines",
                summary.files.len(),
                summary.lines_added
            );
            Ok(exit_for(summary.write_errors == 0))
        }

        Command::Run {
            groups,
            reset,
            workers,
            format,
            output,
        } => {
            let mut settings = app_config.run_settings();
            if let Some(n) = workers {
                settings.worker_threads = (*n).min(constants::ABSOLUTE_MAX_WORKER_THREADS);
            }
            let patterns = load_patterns(cli, app_config, paths);
            let shared: Arc<dyn DocumentStore> = store.clone();
            let orchestrator = RunOrchestrator::new(shared, patterns, settings)?;

            let report = orchestrator.run(&GroupFilter::new(groups), *reset)?;
            store.save()?;

            let target = target_name(output.as_deref());
            let writer = open_output(output.as_deref())?;
            match format {
                ReportFormat::Summary => export::export_report_summary(&report, writer, &target)?,
                ReportFormat::Json => export::export_report_json(&report, writer, &target)?,
                ReportFormat::Csv => {
                    export::export_report_csv(&report, writer, &target)?;
                }
            }

            let clean = report.status == RunStatus::Completed
                || report.status == RunStatus::CompletedNoGroups;
            let clean = clean && report.groups.values().all(|g| !g.status.is_failure());
            Ok(exit_for(clean))
        }

        Command::Reset { groups, all } => {
            let filter = if *all {
                GroupFilter::all()
            } else {
                GroupFilter::new(groups)
            };
            let shared: Arc<dyn DocumentStore> = store.clone();
            let orchestrator = RunOrchestrator::new(
                shared,
                Arc::new(PatternCatalog::new()),
                app_config.run_settings(),
            )?;
            let summary = orchestrator.reset(&filter)?;
            store.save()?;
            println!(
                "reset {} groups: {} indices and {} checkpoints deleted",
                summary.groups.len(),
                summary.indices_deleted,
                summary.checkpoints_deleted
            );
            Ok(exit_for(summary.checkpoint_errors == 0))
        }

        Command::Checkpoints {
            groups,
            format,
            output,
        } => {
            let shared: Arc<dyn DocumentStore> = store.clone();
            let orchestrator = RunOrchestrator::new(
                shared,
                Arc::new(PatternCatalog::new()),
                app_config.run_settings(),
            )?;
            let checkpoints = orchestrator.list_checkpoints(&GroupFilter::new(groups))?;
            let target = target_name(output.as_deref());
            let writer = open_output(output.as_deref())?;
            match format {
                ExportFormat::Json => {
                    export::export_checkpoints_json(&checkpoints, writer, &target)?
                }
                ExportFormat::Csv => {
                    export::export_checkpoints_csv(&checkpoints, writer, &target)?
                }
            };
            Ok(ExitCode::SUCCESS)
        }

        Command::Patterns => {
            let dir = patterns_dir(cli, app_config, paths);
            let (catalog, errors) = pattern_mgr::load_pattern_dir(&dir);
            for err in &errors {
                eprintln!("error: {err}");
            }
            let names: Vec<String> = catalog.group_names().iter().map(|s| s.to_string()).collect();
            let registry = PatternRegistry::new(Arc::new(catalog));
            let mut ok = errors.is_empty();
            for name in &names {
                let Some(spec) = registry.get_pattern_spec(name) else {
                    println!("{name}: no pattern");
                    continue;
                };
                match registry.get_compiled_matcher(name, &spec) {
                    Ok(matcher) => {
                        println!("{name}: ok ({} fields)", matcher.field_names().len());
                    }
                    Err(e) => {
                        ok = false;
                        println!("{name}: {e}");
                    }
                }
            }
            Ok(exit_for(ok))
        }
    }
}

fn exit_for(clean: bool) -> ExitCode {
    if clean {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}

fn patterns_dir(cli: &Cli, app_config: &AppConfig, paths: &PlatformPaths) -> PathBuf {
    cli.patterns
        .clone()
        .or_else(|| app_config.patterns_dir.clone())
        .unwrap_or_else(|| paths.patterns_dir.clone())
}

/// Load the pattern directory. Bad files are logged and skipped; their
/// groups then fail with `failed_no_pattern`.
fn load_patterns(
    cli: &Cli,
    app_config: &AppConfig,
    paths: &PlatformPaths,
) -> Arc<dyn PatternSource> {
    let dir = patterns_dir(cli, app_config, paths);
    let (catalog, errors) = pattern_mgr::load_pattern_dir(&dir);
    for err in &errors {
        tracing::warn!(error = %err, "Pattern loading warning");
    }
    tracing::info!(dir = %dir.display(), groups = catalog.len(), "Patterns loaded");
    Arc::new(catalog)
}

fn target_name(output: Option<&Path>) -> String {
    output.map_or_else(|| "stdout".to_string(), |p| p.display().to_string())
}

fn open_output(output: Option<&Path>) -> Result<Box<dyn Write>, LogSiftError> {
    match output {
        Some(path) => {
            let file = std::fs::File::create(path).map_err(|e| {
                logsift::util::error::ExportError::Io {
                    target: path.display().to_string(),
                    source: e,
                }
            })?;
            Ok(Box::new(std::io::BufWriter::new(file)))
        }
        None => Ok(Box::new(std::io::stdout().lock())),
    }
}

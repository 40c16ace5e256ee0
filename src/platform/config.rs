// LogSift - platform/config.rs
//
// Platform directory resolution and config.toml loading with startup
// validation. Every value is checked against the named constants; an
// invalid value produces an actionable warning and falls back to its
// default so a typo never stops a run.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::app::collect::CollectConfig;
use crate::app::file_processor::BatchSettings;
use crate::app::group::IndexSettings;
use crate::app::run::RunSettings;
use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for LogSift configuration and data.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Directory holding config.toml (e.g. ~/.config/logsift/).
    pub config_dir: PathBuf,

    /// Default pattern directory (e.g. ~/.config/logsift/patterns/).
    pub patterns_dir: PathBuf,

    /// Data directory holding the store snapshot.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to the current directory if platform dirs cannot be determined.
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let patterns_dir = config_dir.join(constants::PATTERNS_DIR_NAME);
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                patterns = %patterns_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                patterns_dir,
                data_dir,
            }
        } else {
            tracing::warn!("Could not determine platform directories, using current directory");
            let fallback = PathBuf::from(".");
            Self {
                config_dir: fallback.clone(),
                patterns_dir: fallback.join(constants::PATTERNS_DIR_NAME),
                data_dir: fallback,
            }
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(constants::CONFIG_FILE_NAME)
    }

    pub fn store_file(&self) -> PathBuf {
        self.data_dir.join(constants::STORE_FILE_NAME)
    }
}

// =============================================================================
// config.toml shape
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are ignored so a newer config file still loads in an older
/// binary.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub store: StoreSection,
    pub patterns: PatternsSection,
    pub parsing: ParsingSection,
    pub indices: IndicesSection,
    pub collect: CollectSection,
    pub logging: LoggingSection,
}

/// `[store]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Path of the JSON store snapshot.
    pub path: Option<String>,
}

/// `[patterns]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct PatternsSection {
    /// Directory of `*.toml` pattern files.
    pub directory: Option<String>,
}

/// `[parsing]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ParsingSection {
    /// Source lines fetched per scan page.
    pub scan_batch_size: Option<usize>,
    /// Output documents per bulk write.
    pub write_batch_size: Option<usize>,
    /// Number of worker threads (0 = auto).
    pub worker_threads: Option<usize>,
}

/// `[indices]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct IndicesSection {
    pub checkpoint_index: Option<String>,
    pub collector_index: Option<String>,
    pub groups_index: Option<String>,
    pub source_prefix: Option<String>,
    pub parsed_prefix: Option<String>,
    pub unparsed_prefix: Option<String>,
}

/// `[collect]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct CollectSection {
    pub max_depth: Option<usize>,
    pub max_files: Option<usize>,
    pub include_patterns: Option<Vec<String>>,
    pub exclude_patterns: Option<Vec<String>>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

// =============================================================================
// Validated configuration
// =============================================================================

/// Validated application configuration derived from `config.toml`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Store snapshot override; `None` uses the platform data directory.
    pub store_path: Option<PathBuf>,
    /// Pattern directory override; `None` uses the platform config directory.
    pub patterns_dir: Option<PathBuf>,

    pub scan_batch_size: usize,
    pub write_batch_size: usize,
    pub worker_threads: usize,

    pub indices: IndexSettings,
    pub collect: CollectConfig,

    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            patterns_dir: None,
            scan_batch_size: constants::DEFAULT_SCAN_BATCH_SIZE,
            write_batch_size: constants::DEFAULT_WRITE_BATCH_SIZE,
            worker_threads: constants::DEFAULT_WORKER_THREADS,
            indices: IndexSettings::default(),
            collect: CollectConfig::default(),
            log_level: None,
            log_file: None,
        }
    }
}

impl AppConfig {
    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            batch: BatchSettings {
                scan_batch_size: self.scan_batch_size,
                write_batch_size: self.write_batch_size,
            },
            worker_threads: self.worker_threads,
            indices: self.indices.clone(),
        }
    }
}

fn out_of_range(field: &str, value: impl ToString, expected: String) -> String {
    ConfigError::ValueOutOfRange {
        field: field.to_string(),
        value: value.to_string(),
        expected,
    }
    .to_string()
}

/// Check `value` against `min..=max`; on failure record a warning and keep
/// the default already in `target`.
fn validate_range(
    field: &str,
    value: Option<usize>,
    min: usize,
    max: usize,
    target: &mut usize,
    warnings: &mut Vec<String>,
) {
    if let Some(v) = value {
        if (min..=max).contains(&v) {
            *target = v;
        } else {
            warnings.push(out_of_range(
                field,
                v,
                format!("{min}-{max}; using default ({target})"),
            ));
        }
    }
}

fn validate_index_name(
    field: &str,
    value: Option<&String>,
    target: &mut String,
    warnings: &mut Vec<String>,
) {
    if let Some(name) = value {
        if !name.is_empty() && !name.contains(char::is_whitespace) {
            *target = name.clone();
        } else {
            warnings.push(out_of_range(
                field,
                name,
                format!("a non-empty name without spaces; using default ({target})"),
            ));
        }
    }
}

fn validate_globs(field: &str, patterns: &[String], warnings: &mut Vec<String>) -> bool {
    let mut ok = true;
    for p in patterns {
        if let Err(e) = glob::Pattern::new(p) {
            warnings.push(out_of_range(field, p, format!("a valid glob ({e}); using defaults")));
            ok = false;
        }
    }
    ok
}

/// Load and validate the config file at `config_path`.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// A missing file yields defaults with no warnings (first run). An unreadable
/// or unparseable file yields defaults with one warning.
pub fn load_config(config_path: &Path) -> (AppConfig, Vec<String>) {
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let content = match std::fs::read_to_string(config_path) {
        Ok(c) => c,
        Err(e) => {
            let err = ConfigError::Io {
                path: config_path.to_path_buf(),
                source: e,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    let raw: RawConfig = match toml::from_str(&content) {
        Ok(r) => r,
        Err(e) => {
            let err = ConfigError::TomlParse {
                path: config_path.to_path_buf(),
                source: e,
            };
            let msg = format!("{err}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");

    let mut config = AppConfig::default();

    // -- Paths --
    config.store_path = raw.store.path.filter(|p| !p.is_empty()).map(PathBuf::from);
    config.patterns_dir = raw
        .patterns
        .directory
        .filter(|p| !p.is_empty())
        .map(PathBuf::from);

    // -- Parsing --
    validate_range(
        "parsing.scan_batch_size",
        raw.parsing.scan_batch_size,
        constants::MIN_SCAN_BATCH_SIZE,
        constants::ABSOLUTE_MAX_SCAN_BATCH_SIZE,
        &mut config.scan_batch_size,
        &mut warnings,
    );
    validate_range(
        "parsing.write_batch_size",
        raw.parsing.write_batch_size,
        constants::MIN_WRITE_BATCH_SIZE,
        constants::ABSOLUTE_MAX_WRITE_BATCH_SIZE,
        &mut config.write_batch_size,
        &mut warnings,
    );
    validate_range(
        "parsing.worker_threads",
        raw.parsing.worker_threads,
        0,
        constants::ABSOLUTE_MAX_WORKER_THREADS,
        &mut config.worker_threads,
        &mut warnings,
    );

    // -- Indices --
    let idx = &raw.indices;
    let target = &mut config.indices;
    validate_index_name(
        "indices.checkpoint_index",
        idx.checkpoint_index.as_ref(),
        &mut target.checkpoint_index,
        &mut warnings,
    );
    validate_index_name(
        "indices.collector_index",
        idx.collector_index.as_ref(),
        &mut target.collector_index,
        &mut warnings,
    );
    validate_index_name(
        "indices.groups_index",
        idx.groups_index.as_ref(),
        &mut target.groups_index,
        &mut warnings,
    );
    validate_index_name(
        "indices.source_prefix",
        idx.source_prefix.as_ref(),
        &mut target.source_prefix,
        &mut warnings,
    );
    validate_index_name(
        "indices.parsed_prefix",
        idx.parsed_prefix.as_ref(),
        &mut target.parsed_prefix,
        &mut warnings,
    );
    validate_index_name(
        "indices.unparsed_prefix",
        idx.unparsed_prefix.as_ref(),
        &mut target.unparsed_prefix,
        &mut warnings,
    );

    // -- Collect --
    validate_range(
        "collect.max_depth",
        raw.collect.max_depth,
        1,
        constants::ABSOLUTE_MAX_DEPTH,
        &mut config.collect.max_depth,
        &mut warnings,
    );
    validate_range(
        "collect.max_files",
        raw.collect.max_files,
        constants::MIN_MAX_FILES,
        constants::ABSOLUTE_MAX_FILES,
        &mut config.collect.max_files,
        &mut warnings,
    );
    if let Some(include) = raw.collect.include_patterns {
        if validate_globs("collect.include_patterns", &include, &mut warnings) {
            config.collect.include_patterns = include;
        }
    }
    if let Some(exclude) = raw.collect.exclude_patterns {
        if validate_globs("collect.exclude_patterns", &exclude, &mut warnings) {
            config.collect.exclude_patterns = exclude;
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.to_lowercase());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    // -- Logging: file --
    if let Some(ref file) = raw.logging.file {
        if !file.is_empty() {
            config.log_file = Some(file.clone());
        }
    }

    if !warnings.is_empty() {
        tracing::warn!(count = warnings.len(), "Config validation produced warnings");
    }

    (config, warnings)
}

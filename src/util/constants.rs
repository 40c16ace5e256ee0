// LogSift - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "LogSift";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "LogSift";

/// Current application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Scan and write batching
// =============================================================================

/// Number of source lines fetched per page while scanning a file.
pub const DEFAULT_SCAN_BATCH_SIZE: usize = 1_000;

/// Smallest accepted scan page size.
pub const MIN_SCAN_BATCH_SIZE: usize = 1;

/// Hard upper bound on the scan page size.
pub const ABSOLUTE_MAX_SCAN_BATCH_SIZE: usize = 10_000;

/// Number of buffered write actions (per sink) that triggers a bulk flush.
///
/// Independent of the scan page size: a page may trigger several flushes, or
/// several pages may accumulate into one.
pub const DEFAULT_WRITE_BATCH_SIZE: usize = 500;

/// Smallest accepted write batch size.
pub const MIN_WRITE_BATCH_SIZE: usize = 1;

/// Hard upper bound on the write batch size.
pub const ABSOLUTE_MAX_WRITE_BATCH_SIZE: usize = 10_000;

/// Default number of worker threads. 0 means one per available CPU core.
pub const DEFAULT_WORKER_THREADS: usize = 0;

/// Hard upper bound on configured worker threads.
pub const ABSOLUTE_MAX_WORKER_THREADS: usize = 256;

/// Maximum number of individual bulk failures included in a warning log.
pub const MAX_LOGGED_WRITE_FAILURES: usize = 5;

// =============================================================================
// Index naming
// =============================================================================

/// Index holding one checkpoint document per log file.
pub const DEFAULT_CHECKPOINT_INDEX: &str = "parser_checkpoints";

/// Index holding the upstream collector's per-file status documents.
pub const DEFAULT_COLLECTOR_INDEX: &str = "collector_status";

/// Index holding one document per known log group.
pub const DEFAULT_GROUPS_INDEX: &str = "log_groups";

/// Prefix of the per-group raw line index.
pub const DEFAULT_SOURCE_PREFIX: &str = "logs_";

/// Prefix of the per-group parsed output index.
pub const DEFAULT_PARSED_PREFIX: &str = "parsed_";

/// Prefix of the per-group unparsed output index.
pub const DEFAULT_UNPARSED_PREFIX: &str = "unparsed_";

// =============================================================================
// Pattern limits
// =============================================================================

/// Maximum size of a pattern TOML file in bytes.
pub const MAX_PATTERN_FILE_SIZE: u64 = 256 * 1024; // 256 KB

/// Maximum length of a grok expression before expansion.
pub const MAX_PATTERN_EXPRESSION_LENGTH: usize = 4_096;

/// Maximum length of the fully expanded regex.
pub const MAX_EXPANDED_REGEX_LENGTH: usize = 64 * 1024;

/// Maximum nesting depth when expanding `%{NAME}` references.
pub const MAX_GROK_EXPANSION_DEPTH: usize = 16;

/// Maximum number of groups accepted from all pattern files combined.
pub const MAX_PATTERN_GROUPS: usize = 1_000;

/// Reason code written to unparsed records whose line did not match.
pub const REASON_GROK_MISMATCH: &str = "grok_mismatch";

// =============================================================================
// Local collector limits
// =============================================================================

/// Maximum directory recursion depth during collection.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Hard upper bound on max depth.
pub const ABSOLUTE_MAX_DEPTH: usize = 50;

/// Maximum number of files collected in a single pass.
pub const DEFAULT_MAX_FILES: usize = 500;

/// Minimum sensible value for the max-files limit.
pub const MIN_MAX_FILES: usize = 1;

/// Hard upper bound on max files.
pub const ABSOLUTE_MAX_FILES: usize = 10_000;

/// Number of collected lines sent to the store in one bulk request.
pub const COLLECT_BATCH_SIZE: usize = 1_000;

/// Default include glob patterns for collection.
pub const DEFAULT_INCLUDE_PATTERNS: &[&str] = &["*.log", "*.log.[0-9]*", "*.txt"];

/// Default exclude glob patterns for collection.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &["*.gz", "*.zip", "*.bak", "*.tmp", ".git"];

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Maximum length of a log line included in debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Configuration and persistence
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default file name of the JSON document store snapshot.
pub const STORE_FILE_NAME: &str = "store.json";

/// Pattern definitions subdirectory name.
pub const PATTERNS_DIR_NAME: &str = "patterns";

// LogSift - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// All errors preserve the causal chain for diagnostic logging.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all LogSift operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum LogSiftError {
    /// Pattern loading or compilation failed.
    Pattern(PatternError),

    /// The document store rejected or could not serve a request.
    Store(StoreError),

    /// Local log collection failed.
    Collect(CollectError),

    /// Export operation failed.
    Export(ExportError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// The worker thread pool could not be started.
    WorkerPool { reason: String },
}

impl fmt::Display for LogSiftError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(e) => write!(f, "Pattern error: {e}"),
            Self::Store(e) => write!(f, "Store error: {e}"),
            Self::Collect(e) => write!(f, "Collect error: {e}"),
            Self::Export(e) => write!(f, "Export error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::WorkerPool { reason } => write!(f, "Cannot start worker pool: {reason}"),
        }
    }
}

impl std::error::Error for LogSiftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Pattern(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Collect(e) => Some(e),
            Self::Export(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::WorkerPool { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Pattern errors
// ---------------------------------------------------------------------------

/// Errors related to pattern definition loading and grok compilation.
#[derive(Debug)]
pub enum PatternError {
    /// TOML file could not be parsed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Pattern file exceeds the maximum allowed size.
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    /// The group has no pattern definition at all.
    MissingPattern { group: String },

    /// The expression references a `%{NAME}` that is not defined.
    UnknownPattern { group: String, name: String },

    /// A `%{...}` reference is syntactically malformed.
    MalformedReference { group: String, reference: String },

    /// Pattern references nest deeper than the limit (usually a cycle).
    RecursionTooDeep { group: String, name: String, max_depth: usize },

    /// The grok expression is longer than allowed.
    ExpressionTooLong {
        group: String,
        length: usize,
        max_length: usize,
    },

    /// The expanded regex could not be compiled.
    InvalidRegex {
        group: String,
        source: regex::Error,
    },

    /// Maximum number of pattern groups exceeded.
    TooManyGroups { count: usize, max: usize },

    /// I/O error reading a pattern file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Failed to parse TOML '{}': {source}", path.display())
            }
            Self::FileTooLarge {
                path,
                size,
                max_size,
            } => write!(
                f,
                "Pattern file '{}' is {size} bytes, exceeds maximum of {max_size} bytes",
                path.display()
            ),
            Self::MissingPattern { group } => {
                write!(f, "Group '{group}': no pattern defined")
            }
            Self::UnknownPattern { group, name } => {
                write!(f, "Group '{group}': unknown grok pattern '%{{{name}}}'")
            }
            Self::MalformedReference { group, reference } => {
                write!(f, "Group '{group}': malformed grok reference '{reference}'")
            }
            Self::RecursionTooDeep {
                group,
                name,
                max_depth,
            } => write!(
                f,
                "Group '{group}': expanding '%{{{name}}}' exceeded depth {max_depth} \
                 (recursive pattern definition?)"
            ),
            Self::ExpressionTooLong {
                group,
                length,
                max_length,
            } => write!(
                f,
                "Group '{group}': expression is {length} chars, exceeds maximum of {max_length}"
            ),
            Self::InvalidRegex { group, source } => {
                write!(f, "Group '{group}': expanded pattern is not a valid regex: {source}")
            }
            Self::TooManyGroups { count, max } => {
                write!(f, "Too many pattern groups loaded ({count}), maximum is {max}")
            }
            Self::Io { path, source } => {
                write!(f, "I/O error reading pattern file '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for PatternError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::InvalidRegex { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<PatternError> for LogSiftError {
    fn from(e: PatternError) -> Self {
        Self::Pattern(e)
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors raised by a `DocumentStore` implementation.
#[derive(Debug)]
pub enum StoreError {
    /// The store could not be reached at all.
    Unavailable { reason: String },

    /// A read targeted an index that does not exist.
    IndexNotFound { index: String },

    /// A stored document has an unexpected shape.
    InvalidDocument {
        index: String,
        id: String,
        reason: String,
    },

    /// JSON (de)serialisation of the store snapshot failed.
    Serialization {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// I/O error reading or writing the store snapshot.
    Io { path: PathBuf, source: io::Error },

    /// The store snapshot was written in a format this build cannot read.
    UnsupportedSnapshot {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { reason } => write!(f, "Document store unavailable: {reason}"),
            Self::IndexNotFound { index } => write!(f, "Index '{index}' does not exist"),
            Self::InvalidDocument { index, id, reason } => {
                write!(f, "Document '{id}' in '{index}' is invalid: {reason}")
            }
            Self::Serialization { path, source } => {
                write!(f, "Store snapshot '{}' is not valid JSON: {source}", path.display())
            }
            Self::Io { path, source } => {
                write!(f, "Store I/O error '{}': {source}", path.display())
            }
            Self::UnsupportedSnapshot {
                path,
                found,
                expected,
            } => write!(
                f,
                "Store snapshot '{}' has format version {found}; \
                 this build reads version {expected}",
                path.display()
            ),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Serialization { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<StoreError> for LogSiftError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Collect errors
// ---------------------------------------------------------------------------

/// Errors related to local log collection.
#[derive(Debug)]
pub enum CollectError {
    /// The collection root does not exist or is not accessible.
    RootNotFound { path: PathBuf },

    /// The collection root is not a directory.
    NotADirectory { path: PathBuf },

    /// An include/exclude glob is invalid.
    InvalidGlob {
        pattern: String,
        source: glob::PatternError,
    },

    /// A log file could not be opened, positioned or read.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The store rejected a collector write.
    Store(StoreError),
}

impl fmt::Display for CollectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RootNotFound { path } => {
                write!(f, "Collect path '{}' does not exist", path.display())
            }
            Self::NotADirectory { path } => {
                write!(f, "Collect path '{}' is not a directory", path.display())
            }
            Self::InvalidGlob { pattern, source } => {
                write!(f, "Invalid glob '{pattern}': {source}")
            }
            Self::Read { path, source } => {
                write!(f, "Cannot read '{}': {source}", path.display())
            }
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CollectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidGlob { source, .. } => Some(source),
            Self::Read { source, .. } => Some(source),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for CollectError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<CollectError> for LogSiftError {
    fn from(e: CollectError) -> Self {
        Self::Collect(e)
    }
}

// ---------------------------------------------------------------------------
// Export errors
// ---------------------------------------------------------------------------

/// Errors related to export operations.
#[derive(Debug)]
pub enum ExportError {
    /// I/O error writing the export.
    Io { target: String, source: io::Error },

    /// CSV serialisation error.
    Csv { target: String, source: csv::Error },

    /// JSON serialisation error.
    Json {
        target: String,
        source: serde_json::Error,
    },
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { target, source } => write!(f, "Export I/O error '{target}': {source}"),
            Self::Csv { target, source } => write!(f, "CSV export error '{target}': {source}"),
            Self::Json { target, source } => write!(f, "JSON export error '{target}': {source}"),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Csv { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

impl From<ExportError> for LogSiftError {
    fn from(e: ExportError) -> Self {
        Self::Export(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for LogSiftError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Convenience type alias for LogSift results.
pub type Result<T> = std::result::Result<T, LogSiftError>;

// LogSift - app/pattern_mgr.rs
//
// Loads pattern definition files from disk and merges them into one
// catalog. Files are read in name order; a later file overrides an
// earlier one for the same group.

use crate::core::pattern::PatternCatalog;
use crate::util::constants;
use crate::util::error::PatternError;
use std::path::{Path, PathBuf};

/// Load every `*.toml` pattern file in `dir`.
///
/// Invalid files are logged and skipped (non-fatal). Returns the merged
/// catalog and any errors encountered.
pub fn load_pattern_dir(dir: &Path) -> (PatternCatalog, Vec<PatternError>) {
    let mut catalog = PatternCatalog::new();
    let mut errors = Vec::new();

    if !dir.is_dir() {
        tracing::debug!(dir = %dir.display(), "Pattern directory does not exist (skipping)");
        return (catalog, errors);
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            errors.push(PatternError::Io {
                path: dir.to_path_buf(),
                source: e,
            });
            return (catalog, errors);
        }
    };

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry_result in entries {
        match entry_result {
            Ok(entry) => {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                    paths.push(path);
                }
            }
            Err(e) => errors.push(PatternError::Io {
                path: dir.to_path_buf(),
                source: e,
            }),
        }
    }
    paths.sort();

    for path in paths {
        match load_pattern_file(&path) {
            Ok(file_catalog) => {
                tracing::debug!(
                    path = %path.display(),
                    groups = file_catalog.len(),
                    "Loaded pattern file"
                );
                catalog.merge(file_catalog);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Pattern file skipped");
                errors.push(e);
            }
        }
    }

    if catalog.len() > constants::MAX_PATTERN_GROUPS {
        tracing::warn!(
            count = catalog.len(),
            max = constants::MAX_PATTERN_GROUPS,
            "Too many pattern groups loaded"
        );
        errors.push(PatternError::TooManyGroups {
            count: catalog.len(),
            max: constants::MAX_PATTERN_GROUPS,
        });
    }

    tracing::info!(
        dir = %dir.display(),
        groups = catalog.len(),
        errors = errors.len(),
        "Pattern loading complete"
    );
    (catalog, errors)
}

/// Load a single pattern file, enforcing the size limit.
pub fn load_pattern_file(path: &Path) -> Result<PatternCatalog, PatternError> {
    let metadata = std::fs::metadata(path).map_err(|e| PatternError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if metadata.len() > constants::MAX_PATTERN_FILE_SIZE {
        return Err(PatternError::FileTooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max_size: constants::MAX_PATTERN_FILE_SIZE,
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| PatternError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    PatternCatalog::from_toml_str(&content, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pattern::PatternSource;

    #[test]
    fn test_load_dir_merges_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("01_base.toml"),
            "[groups.app]\npattern = '%{WORD:a}'\n\n[groups.db]\npattern = '%{INT:n}'\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("02_override.toml"),
            "[groups.app]\npattern = '%{GREEDYDATA:all}'\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (catalog, errors) = load_pattern_dir(dir.path());
        assert!(errors.is_empty());
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.pattern_spec("app").unwrap().expression,
            "%{GREEDYDATA:all}"
        );
    }

    #[test]
    fn test_invalid_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.toml"), "[groups.x\n").unwrap();
        std::fs::write(
            dir.path().join("good.toml"),
            "[groups.ok]\npattern = '%{WORD:w}'\n",
        )
        .unwrap();

        let (catalog, errors) = load_pattern_dir(dir.path());
        assert_eq!(errors.len(), 1);
        assert!(catalog.pattern_spec("ok").is_some());
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let (catalog, errors) = load_pattern_dir(Path::new("/nonexistent/logsift/patterns"));
        assert!(catalog.is_empty());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_oversized_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.toml");
        let filler = "#".repeat(constants::MAX_PATTERN_FILE_SIZE as usize + 1);
        std::fs::write(&path, filler).unwrap();
        assert!(matches!(
            load_pattern_file(&path),
            Err(PatternError::FileTooLarge { .. })
        ));
    }
}

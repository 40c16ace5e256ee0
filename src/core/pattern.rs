// LogSift - core/pattern.rs
//
// Pattern definition loading, validation, and the compiled-matcher registry.
// Core layer: accepts TOML strings, never touches the filesystem.
// I/O is handled by app::pattern_mgr which feeds content here.

use crate::core::grok::{self, GrokMatcher};
use crate::core::model::{CollisionPolicy, DerivedField, PatternSpec};
use crate::util::error::PatternError;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

// =============================================================================
// TOML deserialization structures (raw input)
// =============================================================================

/// Raw pattern file as deserialized from a .toml file.
///
/// Unlike Logstash grok, which searches for the pattern anywhere in the
/// line, patterns are anchored to the whole line unless a group sets
/// `anchored = false`.
///
/// ```toml
/// [groups.web]
/// pattern = '%{IPORHOST:client} %{WORD:method} %{NOTSPACE:path}'
/// [groups.web.derived_fields]
/// endpoint = "{method} {path}"
/// ```
#[derive(Debug, Deserialize, Default)]
pub struct PatternFileDef {
    #[serde(default)]
    pub groups: BTreeMap<String, GroupPatternDef>,
}

/// One group's entry in a pattern file.
#[derive(Debug, Deserialize)]
pub struct GroupPatternDef {
    #[serde(default)]
    pub pattern: Option<String>,
    /// Whole-line match (`^(?:...)$`). `false` gives Logstash-style search.
    #[serde(default = "default_anchored")]
    pub anchored: bool,
    #[serde(default)]
    pub on_collision: CollisionPolicy,
    /// Kept as raw TOML so non-string entries can be dropped with a warning
    /// instead of rejecting the whole file. Declaration order is preserved.
    #[serde(default)]
    pub derived_fields: toml::Table,
    #[serde(default)]
    pub custom_patterns: toml::Table,
}

fn default_anchored() -> bool {
    true
}

/// Parse a TOML string into a `PatternFileDef`.
///
/// `source_path` is used for error messages only (not for I/O).
pub fn parse_pattern_toml(
    toml_content: &str,
    source_path: &Path,
) -> Result<PatternFileDef, PatternError> {
    toml::from_str(toml_content).map_err(|e| PatternError::TomlParse {
        path: source_path.to_path_buf(),
        source: e,
    })
}

/// Keep only string-valued entries of a raw TOML table.
fn string_entries(group: &str, section: &'static str, table: toml::Table) -> Vec<(String, String)> {
    let mut out = Vec::with_capacity(table.len());
    for (name, value) in table {
        match value {
            toml::Value::String(s) => out.push((name, s)),
            other => tracing::warn!(
                group,
                section,
                field = %name,
                kind = other.type_str(),
                "Non-string entry dropped"
            ),
        }
    }
    out
}

/// Convert one raw group entry into a `PatternSpec`.
///
/// Returns `None` when the group has no usable pattern expression; such a
/// group is reported as `failed_no_pattern` at run time.
pub fn build_spec(group: &str, def: GroupPatternDef, source_path: &Path) -> Option<PatternSpec> {
    let expression = match def.pattern {
        Some(p) if !p.trim().is_empty() => p,
        _ => {
            tracing::warn!(
                group,
                source = %source_path.display(),
                "Group has no pattern expression"
            );
            return None;
        }
    };

    let derived_fields = string_entries(group, "derived_fields", def.derived_fields)
        .into_iter()
        .map(|(name, template)| DerivedField { name, template })
        .collect();

    Some(PatternSpec {
        expression,
        anchored: def.anchored,
        custom_patterns: string_entries(group, "custom_patterns", def.custom_patterns),
        derived_fields,
        on_collision: def.on_collision,
    })
}

// =============================================================================
// Pattern source
// =============================================================================

/// Lookup of a group's pattern spec. Backed by files, a service, or a
/// generation step; the pipeline treats it as a pure lookup.
pub trait PatternSource: Send + Sync {
    fn pattern_spec(&self, group: &str) -> Option<PatternSpec>;
}

/// In-memory set of pattern specs keyed by group name.
#[derive(Debug, Clone, Default)]
pub struct PatternCatalog {
    specs: HashMap<String, PatternSpec>,
}

impl PatternCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from one TOML document.
    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, PatternError> {
        let def = parse_pattern_toml(content, source_path)?;
        let mut catalog = Self::new();
        for (group, group_def) in def.groups {
            if let Some(spec) = build_spec(&group, group_def, source_path) {
                catalog.specs.insert(group, spec);
            }
        }
        Ok(catalog)
    }

    /// Insert or replace a group's spec. Returns the previous spec, if any.
    pub fn insert(&mut self, group: impl Into<String>, spec: PatternSpec) -> Option<PatternSpec> {
        self.specs.insert(group.into(), spec)
    }

    /// Merge `other` into `self`; entries in `other` win.
    pub fn merge(&mut self, other: PatternCatalog) {
        for (group, spec) in other.specs {
            if self.specs.insert(group.clone(), spec).is_some() {
                tracing::warn!(group = %group, "Pattern redefined by a later file");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Group names in sorted order.
    pub fn group_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.specs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl PatternSource for PatternCatalog {
    fn pattern_spec(&self, group: &str) -> Option<PatternSpec> {
        self.specs.get(group).cloned()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Hash of everything that affects compilation.
fn spec_fingerprint(spec: &PatternSpec) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(spec.expression.as_bytes());
    hasher.update(&[u8::from(spec.anchored)]);
    for (name, def) in &spec.custom_patterns {
        hasher.update(&[0]);
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
        hasher.update(def.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Loads pattern specs and caches compiled matchers per group.
///
/// The cache lives as long as the registry. Each group holds at most one
/// entry; a changed expression replaces it instead of reusing a stale one.
pub struct PatternRegistry {
    source: Arc<dyn PatternSource>,
    cache: Mutex<HashMap<String, (String, Arc<GrokMatcher>)>>,
}

impl PatternRegistry {
    pub fn new(source: Arc<dyn PatternSource>) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// `get_pattern_spec(group)`: `None` when the source has no entry.
    pub fn get_pattern_spec(&self, group: &str) -> Option<PatternSpec> {
        self.source.pattern_spec(group)
    }

    /// `get_compiled_matcher(group, spec)`.
    ///
    /// Compilation failures are logged and returned to the caller, which
    /// marks the group failed and moves on.
    pub fn get_compiled_matcher(
        &self,
        group: &str,
        spec: &PatternSpec,
    ) -> Result<Arc<GrokMatcher>, PatternError> {
        let fingerprint = spec_fingerprint(spec);

        {
            let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((cached_fp, matcher)) = cache.get(group) {
                if *cached_fp == fingerprint {
                    tracing::trace!(group, "Matcher cache hit");
                    return Ok(Arc::clone(matcher));
                }
            }
        }

        // Compile outside the lock so other groups are not blocked.
        let matcher = match grok::compile(group, spec) {
            Ok(m) => Arc::new(m),
            Err(e) => {
                tracing::warn!(group, error = %e, "Pattern failed to compile");
                return Err(e);
            }
        };

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((old_fp, _)) = cache.insert(
            group.to_string(),
            (fingerprint.clone(), Arc::clone(&matcher)),
        ) {
            if old_fp != fingerprint {
                tracing::debug!(group, "Pattern changed; cached matcher replaced");
            }
        }
        Ok(matcher)
    }

    /// Number of groups with a cached matcher.
    pub fn cached_groups(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const PATTERNS_TOML: &str = r#"
[groups.app]
pattern = '%{LOGLEVEL:level} %{GREEDYDATA:msg}'

[groups.app.derived_fields]
summary = "[{level}] {msg}"
bogus = 42
shout = "{summary}!"

[groups.web]
pattern = '%{WORD:method} %{URIPATH:path} %{TICKET:ticket}'
anchored = false
on_collision = "keep_extracted"

[groups.web.custom_patterns]
TICKET = '[A-Z]{3}-\d+'

[groups.empty]
anchored = true
"#;

    fn catalog() -> PatternCatalog {
        PatternCatalog::from_toml_str(PATTERNS_TOML, &PathBuf::from("patterns.toml")).unwrap()
    }

    #[test]
    fn test_parse_groups() {
        let c = catalog();
        assert_eq!(c.group_names(), vec!["app", "web"]);

        let app = c.pattern_spec("app").unwrap();
        assert!(app.anchored);
        assert_eq!(app.on_collision, CollisionPolicy::Overwrite);

        let web = c.pattern_spec("web").unwrap();
        assert!(!web.anchored);
        assert_eq!(web.on_collision, CollisionPolicy::KeepExtracted);
        assert_eq!(web.custom_patterns[0].0, "TICKET");
    }

    #[test]
    fn test_non_string_derived_fields_dropped_in_order() {
        let app = catalog().pattern_spec("app").unwrap();
        let names: Vec<&str> = app.derived_fields.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["summary", "shout"]);
    }

    #[test]
    fn test_group_without_pattern_has_no_spec() {
        assert!(catalog().pattern_spec("empty").is_none());
        assert!(catalog().pattern_spec("missing").is_none());
    }

    #[test]
    fn test_invalid_toml() {
        let err = PatternCatalog::from_toml_str("[groups.x\npattern=", &PathBuf::from("bad.toml"))
            .unwrap_err();
        assert!(matches!(err, PatternError::TomlParse { .. }));
    }

    #[test]
    fn test_merge_later_wins() {
        let mut base = catalog();
        let mut other = PatternCatalog::new();
        other.insert("app", PatternSpec::new("%{GREEDYDATA:all}"));
        base.merge(other);
        assert_eq!(base.pattern_spec("app").unwrap().expression, "%{GREEDYDATA:all}");
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn test_registry_caches_by_expression() {
        let registry = PatternRegistry::new(Arc::new(catalog()));
        let spec = registry.get_pattern_spec("app").unwrap();

        let first = registry.get_compiled_matcher("app", &spec).unwrap();
        let second = registry.get_compiled_matcher("app", &spec).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.cached_groups(), 1);

        let changed = PatternSpec::new("%{WORD:only}");
        let third = registry.get_compiled_matcher("app", &changed).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.expression(), "%{WORD:only}");
        assert_eq!(registry.cached_groups(), 1);
    }

    #[test]
    fn test_registry_reports_compile_failure() {
        let mut c = PatternCatalog::new();
        c.insert("broken", PatternSpec::new("%{NOT_A_PATTERN:x}"));
        let registry = PatternRegistry::new(Arc::new(c));
        let spec = registry.get_pattern_spec("broken").unwrap();
        assert!(registry.get_compiled_matcher("broken", &spec).is_err());
        assert_eq!(registry.cached_groups(), 0);
    }
}

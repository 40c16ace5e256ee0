// LogSift - core/grok.rs
//
// Grok expression compilation and line matching.
// Core layer: pure functions over strings, no I/O.
//
// A grok expression is a regex with `%{NAME}`, `%{NAME:field}` and
// `%{NAME:field:int|float}` references. References are expanded recursively
// from the group's custom patterns first, then from the built-in library
// below, and the result is compiled once with the `regex` crate.
//
// Field names are free-form (`[http][method]` is legal), so each capturing
// reference gets a generated regex group name and the mapping back to the
// field name is kept beside the compiled regex.

use crate::core::model::{FieldMap, PatternSpec};
use crate::util::constants;
use crate::util::error::PatternError;
use regex::Regex;
use serde_json::Value;

// =============================================================================
// Built-in pattern library
// =============================================================================

/// Base grok definitions. The `regex` crate has no look-around, so the
/// logstash definitions that rely on it are expressed with word boundaries
/// or simplified alternations instead.
const BUILTIN_PATTERNS: &[(&str, &str)] = &[
    ("USERNAME", r"[a-zA-Z0-9._-]+"),
    ("USER", r"%{USERNAME}"),
    ("EMAILLOCALPART", r"[a-zA-Z0-9._%+-]+"),
    ("EMAILADDRESS", r"%{EMAILLOCALPART}@%{HOSTNAME}"),
    ("INT", r"[+-]?[0-9]+"),
    ("BASE10NUM", r"[+-]?(?:[0-9]+(?:\.[0-9]+)?|\.[0-9]+)"),
    ("NUMBER", r"%{BASE10NUM}"),
    ("BASE16NUM", r"[+-]?(?:0x)?[0-9A-Fa-f]+"),
    ("POSINT", r"\b[1-9][0-9]*\b"),
    ("NONNEGINT", r"\b[0-9]+\b"),
    ("WORD", r"\b\w+\b"),
    ("NOTSPACE", r"\S+"),
    ("SPACE", r"\s*"),
    ("DATA", r".*?"),
    ("GREEDYDATA", r".*"),
    ("QUOTEDSTRING", r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#),
    ("UUID", r"[A-Fa-f0-9]{8}-(?:[A-Fa-f0-9]{4}-){3}[A-Fa-f0-9]{12}"),
    (
        "IPV4",
        r"(?:(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9]{2}|[1-9]?[0-9])",
    ),
    ("IPV6", r"(?:[0-9A-Fa-f]{0,4}:){2,7}[0-9A-Fa-f]{0,4}"),
    ("IP", r"%{IPV6}|%{IPV4}"),
    (
        "HOSTNAME",
        r"\b[0-9A-Za-z][0-9A-Za-z-]{0,62}(?:\.[0-9A-Za-z][0-9A-Za-z-]{0,62})*\.?",
    ),
    ("IPORHOST", r"%{IP}|%{HOSTNAME}"),
    ("HOSTPORT", r"%{IPORHOST}:%{POSINT}"),
    ("UNIXPATH", r"(?:/[\w_%!$@:.,+~-]*)+"),
    ("WINPATH", r"(?:[A-Za-z]+:|\\)(?:\\[^\\?*]*)+"),
    ("PATH", r"%{UNIXPATH}|%{WINPATH}"),
    ("URIPATH", r"(?:/[A-Za-z0-9$.+!*'(),~:;=@#%&_\-]*)+"),
    (
        "LOGLEVEL",
        r"[Aa]lert|ALERT|[Tt]race|TRACE|[Dd]ebug|DEBUG|[Nn]otice|NOTICE|[Ii]nfo?(?:rmation)?|INFO?(?:RMATION)?|[Ww]arn?(?:ing)?|WARN?(?:ING)?|[Ee]rr?(?:or)?|ERR?(?:OR)?|[Cc]rit?(?:ical)?|CRIT?(?:ICAL)?|[Ff]atal|FATAL|[Ss]evere|SEVERE|EMERG(?:ENCY)?|[Ee]merg(?:ency)?",
    ),
    (
        "MONTH",
        r"\b(?:[Jj]an(?:uary)?|[Ff]eb(?:ruary)?|[Mm]ar(?:ch)?|[Aa]pr(?:il)?|[Mm]ay|[Jj]un(?:e)?|[Jj]ul(?:y)?|[Aa]ug(?:ust)?|[Ss]ep(?:tember)?|[Oo]ct(?:ober)?|[Nn]ov(?:ember)?|[Dd]ec(?:ember)?)\b",
    ),
    ("MONTHNUM", r"0?[1-9]|1[0-2]"),
    ("MONTHDAY", r"0[1-9]|[12][0-9]|3[01]|[1-9]"),
    (
        "DAY",
        r"Mon(?:day)?|Tue(?:sday)?|Wed(?:nesday)?|Thu(?:rsday)?|Fri(?:day)?|Sat(?:urday)?|Sun(?:day)?",
    ),
    ("YEAR", r"(?:\d\d){1,2}"),
    ("HOUR", r"2[0123]|[01]?[0-9]"),
    ("MINUTE", r"[0-5][0-9]"),
    ("SECOND", r"(?:[0-5]?[0-9]|60)(?:[:.,][0-9]+)?"),
    ("TIME", r"%{HOUR}:%{MINUTE}(?::%{SECOND})?"),
    ("DATE_US", r"%{MONTHNUM}[/-]%{MONTHDAY}[/-]%{YEAR}"),
    ("DATE_EU", r"%{MONTHDAY}[./-]%{MONTHNUM}[./-]%{YEAR}"),
    ("DATE", r"%{DATE_US}|%{DATE_EU}"),
    ("ISO8601_TIMEZONE", r"Z|[+-]%{HOUR}(?::?%{MINUTE})"),
    (
        "TIMESTAMP_ISO8601",
        r"%{YEAR}-%{MONTHNUM}-%{MONTHDAY}[T ]%{HOUR}:?%{MINUTE}(?::?%{SECOND})?%{ISO8601_TIMEZONE}?",
    ),
    ("SYSLOGTIMESTAMP", r"%{MONTH} +%{MONTHDAY} %{TIME}"),
    ("HTTPDATE", r"%{MONTHDAY}/%{MONTH}/%{YEAR}:%{TIME} %{INT}"),
    (
        "JAVACLASS",
        r"(?:[a-zA-Z$_][a-zA-Z$_0-9]*\.)*[a-zA-Z$_][a-zA-Z$_0-9]*",
    ),
];

fn builtin_pattern(name: &str) -> Option<&'static str> {
    BUILTIN_PATTERNS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, def)| *def)
}

// =============================================================================
// Compiled matcher
// =============================================================================

/// How a captured value is converted before it lands in the field map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureKind {
    Text,
    Int,
    Float,
}

#[derive(Debug, Clone)]
struct Capture {
    /// Generated regex group name (`f0`, `f1`, ...).
    group: String,
    /// Field name as written in the expression.
    field: String,
    kind: CaptureKind,
}

/// A grok expression compiled to a single regex.
#[derive(Debug, Clone)]
pub struct GrokMatcher {
    expression: String,
    regex: Regex,
    captures: Vec<Capture>,
}

impl GrokMatcher {
    /// The original, unexpanded expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The expanded regex source.
    pub fn regex_source(&self) -> &str {
        self.regex.as_str()
    }

    /// Field names in expression order (duplicates collapsed).
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for c in &self.captures {
            if !names.contains(&c.field.as_str()) {
                names.push(&c.field);
            }
        }
        names
    }

    /// Apply the matcher to one raw line.
    ///
    /// Returns `None` when the line does not match. Never fails: a mismatch
    /// is an expected outcome routed to the unparsed sink by the caller.
    pub fn matches(&self, line: &str) -> Option<FieldMap> {
        let caps = self.regex.captures(line)?;
        let mut fields = FieldMap::new();

        for capture in &self.captures {
            let Some(m) = caps.name(&capture.group) else {
                continue;
            };
            let raw = m.as_str();

            // A field referenced twice keeps its first non-empty capture.
            if let Some(Value::String(existing)) = fields.get(&capture.field) {
                if !existing.is_empty() || raw.is_empty() {
                    continue;
                }
            } else if fields.contains_key(&capture.field) {
                continue;
            }

            fields.insert(capture.field.clone(), convert(raw, capture.kind));
        }

        Some(fields)
    }
}

/// Line Matcher entry point: `match(raw_line, compiled_matcher)`.
pub fn match_line(line: &str, matcher: &GrokMatcher) -> Option<FieldMap> {
    matcher.matches(line)
}

fn convert(raw: &str, kind: CaptureKind) -> Value {
    match kind {
        CaptureKind::Text => Value::String(raw.to_string()),
        CaptureKind::Int => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        CaptureKind::Float => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
    }
}

// =============================================================================
// Compilation
// =============================================================================

/// Compile a group's pattern spec into a matcher.
///
/// Fails on unknown `%{NAME}` references, malformed references, recursive
/// definitions, oversize expressions, and regex syntax errors.
pub fn compile(group: &str, spec: &PatternSpec) -> Result<GrokMatcher, PatternError> {
    if spec.expression.trim().is_empty() {
        return Err(PatternError::MissingPattern {
            group: group.to_string(),
        });
    }
    if spec.expression.len() > constants::MAX_PATTERN_EXPRESSION_LENGTH {
        return Err(PatternError::ExpressionTooLong {
            group: group.to_string(),
            length: spec.expression.len(),
            max_length: constants::MAX_PATTERN_EXPRESSION_LENGTH,
        });
    }

    let mut expander = Expander {
        group,
        custom: &spec.custom_patterns,
        captures: Vec::new(),
    };
    let expanded = expander.expand(&spec.expression, 0)?;

    let source = if spec.anchored {
        format!("^(?:{expanded})$")
    } else {
        expanded
    };

    if source.len() > constants::MAX_EXPANDED_REGEX_LENGTH {
        return Err(PatternError::ExpressionTooLong {
            group: group.to_string(),
            length: source.len(),
            max_length: constants::MAX_EXPANDED_REGEX_LENGTH,
        });
    }

    let regex = Regex::new(&source).map_err(|e| PatternError::InvalidRegex {
        group: group.to_string(),
        source: e,
    })?;

    tracing::debug!(
        group,
        fields = expander.captures.len(),
        regex_len = source.len(),
        "Grok expression compiled"
    );

    Ok(GrokMatcher {
        expression: spec.expression.clone(),
        regex,
        captures: expander.captures,
    })
}

struct Expander<'a> {
    group: &'a str,
    custom: &'a [(String, String)],
    captures: Vec<Capture>,
}

impl Expander<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.custom
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, def)| def.clone())
            .or_else(|| builtin_pattern(name).map(str::to_string))
    }

    fn expand(&mut self, text: &str, depth: usize) -> Result<String, PatternError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("%{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(PatternError::MalformedReference {
                    group: self.group.to_string(),
                    reference: rest[start..].to_string(),
                });
            };
            let reference = &after[..end];
            let expanded = self.expand_reference(reference, depth)?;
            out.push_str(&expanded);
            self.check_length(&out)?;
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        self.check_length(&out)?;

        Ok(out)
    }

    /// Fan-out definitions grow geometrically, so the size cap is enforced
    /// while expanding rather than on the finished regex.
    fn check_length(&self, out: &str) -> Result<(), PatternError> {
        if out.len() > constants::MAX_EXPANDED_REGEX_LENGTH {
            return Err(PatternError::ExpressionTooLong {
                group: self.group.to_string(),
                length: out.len(),
                max_length: constants::MAX_EXPANDED_REGEX_LENGTH,
            });
        }
        Ok(())
    }

    fn expand_reference(&mut self, reference: &str, depth: usize) -> Result<String, PatternError> {
        let mut parts = reference.splitn(3, ':');
        let name = parts.next().unwrap_or_default();
        let field = parts.next().filter(|f| !f.is_empty());
        let kind = parts.next();

        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(PatternError::MalformedReference {
                group: self.group.to_string(),
                reference: format!("%{{{reference}}}"),
            });
        }

        if depth >= constants::MAX_GROK_EXPANSION_DEPTH {
            return Err(PatternError::RecursionTooDeep {
                group: self.group.to_string(),
                name: name.to_string(),
                max_depth: constants::MAX_GROK_EXPANSION_DEPTH,
            });
        }

        let definition = self
            .lookup(name)
            .ok_or_else(|| PatternError::UnknownPattern {
                group: self.group.to_string(),
                name: name.to_string(),
            })?;

        let inner = self.expand(&definition, depth + 1)?;

        let Some(field) = field else {
            return Ok(format!("(?:{inner})"));
        };

        let kind = match kind {
            None => CaptureKind::Text,
            Some("int") => CaptureKind::Int,
            Some("float") => CaptureKind::Float,
            Some(other) => {
                tracing::warn!(
                    group = self.group,
                    field,
                    kind = other,
                    "Unknown grok capture type; keeping value as text"
                );
                CaptureKind::Text
            }
        };

        let group_name = format!("f{}", self.captures.len());
        let expanded = format!("(?P<{group_name}>{inner})");
        self.captures.push(Capture {
            group: group_name,
            field: field.to_string(),
            kind,
        });
        Ok(expanded)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_expr(expr: &str) -> GrokMatcher {
        compile("test", &PatternSpec::new(expr)).unwrap()
    }

    #[test]
    fn test_builtin_library_compiles() {
        for (name, _) in BUILTIN_PATTERNS {
            let result = compile("builtins", &PatternSpec::new(format!("%{{{name}:v}}")));
            assert!(result.is_ok(), "built-in %{{{name}}} failed: {result:?}");
        }
    }

    #[test]
    fn test_level_and_message() {
        let m = compile_expr("%{LOGLEVEL:level} %{GREEDYDATA:msg}");
        let fields = match_line("ERROR boom", &m).unwrap();
        assert_eq!(fields["level"], "ERROR");
        assert_eq!(fields["msg"], "boom");
        assert!(match_line("not a match!!", &m).is_none());
    }

    #[test]
    fn test_word_pattern_matches_any_leading_word() {
        let m = compile_expr("%{WORD:level} %{GREEDYDATA:msg}");
        let fields = match_line("not a match!!", &m).unwrap();
        assert_eq!(fields["level"], "not");
        assert_eq!(fields["msg"], "a match!!");
    }

    #[test]
    fn test_anchored_rejects_partial_line() {
        let m = compile_expr("%{INT:code}");
        assert!(match_line("code=42", &m).is_none());

        let mut spec = PatternSpec::new("%{INT:code}");
        spec.anchored = false;
        let unanchored = compile("test", &spec).unwrap();
        assert_eq!(match_line("code=42", &unanchored).unwrap()["code"], "42");
    }

    #[test]
    fn test_typed_captures() {
        let m = compile_expr("%{INT:status:int} %{NUMBER:took:float} %{WORD:unit:int}");
        let fields = match_line("200 0.25 ms", &m).unwrap();
        assert_eq!(fields["status"], 200);
        assert_eq!(fields["took"], 0.25);
        // Failed conversion keeps the text.
        assert_eq!(fields["unit"], "ms");
    }

    #[test]
    fn test_free_form_field_names() {
        let m = compile_expr("%{WORD:[http][method]} %{URIPATH:[http][path]}");
        let fields = match_line("GET /api/v1/users", &m).unwrap();
        assert_eq!(fields["[http][method]"], "GET");
        assert_eq!(fields["[http][path]"], "/api/v1/users");
    }

    #[test]
    fn test_optional_capture_omitted() {
        let m = compile_expr(r"%{WORD:a}(?: %{INT:b})?");
        let fields = match_line("hello", &m).unwrap();
        assert_eq!(fields["a"], "hello");
        assert!(!fields.contains_key("b"));
    }

    #[test]
    fn test_duplicate_field_keeps_first_non_empty() {
        let m = compile_expr(r"(?:%{INT:id}|x-%{WORD:id})");
        assert_eq!(match_line("17", &m).unwrap()["id"], "17");
        assert_eq!(match_line("x-abc", &m).unwrap()["id"], "abc");
    }

    #[test]
    fn test_custom_patterns_override_and_extend() {
        let mut spec = PatternSpec::new("%{TICKET:ticket} %{WORD:who}");
        spec.custom_patterns
            .push(("TICKET".to_string(), r"[A-Z]{3}-\d+".to_string()));
        spec.custom_patterns
            .push(("WORD".to_string(), r"[a-z]+".to_string()));
        let m = compile("custom", &spec).unwrap();
        let fields = match_line("OPS-1234 alice", &m).unwrap();
        assert_eq!(fields["ticket"], "OPS-1234");
        assert!(match_line("OPS-1234 Alice", &m).is_none());
    }

    #[test]
    fn test_timestamp_iso8601_and_syslog() {
        let m = compile_expr("%{TIMESTAMP_ISO8601:ts} %{LOGLEVEL:level} %{GREEDYDATA:msg}");
        let fields = match_line("2024-01-15T14:30:22.123Z WARN disk low", &m).unwrap();
        assert_eq!(fields["ts"], "2024-01-15T14:30:22.123Z");

        let m = compile_expr("%{SYSLOGTIMESTAMP:ts} %{HOSTNAME:host} %{GREEDYDATA:msg}");
        let fields = match_line("Jan  5 14:30:22 web-01 sshd started", &m).unwrap();
        assert_eq!(fields["host"], "web-01");
    }

    #[test]
    fn test_unknown_pattern_is_error() {
        let err = compile("g", &PatternSpec::new("%{NOPE:x}")).unwrap_err();
        assert!(matches!(err, PatternError::UnknownPattern { ref name, .. } if name == "NOPE"));
    }

    #[test]
    fn test_unclosed_reference_is_error() {
        let err = compile("g", &PatternSpec::new("%{WORD:x")).unwrap_err();
        assert!(matches!(err, PatternError::MalformedReference { .. }));
    }

    #[test]
    fn test_recursive_definition_is_error() {
        let mut spec = PatternSpec::new("%{LOOP:x}");
        spec.custom_patterns
            .push(("LOOP".to_string(), "a%{LOOP}".to_string()));
        let err = compile("g", &spec).unwrap_err();
        assert!(matches!(err, PatternError::RecursionTooDeep { .. }));
    }

    #[test]
    fn test_fan_out_definitions_rejected_early() {
        // Each level repeats the previous one ten times: L7 would expand to
        // tens of megabytes if the cap were only checked at the end.
        let mut spec = PatternSpec::new("%{L7:x}");
        spec.custom_patterns.push(("L0".to_string(), "x".to_string()));
        for level in 1..=7 {
            let previous = format!("%{{L{}}}", level - 1);
            spec.custom_patterns
                .push((format!("L{level}"), previous.repeat(10)));
        }

        let started = std::time::Instant::now();
        let err = compile("fanout", &spec).unwrap_err();
        match err {
            PatternError::ExpressionTooLong { length, max_length, .. } => {
                assert_eq!(max_length, constants::MAX_EXPANDED_REGEX_LENGTH);
                assert!(length <= 2 * max_length + 16, "length {length}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_regex_is_error() {
        let err = compile("g", &PatternSpec::new("%{WORD:x} [unclosed")).unwrap_err();
        assert!(matches!(err, PatternError::InvalidRegex { .. }));
    }

    #[test]
    fn test_empty_expression_is_missing_pattern() {
        let err = compile("g", &PatternSpec::new("   ")).unwrap_err();
        assert!(matches!(err, PatternError::MissingPattern { .. }));
    }

    #[test]
    fn test_match_never_panics_on_odd_input() {
        let m = compile_expr("%{LOGLEVEL:level} %{GREEDYDATA:msg}");
        for line in ["", " ", "\u{0}\u{1}", "ERROR", "ERROR \u{fffd}\u{fffd}"] {
            let _ = match_line(line, &m);
        }
        assert_eq!(match_line("ERROR ", &m).unwrap()["msg"], "");
    }

    #[test]
    fn test_field_names_in_order() {
        let m = compile_expr("%{WORD:a} %{WORD:b} %{WORD:a}");
        assert_eq!(m.field_names(), vec!["a", "b"]);
    }
}

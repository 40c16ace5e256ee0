// LogSift - core/derive.rs
//
// Derived field computation from format templates.
// Core layer: pure functions, no I/O.
//
// Template syntax is a small subset of Python's str.format:
//   "{method} {path}"    placeholders name fields already in the map
//   "{{" and "}}"        literal braces
//   "{took:>8}"          a :spec or !conv suffix is accepted and ignored
//
// A derived field whose placeholders are not all present is skipped; the
// line itself still parses. Templates run in declaration order, and each
// computed field is visible to the templates after it.

use crate::core::model::{CollisionPolicy, DerivedField, FieldMap};
use serde_json::Value;

/// One parsed piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(String),
    Field(&'a str),
}

/// Why a template could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// A `{` without a matching `}`.
    Unclosed { position: usize },
    /// A lone `}` that is not part of `}}`.
    StrayClose { position: usize },
    /// `{}` or `{:spec}` with no field name.
    EmptyName { position: usize },
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unclosed { position } => write!(f, "unclosed '{{' at byte {position}"),
            Self::StrayClose { position } => write!(f, "stray '}}' at byte {position}"),
            Self::EmptyName { position } => write!(f, "empty placeholder at byte {position}"),
        }
    }
}

fn parse_template(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                literal.push('{');
                i += 2;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => {
                literal.push('}');
                i += 2;
            }
            b'{' => {
                let close = template[i + 1..]
                    .find('}')
                    .ok_or(TemplateError::Unclosed { position: i })?;
                let inner = &template[i + 1..i + 1 + close];
                let name_end = inner.find(|c: char| c == ':' || c == '!').unwrap_or(inner.len());
                let name = inner[..name_end].trim();
                if name.is_empty() {
                    return Err(TemplateError::EmptyName { position: i });
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(name));
                i += close + 2;
            }
            b'}' => return Err(TemplateError::StrayClose { position: i }),
            _ => {
                // Copy the whole UTF-8 character.
                let ch_len = template[i..].chars().next().map_or(1, char::len_utf8);
                literal.push_str(&template[i..i + ch_len]);
                i += ch_len;
            }
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

/// Placeholder names a template requires, in order of first appearance.
pub fn placeholders(template: &str) -> Result<Vec<&str>, TemplateError> {
    let mut names: Vec<&str> = Vec::new();
    for segment in parse_template(template)? {
        if let Segment::Field(name) = segment {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    Ok(names)
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Render `template` against `fields`.
///
/// Returns `Ok(None)` when a placeholder is missing from `fields`.
pub fn render(template: &str, fields: &FieldMap) -> Result<Option<String>, TemplateError> {
    let segments = parse_template(template)?;
    let mut out = String::with_capacity(template.len());
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(&text),
            Segment::Field(name) => match fields.get(name) {
                Some(value) => out.push_str(&render_value(value)),
                None => return Ok(None),
            },
        }
    }
    Ok(Some(out))
}

/// Context attached to derivation log events.
#[derive(Debug, Clone, Copy)]
pub struct DeriveContext<'a> {
    pub group: &'a str,
    pub file_id: &'a str,
    pub line_number: u64,
    pub on_collision: CollisionPolicy,
}

/// Derived Field Processor: `derive(base_fields, templates, context)`.
///
/// Failures are per field: a missing placeholder or a malformed template
/// drops only that derived field.
pub fn derive(
    mut fields: FieldMap,
    templates: &[DerivedField],
    ctx: &DeriveContext<'_>,
) -> FieldMap {
    for derived in templates {
        if fields.contains_key(&derived.name) && ctx.on_collision == CollisionPolicy::KeepExtracted
        {
            tracing::debug!(
                group = ctx.group,
                field = %derived.name,
                "Derived field collides with extracted field; keeping extracted value"
            );
            continue;
        }

        match render(&derived.template, &fields) {
            Ok(Some(value)) => {
                if fields.contains_key(&derived.name) {
                    tracing::debug!(
                        group = ctx.group,
                        field = %derived.name,
                        "Derived field overwrites extracted field"
                    );
                }
                fields.insert(derived.name.clone(), Value::String(value));
            }
            Ok(None) => {
                let missing: Vec<&str> = placeholders(&derived.template)
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|name| !fields.contains_key(*name))
                    .collect();
                tracing::debug!(
                    group = ctx.group,
                    file_id = ctx.file_id,
                    line = ctx.line_number,
                    field = %derived.name,
                    ?missing,
                    "Derived field skipped: placeholders missing"
                );
            }
            Err(e) => {
                tracing::warn!(
                    group = ctx.group,
                    field = %derived.name,
                    template = %derived.template,
                    error = %e,
                    "Derived field skipped: malformed template"
                );
            }
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(policy: CollisionPolicy) -> DeriveContext<'static> {
        DeriveContext {
            group: "g1",
            file_id: "f1",
            line_number: 1,
            on_collision: policy,
        }
    }

    fn fields(pairs: &[(&str, Value)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn derived(name: &str, template: &str) -> DerivedField {
        DerivedField {
            name: name.to_string(),
            template: template.to_string(),
        }
    }

    #[test]
    fn test_placeholders_extraction() {
        assert_eq!(placeholders("{a}-{b}-{a}").unwrap(), vec!["a", "b"]);
        assert_eq!(placeholders("{took:>8} {x!r}").unwrap(), vec!["took", "x"]);
        assert!(placeholders("no fields").unwrap().is_empty());
        assert!(placeholders("{{literal}}").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_templates() {
        assert_eq!(
            placeholders("{open").unwrap_err(),
            TemplateError::Unclosed { position: 0 }
        );
        assert_eq!(
            placeholders("a } b").unwrap_err(),
            TemplateError::StrayClose { position: 2 }
        );
        assert_eq!(
            placeholders("x{}").unwrap_err(),
            TemplateError::EmptyName { position: 1 }
        );
    }

    #[test]
    fn test_render_values() {
        let f = fields(&[
            ("method", Value::from("GET")),
            ("status", Value::from(200)),
            ("none", Value::Null),
        ]);
        assert_eq!(
            render("{method} -> {status}{none} {{ok}}", &f).unwrap(),
            Some("GET -> 200 {ok}".to_string())
        );
        assert_eq!(render("{missing}", &f).unwrap(), None);
    }

    #[test]
    fn test_render_keeps_unicode_literals() {
        let f = fields(&[("a", Value::from("x"))]);
        assert_eq!(render("→{a}←", &f).unwrap(), Some("→x←".to_string()));
    }

    #[test]
    fn test_missing_key_skips_only_that_field() {
        let base = fields(&[("level", Value::from("ERROR")), ("msg", Value::from("boom"))]);
        let templates = vec![
            derived("summary", "{level}: {msg}"),
            derived("who", "{user}@{host}"),
            derived("tag", "[{level}]"),
        ];
        let out = derive(base, &templates, &ctx(CollisionPolicy::Overwrite));

        assert_eq!(out["summary"], "ERROR: boom");
        assert_eq!(out["tag"], "[ERROR]");
        assert!(!out.contains_key("who"));
        assert_eq!(out["level"], "ERROR");
        assert_eq!(out["msg"], "boom");
    }

    #[test]
    fn test_later_templates_see_earlier_results() {
        let base = fields(&[("a", Value::from("1"))]);
        let templates = vec![derived("b", "{a}+"), derived("c", "{b}+")];
        let out = derive(base, &templates, &ctx(CollisionPolicy::Overwrite));
        assert_eq!(out["c"], "1++");
    }

    #[test]
    fn test_earlier_template_not_retried() {
        let base = fields(&[("a", Value::from("1"))]);
        let templates = vec![derived("c", "{b}+"), derived("b", "{a}+")];
        let out = derive(base, &templates, &ctx(CollisionPolicy::Overwrite));
        assert_eq!(out["b"], "1+");
        assert!(!out.contains_key("c"));
    }

    #[test]
    fn test_collision_policies() {
        let base = fields(&[("msg", Value::from("boom"))]);
        let templates = vec![derived("msg", "<{msg}>")];

        let out = derive(base.clone(), &templates, &ctx(CollisionPolicy::Overwrite));
        assert_eq!(out["msg"], "<boom>");

        let out = derive(base, &templates, &ctx(CollisionPolicy::KeepExtracted));
        assert_eq!(out["msg"], "boom");
    }

    #[test]
    fn test_malformed_template_dropped() {
        let base = fields(&[("a", Value::from("1"))]);
        let templates = vec![derived("bad", "{a"), derived("good", "{a}")];
        let out = derive(base, &templates, &ctx(CollisionPolicy::Overwrite));
        assert!(!out.contains_key("bad"));
        assert_eq!(out["good"], "1");
    }
}

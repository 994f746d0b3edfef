//! Raw tool arguments to typed request fields

use super::{Param, ParamSpec, SearchMode};
use crate::error::{PiaError, Result};
use crate::filter::Literal;
use serde_json::{Map, Value};
use std::num::IntErrorKind;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 50;

/// Paging limits taken from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

/// Normalized arguments plus the non-fatal notes gathered on the way
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normalized {
    pub query: Option<String>,
    /// Raw `filter` text, not yet parsed
    pub filter: Option<String>,
    /// Filter text translated from a legacy `filters` object
    pub legacy_filter: Option<String>,
    pub page: u32,
    pub page_size: u32,
    pub mode: Option<SearchMode>,
    pub include_facets: bool,
    pub id: Option<String>,
    pub notes: Vec<String>,
}

/// Reconcile aliases, apply defaults and enforce paging bounds.
///
/// `default_mode` is the tool's own search mode, used when the caller does
/// not pick one.
pub fn normalize(
    spec: &ParamSpec,
    default_mode: Option<SearchMode>,
    args: &Value,
    limits: &Limits,
) -> Result<Normalized> {
    let empty = Map::new();
    let args = match args {
        Value::Null => &empty,
        Value::Object(map) => map,
        _ => return Err(PiaError::validation("arguments must be a JSON object")),
    };

    let mut out = Normalized {
        page: 1,
        page_size: limits.default_page_size.min(limits.max_page_size),
        mode: default_mode,
        ..Default::default()
    };

    for key in args.keys() {
        if !spec.accepts_name(key) {
            out.notes
                .push(format!("ignored unsupported parameter '{}'", key));
        }
    }

    if spec.accepts(Param::Query) {
        out.query = string_arg(args, "query")?
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
    }
    if spec.query_required && out.query.is_none() {
        return Err(PiaError::validation("query is required and must not be blank"));
    }

    if spec.accepts(Param::Filter) {
        out.filter = string_arg(args, "filter")?.filter(|f| !f.trim().is_empty());
    }

    if spec.accepts(Param::Filters) {
        if let Some(filters) = args.get("filters").filter(|v| !v.is_null()) {
            out.legacy_filter = translate_legacy_filters(filters)?;
            if let Some(text) = &out.legacy_filter {
                out.notes.push(format!(
                    "translated legacy 'filters' object to filter \"{}\"",
                    text
                ));
            }
        }
    }

    if spec.accepts(Param::Page) {
        if let Some(page) = int_arg(args, "page")? {
            out.page = positive(page, "page")?;
        }
    }

    let page_size = if spec.accepts(Param::PageSize) {
        int_arg(args, "page_size")?
    } else {
        None
    };
    let limit = if spec.accepts(Param::Limit) {
        int_arg(args, "limit")?
    } else {
        None
    };
    let requested = match (page_size, limit) {
        (Some(size), Some(_)) => {
            out.notes
                .push("ignored 'limit' because 'page_size' was given".to_string());
            Some((size, "page_size"))
        }
        (Some(size), None) => Some((size, "page_size")),
        (None, Some(size)) => Some((size, "limit")),
        (None, None) => None,
    };
    if let Some((size, name)) = requested {
        if size < 1 {
            return Err(PiaError::validation(format!(
                "{} must be >= 1, got {}",
                name, size
            )));
        }
        // Anything past u32 is over any ceiling, so it clamps like the rest
        let size = u32::try_from(size).unwrap_or(u32::MAX);
        if size > limits.max_page_size {
            out.notes.push(format!(
                "{} {} exceeds the maximum of {}; using {}",
                name,
                raw_text(args, name),
                limits.max_page_size,
                limits.max_page_size
            ));
            out.page_size = limits.max_page_size;
        } else {
            out.page_size = size;
        }
    }

    if spec.accepts(Param::SearchMode) {
        if let Some(mode) = string_arg(args, "search_mode")? {
            out.mode = Some(SearchMode::parse(mode.trim())?);
        }
    }

    if spec.accepts(Param::IncludeFacets) {
        out.include_facets = bool_arg(args, "include_facets")?.unwrap_or(false);
    }

    if spec.accepts(Param::Id) {
        let id = string_arg(args, "id")?
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        match id {
            Some(id) => out.id = Some(id),
            None => return Err(PiaError::validation("id is required and must not be blank")),
        }
    }

    Ok(out)
}

fn string_arg(args: &Map<String, Value>, name: &str) -> Result<Option<String>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(PiaError::validation(format!("{} must be a string", name))),
    }
}

/// Integers as JSON numbers or numeric strings. Whole values outside the
/// `i64` range saturate; callers decide whether that is an error.
fn int_arg(args: &Map<String, Value>, name: &str) -> Result<Option<i64>> {
    let not_integer = || PiaError::validation(format!("{} must be an integer", name));
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            match n.as_f64() {
                // `as` saturates at the i64 bounds
                Some(f) if f.is_finite() && f.fract() == 0.0 => Ok(Some(f as i64)),
                _ => Err(not_integer()),
            }
        }
        Some(Value::String(s)) => match s.trim().parse::<i64>() {
            Ok(i) => Ok(Some(i)),
            Err(e) => match e.kind() {
                IntErrorKind::PosOverflow => Ok(Some(i64::MAX)),
                IntErrorKind::NegOverflow => Ok(Some(i64::MIN)),
                _ => Err(not_integer()),
            },
        },
        Some(_) => Err(not_integer()),
    }
}

/// The argument as the caller wrote it, for notes
fn raw_text(args: &Map<String, Value>, name: &str) -> String {
    match args.get(name) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Booleans as JSON booleans or `"true"`/`"false"`
fn bool_arg(args: &Map<String, Value>, name: &str) -> Result<Option<bool>> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(Some(true)),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(Some(false)),
        Some(_) => Err(PiaError::validation(format!("{} must be a boolean", name))),
    }
}

fn positive(value: i64, name: &str) -> Result<u32> {
    if value < 1 {
        return Err(PiaError::validation(format!(
            "{} must be >= 1, got {}",
            name, value
        )));
    }
    u32::try_from(value)
        .map_err(|_| PiaError::validation(format!("{} is too large: {}", name, value)))
}

/// Translate the legacy `filters` object into filter text.
///
/// `{"Field": {"eq": "v"}}` and the shorthand `{"Field": "v"}` are accepted.
/// Several conditions are joined with `and`. An empty object yields `None`.
pub fn translate_legacy_filters(filters: &Value) -> Result<Option<String>> {
    let Value::Object(map) = filters else {
        return Err(PiaError::validation(
            "filters must be an object such as {\"Field\": {\"eq\": \"value\"}}",
        ));
    };

    let mut clauses = Vec::new();
    for (field, condition) in map {
        if !is_field_path(field) {
            return Err(PiaError::validation(format!(
                "invalid field name '{}' in filters",
                field
            )));
        }

        match condition {
            Value::Object(ops) => {
                for (op, value) in ops {
                    clauses.push(legacy_clause(field, op, value)?);
                }
            }
            Value::Array(_) => clauses.push(legacy_clause(field, "in", condition)?),
            _ => clauses.push(legacy_clause(field, "eq", condition)?),
        }
    }

    Ok((!clauses.is_empty()).then(|| clauses.join(" and ")))
}

fn legacy_clause(field: &str, op: &str, value: &Value) -> Result<String> {
    let op = match op {
        "eq" | "ne" | "gt" | "ge" | "lt" | "le" => op,
        "gte" => "ge",
        "lte" => "le",
        "in" => {
            let items = value
                .as_array()
                .filter(|items| !items.is_empty())
                .ok_or_else(|| {
                    PiaError::validation(format!(
                        "filters.{}.in must be a non-empty array",
                        field
                    ))
                })?;
            let rendered = items
                .iter()
                .map(|item| legacy_literal(field, item))
                .collect::<Result<Vec<_>>>()?;
            return Ok(format!("{} in ({})", field, rendered.join(", ")));
        }
        other => {
            return Err(PiaError::validation(format!(
                "unsupported operator '{}' in filters for field '{}'",
                other, field
            )))
        }
    };
    Ok(format!("{} {} {}", field, op, legacy_literal(field, value)?))
}

fn legacy_literal(field: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(Literal::string(s.as_str()).to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(PiaError::validation(format!(
            "filters.{} must hold a string, number or boolean",
            field
        ))),
    }
}

fn is_field_path(name: &str) -> bool {
    !name.is_empty()
        && name.split('/').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn search(args: Value) -> Result<Normalized> {
        normalize(
            &ParamSpec::search(true),
            Some(SearchMode::Content),
            &args,
            &Limits::default(),
        )
    }

    #[test]
    fn test_defaults() {
        let n = search(json!({"query": "fraud"})).unwrap();
        assert_eq!(n.query.as_deref(), Some("fraud"));
        assert_eq!(n.page, 1);
        assert_eq!(n.page_size, 10);
        assert_eq!(n.mode, Some(SearchMode::Content));
        assert!(!n.include_facets);
        assert!(n.notes.is_empty());
    }

    #[test]
    fn test_page_size_clamped_with_note() {
        let n = search(json!({"query": "q", "page_size": 10000})).unwrap();
        assert_eq!(n.page_size, 50);
        assert_eq!(n.notes.len(), 1);
        assert!(n.notes[0].contains("maximum of 50"));
    }

    #[test]
    fn test_huge_page_size_clamped() {
        for size in [
            json!(10_000_000_000u64),
            json!(u64::MAX),
            json!(1e20),
            json!("99999999999999999999"),
        ] {
            let n = search(json!({"query": "q", "page_size": size.clone()}))
                .unwrap_or_else(|e| panic!("{size}: {e}"));
            assert_eq!(n.page_size, 50, "{size}");
            assert!(n.notes[0].contains("maximum of 50"), "{size}");
        }

        let n = search(json!({"query": "q", "limit": "99999999999999999999"})).unwrap();
        assert_eq!(n.page_size, 50);
        assert!(n.notes[0].starts_with("limit 99999999999999999999 exceeds"));

        assert!(search(json!({"query": "q", "page_size": -1e20})).is_err());
        assert!(search(json!({"query": "q", "page_size": 2.5})).is_err());
    }

    #[test]
    fn test_huge_page_is_rejected() {
        let err = search(json!({"query": "q", "page": 10_000_000_000u64})).unwrap_err();
        assert!(err.to_string().contains("page is too large"));
    }

    #[test]
    fn test_page_size_beats_limit() {
        let n = search(json!({"query": "q", "page_size": 5, "limit": 15})).unwrap();
        assert_eq!(n.page_size, 5);
        assert!(n.notes[0].contains("ignored 'limit'"));

        let n = search(json!({"query": "q", "limit": 15})).unwrap();
        assert_eq!(n.page_size, 15);
    }

    #[test]
    fn test_lenient_scalars() {
        let n = search(json!({
            "query": "q",
            "page": "3",
            "page_size": 20.0,
            "include_facets": "true"
        }))
        .unwrap();
        assert_eq!(n.page, 3);
        assert_eq!(n.page_size, 20);
        assert!(n.include_facets);
    }

    #[test]
    fn test_rejections() {
        let cases = [
            json!({}),
            json!({"query": "   "}),
            json!({"query": "q", "page": 0}),
            json!({"query": "q", "page": "abc"}),
            json!({"query": "q", "page": 1.5}),
            json!({"query": "q", "page_size": 0}),
            json!({"query": "q", "limit": -4}),
            json!({"query": "q", "search_mode": "everything"}),
            json!({"query": "q", "filter": 42}),
            json!({"query": "q", "include_facets": "yes"}),
            json!({"query": "q", "filters": "SourceDocumentDataSource eq 'GAO'"}),
            json!(["q"]),
        ];
        for args in cases {
            let err = search(args.clone()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationError, "{args}");
        }
    }

    #[test]
    fn test_ignored_parameters_noted() {
        let titles = ParamSpec::search(false);
        let n = normalize(
            &titles,
            Some(SearchMode::Titles),
            &json!({"query": "q", "search_mode": "content", "offset": 4}),
            &Limits::default(),
        )
        .unwrap();
        assert_eq!(n.mode, Some(SearchMode::Titles));
        assert_eq!(n.notes.len(), 2);
        assert!(n.notes.iter().any(|note| note.contains("'offset'")));
    }

    #[test]
    fn test_search_mode_override() {
        let n = search(json!({"query": "q", "search_mode": "titles"})).unwrap();
        assert_eq!(n.mode, Some(SearchMode::Titles));
    }

    #[test]
    fn test_blank_filter_is_absent() {
        let n = search(json!({"query": "q", "filter": "  "})).unwrap();
        assert!(n.filter.is_none());
    }

    #[test]
    fn test_facets_query_optional() {
        let n = normalize(
            &ParamSpec::facets(),
            Some(SearchMode::Content),
            &Value::Null,
            &Limits::default(),
        )
        .unwrap();
        assert!(n.query.is_none());
    }

    #[test]
    fn test_fetch_requires_id() {
        let spec = ParamSpec::fetch();
        let limits = Limits::default();
        let n = normalize(&spec, None, &json!({"id": "doc-1"}), &limits).unwrap();
        assert_eq!(n.id.as_deref(), Some("doc-1"));
        assert!(normalize(&spec, None, &json!({"id": ""}), &limits).is_err());
        assert!(normalize(&spec, None, &json!({}), &limits).is_err());
    }

    #[test]
    fn test_legacy_filters_translated() {
        let n = search(json!({
            "query": "ambulance fraud",
            "limit": 15,
            "filters": {"data_source": {"eq": "GAO"}}
        }))
        .unwrap();
        assert_eq!(n.legacy_filter.as_deref(), Some("data_source eq 'GAO'"));
        assert_eq!(n.page_size, 15);
        assert!(n.notes[0].contains("legacy 'filters'"));
    }

    #[test]
    fn test_translate_legacy_shapes() {
        let text = translate_legacy_filters(&json!({
            "RecStatus": "Open",
            "SourceDocumentDataSource": {"in": ["GAO", "CRS"]},
            "SourceDocumentPublishDate": {"gte": "2020-01-01", "lte": "2024-12-31"},
            "Year": {"gt": 2019}
        }))
        .unwrap()
        .unwrap();
        assert_eq!(
            text,
            "RecStatus eq 'Open' and \
             SourceDocumentDataSource in ('GAO', 'CRS') and \
             SourceDocumentPublishDate ge '2020-01-01' and \
             SourceDocumentPublishDate le '2024-12-31' and \
             Year gt 2019"
        );
        assert!(crate::filter::parse(&text).is_ok());
    }

    #[test]
    fn test_translate_legacy_errors() {
        assert!(translate_legacy_filters(&json!({})).unwrap().is_none());
        assert!(translate_legacy_filters(&json!({"a b": "x"})).is_err());
        assert!(translate_legacy_filters(&json!({"F": {"like": "x"}})).is_err());
        assert!(translate_legacy_filters(&json!({"F": {"in": []}})).is_err());
        assert!(translate_legacy_filters(&json!({"F": {"eq": {"nested": 1}}})).is_err());
        assert_eq!(
            translate_legacy_filters(&json!({"Title": "it's"})).unwrap().as_deref(),
            Some("Title eq 'it''s'")
        );
    }
}

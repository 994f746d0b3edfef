//! Advisory schema checks for filter trees
//!
//! Validation never fails and never touches the tree. It only reports
//! [`Warning`]s; callers decide whether any of them are fatal.

use super::ast::{CompareOp, DateValue, Expr, Literal, LiteralType};
use super::lexer::parse_date;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Declared type of a filterable field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Number,
    Date,
    Bool,
    /// Collection of strings, filtered through `any`/`all`
    Collection,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Bool => "bool",
            Self::Collection => "collection",
        }
    }

    fn literal_type(&self) -> Option<LiteralType> {
        match self {
            Self::String => Some(LiteralType::String),
            Self::Number => Some(LiteralType::Number),
            Self::Date => Some(LiteralType::Date),
            Self::Bool => Some(LiteralType::Bool),
            Self::Collection => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "string" | "text" | "edm.string" => Some(Self::String),
            "number" | "int" | "integer" | "double" | "float" | "edm.int32" | "edm.int64"
            | "edm.double" => Some(Self::Number),
            "date" | "datetime" | "edm.datetimeoffset" | "edm.date" => Some(Self::Date),
            "bool" | "boolean" | "edm.boolean" => Some(Self::Bool),
            "collection" | "array" | "collection(edm.string)" => Some(Self::Collection),
            _ => None,
        }
    }
}

/// Inclusive bounds for ordered fields
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub min: Option<Literal>,
    pub max: Option<Literal>,
}

/// What is known about one field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub kind: FieldKind,
    /// Known values; empty means "any value"
    pub values: BTreeSet<String>,
    pub range: Option<ValueRange>,
}

impl FieldSchema {
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            values: BTreeSet::new(),
            range: None,
        }
    }

    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn with_range(mut self, min: Option<Literal>, max: Option<Literal>) -> Self {
        self.range = Some(ValueRange { min, max });
        self
    }

    /// Schema of a single element of a collection field
    fn element(&self) -> FieldSchema {
        FieldSchema {
            kind: FieldKind::String,
            values: self.values.clone(),
            range: None,
        }
    }
}

/// Known fields, their types and value sets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetSet {
    fields: BTreeMap<String, FieldSchema>,
}

impl FacetSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.insert(name, schema);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, schema: FieldSchema) {
        self.fields.insert(name.into(), schema);
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Documented fields of the PIA index
    pub fn pia_default() -> Self {
        let text = || FieldSchema::new(FieldKind::String);

        Self::new()
            .with_field("SourceDocumentDataSource", text())
            .with_field(
                "SourceDocumentDataSet",
                text().with_values([
                    "press-releases",
                    "reports",
                    "bills-and-laws",
                    "federal-reports",
                    "executive orders",
                    "state-and-local-reports",
                    "federal reports",
                ]),
            )
            .with_field("SourceDocumentOrg", text())
            .with_field("SourceDocumentTitle", text())
            .with_field(
                "SourceDocumentPublishDate",
                FieldSchema::new(FieldKind::Date),
            )
            .with_field("RecStatus", text())
            .with_field("RecPriorityFlag", text())
            .with_field("IsIntegrityRelated", text())
            .with_field("SourceDocumentIsRecDoc", text().with_values(["No", "Yes"]))
            .with_field("RecFraudRiskManagementThemePIA", text())
            .with_field("RecMatterForCongressPIA", text())
            .with_field("RecRecommendation", text())
            .with_field("RecAgencyComments", text())
            .with_field(
                "referenced_agencies",
                FieldSchema::new(FieldKind::Collection),
            )
    }

    /// Build a facet set from a facet tool response.
    ///
    /// Accepts a `facets` object at the top level or under `output`/`result`,
    /// or the facet object itself. Each field maps to a list of values (plain
    /// strings or `{"value": .., "count": ..}` objects) or to an object with
    /// optional `type`, `values`, `min` and `max`.
    pub fn from_response(response: &Value) -> Self {
        let facets = locate_facets(response).or_else(|| response.is_object().then_some(response));
        let mut set = Self::new();

        let Some(map) = facets.and_then(Value::as_object) else {
            return set;
        };

        for (name, entry) in map {
            if let Some(schema) = schema_from_entry(entry) {
                set.insert(name.clone(), schema);
            }
        }
        set
    }

    /// Merge discovered facets into this set.
    ///
    /// Value sets are unioned. A newly discovered type or range replaces the
    /// known one.
    pub fn merge(&mut self, other: FacetSet) {
        for (name, incoming) in other.fields {
            match self.fields.get_mut(&name) {
                Some(existing) => {
                    if existing.kind != incoming.kind && incoming.kind != FieldKind::String {
                        existing.kind = incoming.kind;
                    }
                    existing.values.extend(incoming.values);
                    if incoming.range.is_some() {
                        existing.range = incoming.range;
                    }
                }
                None => {
                    self.fields.insert(name, incoming);
                }
            }
        }
    }
}

fn locate_facets(response: &Value) -> Option<&Value> {
    for key in ["facets", "@search.facets"] {
        if let Some(found) = response.get(key) {
            return Some(found);
        }
    }
    for outer in ["output", "result", "structuredContent"] {
        if let Some(inner) = response.get(outer) {
            if let Some(found) = locate_facets(inner) {
                return Some(found);
            }
        }
    }
    None
}

fn schema_from_entry(entry: &Value) -> Option<FieldSchema> {
    match entry {
        Value::Array(items) => {
            let values: Vec<String> = items.iter().filter_map(value_text).collect();
            if values.is_empty() {
                return None;
            }
            let kind = infer_kind(&values);
            Some(FieldSchema::new(kind).with_values(values))
        }
        Value::Object(obj) => {
            let declared = obj
                .get("type")
                .and_then(Value::as_str)
                .and_then(FieldKind::from_name);
            let values: Vec<String> = obj
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(value_text).collect())
                .unwrap_or_default();
            let kind = declared.unwrap_or_else(|| infer_kind(&values));

            let min = obj.get("min").and_then(|v| bound_literal(v, kind));
            let max = obj.get("max").and_then(|v| bound_literal(v, kind));
            if declared.is_none() && values.is_empty() && min.is_none() && max.is_none() {
                return None;
            }
            let kind = match (declared, &min, &max) {
                (None, Some(bound), _) | (None, None, Some(bound)) => match bound {
                    Literal::Number(_) => FieldKind::Number,
                    Literal::Date(_) => FieldKind::Date,
                    _ => kind,
                },
                _ => kind,
            };

            let mut schema = FieldSchema::new(kind).with_values(values);
            if min.is_some() || max.is_some() {
                schema.range = Some(ValueRange { min, max });
            }
            Some(schema)
        }
        _ => None,
    }
}

fn value_text(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(obj) => obj.get("value").and_then(value_text),
        _ => None,
    }
}

/// Facet values that all look like dates make a date field
fn infer_kind(values: &[String]) -> FieldKind {
    if !values.is_empty() && values.iter().all(|v| v.len() >= 10 && parse_date(v).is_some()) {
        FieldKind::Date
    } else {
        FieldKind::String
    }
}

fn bound_literal(value: &Value, kind: FieldKind) -> Option<Literal> {
    match value {
        Value::Number(n) => n.as_f64().map(Literal::Number),
        Value::String(s) => match parse_date(s) {
            Some(date) => Some(Literal::Date(date)),
            None if kind == FieldKind::Number => s.parse().ok().map(Literal::Number),
            None => Some(Literal::String(s.clone())),
        },
        _ => None,
    }
}

/// Why a node did not match the schema
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum WarningReason {
    UnknownField,
    TypeMismatch {
        expected: FieldKind,
        found: LiteralType,
    },
    OperatorNotApplicable {
        operator: String,
        kind: FieldKind,
    },
    UnknownValue {
        value: String,
    },
    OutOfRange {
        value: String,
    },
}

/// One advisory finding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    pub field: String,
    #[serde(flatten)]
    pub reason: WarningReason,
    /// Node path such as `root.right.left`
    pub path: String,
}

impl Warning {
    pub fn is_unknown_field(&self) -> bool {
        self.reason == WarningReason::UnknownField
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.path)?;
        match &self.reason {
            WarningReason::UnknownField => write!(f, "unknown field '{}'", self.field),
            WarningReason::TypeMismatch { expected, found } => write!(
                f,
                "field '{}' is {} but the value is {}",
                self.field,
                expected.as_str(),
                found.as_str()
            ),
            WarningReason::OperatorNotApplicable { operator, kind } => write!(
                f,
                "operator '{}' does not apply to {} field '{}'",
                operator,
                kind.as_str(),
                self.field
            ),
            WarningReason::UnknownValue { value } => {
                write!(f, "value {} is not a known value of '{}'", value, self.field)
            }
            WarningReason::OutOfRange { value } => {
                write!(f, "value {} is outside the range of '{}'", value, self.field)
            }
        }
    }
}

/// Check a tree against a schema. No schema means nothing to report.
pub fn validate(tree: &Expr, schema: Option<&FacetSet>) -> Vec<Warning> {
    let Some(schema) = schema else {
        return Vec::new();
    };

    let mut checker = Checker {
        schema,
        scopes: Vec::new(),
        warnings: Vec::new(),
    };
    let mut path = String::from("root");
    checker.visit(tree, &mut path);
    checker.warnings
}

/// Lambda variable bound to an element schema; `None` when the collection is unknown
struct Scope {
    variable: String,
    element: Option<FieldSchema>,
}

enum Resolved<'a> {
    Known(&'a FieldSchema),
    /// Refers to a lambda variable whose element type is unknown
    Unchecked,
    Unknown,
}

struct Checker<'a> {
    schema: &'a FacetSet,
    scopes: Vec<Scope>,
    warnings: Vec<Warning>,
}

impl<'a> Checker<'a> {
    fn visit(&mut self, node: &Expr, path: &mut String) {
        let len = path.len();
        match node {
            Expr::Comparison { field, op, value } => {
                self.check_comparison(field, *op, value, path);
            }
            Expr::ListMembership { field, values } => {
                for value in values {
                    self.check_comparison(field, CompareOp::Eq, value, path);
                }
            }
            Expr::Function { name, field, value } => {
                self.check_function(name.as_str(), field, value, path);
            }
            Expr::Binary { left, right, .. } => {
                path.push_str(".left");
                self.visit(left, path);
                path.truncate(len);
                path.push_str(".right");
                self.visit(right, path);
                path.truncate(len);
            }
            Expr::Not(operand) => {
                path.push_str(".operand");
                self.visit(operand, path);
                path.truncate(len);
            }
            Expr::Literal(_) => {}
            Expr::Lambda {
                collection,
                quantifier,
                variable,
                predicate,
            } => {
                let facets = self.schema;
                let element = match facets.get(collection) {
                    Some(schema) if schema.kind == FieldKind::Collection => Some(schema.element()),
                    Some(schema) => {
                        self.warn(
                            collection,
                            WarningReason::OperatorNotApplicable {
                                operator: quantifier.as_str().to_string(),
                                kind: schema.kind,
                            },
                            path,
                        );
                        None
                    }
                    None => {
                        self.warn(collection, WarningReason::UnknownField, path);
                        None
                    }
                };

                self.scopes.push(Scope {
                    variable: variable.clone(),
                    element,
                });
                path.push_str(".predicate");
                self.visit(predicate, path);
                path.truncate(len);
                self.scopes.pop();
            }
        }
    }

    fn resolve(&self, field: &str) -> Resolved<'_> {
        for scope in self.scopes.iter().rev() {
            let bound = field == scope.variable
                || field
                    .strip_prefix(scope.variable.as_str())
                    .is_some_and(|rest| rest.starts_with('/'));
            if bound {
                return match &scope.element {
                    Some(element) if field == scope.variable => Resolved::Known(element),
                    _ => Resolved::Unchecked,
                };
            }
        }
        match self.schema.get(field) {
            Some(schema) => Resolved::Known(schema),
            None => Resolved::Unknown,
        }
    }

    fn check_comparison(&mut self, field: &str, op: CompareOp, value: &Literal, path: &str) {
        let schema = match self.resolve(field) {
            Resolved::Known(schema) => schema.clone(),
            Resolved::Unchecked => return,
            Resolved::Unknown => {
                self.warn(field, WarningReason::UnknownField, path);
                return;
            }
        };

        let not_applicable = schema.kind == FieldKind::Collection
            || (op.is_ordering() && schema.kind == FieldKind::Bool);
        if not_applicable {
            self.warn(
                field,
                WarningReason::OperatorNotApplicable {
                    operator: op.as_str().to_string(),
                    kind: schema.kind,
                },
                path,
            );
            return;
        }

        let Some(typed) = coerce(value, schema.kind) else {
            self.warn(
                field,
                WarningReason::TypeMismatch {
                    expected: schema.kind,
                    found: value.literal_type(),
                },
                path,
            );
            return;
        };

        if !schema.values.is_empty() {
            if let Literal::String(text) = &typed {
                if !schema.values.contains(text) {
                    self.warn(
                        field,
                        WarningReason::UnknownValue {
                            value: value.to_string(),
                        },
                        path,
                    );
                }
            }
        }

        if let Some(range) = &schema.range {
            if !in_range(&typed, range) {
                self.warn(
                    field,
                    WarningReason::OutOfRange {
                        value: value.to_string(),
                    },
                    path,
                );
            }
        }
    }

    fn check_function(&mut self, name: &str, field: &str, value: &Literal, path: &str) {
        let kind = match self.resolve(field) {
            Resolved::Known(schema) => schema.kind,
            Resolved::Unchecked => return,
            Resolved::Unknown => {
                self.warn(field, WarningReason::UnknownField, path);
                return;
            }
        };

        if kind != FieldKind::String {
            self.warn(
                field,
                WarningReason::OperatorNotApplicable {
                    operator: name.to_string(),
                    kind,
                },
                path,
            );
        } else if value.literal_type() != LiteralType::String {
            self.warn(
                field,
                WarningReason::TypeMismatch {
                    expected: kind,
                    found: value.literal_type(),
                },
                path,
            );
        }
    }

    fn warn(&mut self, field: &str, reason: WarningReason, path: &str) {
        self.warnings.push(Warning {
            field: field.to_string(),
            reason,
            path: path.to_string(),
        });
    }
}

/// Interpret a literal as the field's type. Quoted dates are accepted for
/// date fields.
fn coerce(value: &Literal, kind: FieldKind) -> Option<Literal> {
    let expected = kind.literal_type()?;
    if value.literal_type() == expected {
        return Some(value.clone());
    }
    match (value, kind) {
        (Literal::String(text), FieldKind::Date) => parse_date(text).map(Literal::Date),
        _ => None,
    }
}

fn date_key(value: &DateValue) -> NaiveDateTime {
    match value {
        DateValue::Date(date) => date.and_time(chrono::NaiveTime::MIN),
        DateValue::DateTime(ts) => ts.naive_utc(),
    }
}

fn order(a: &Literal, b: &Literal) -> Option<Ordering> {
    match (a, b) {
        (Literal::Number(x), Literal::Number(y)) => x.partial_cmp(y),
        (Literal::Date(x), Literal::Date(y)) => Some(date_key(x).cmp(&date_key(y))),
        (Literal::String(x), Literal::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn in_range(value: &Literal, range: &ValueRange) -> bool {
    let above_min = range
        .min
        .as_ref()
        .and_then(|min| order(value, min))
        .map_or(true, |o| o != Ordering::Less);
    let below_max = range
        .max
        .as_ref()
        .and_then(|max| order(value, max))
        .map_or(true, |o| o != Ordering::Greater);
    above_min && below_max
}

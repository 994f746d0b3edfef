//! Render filter trees back to backend filter text
//!
//! Output re-parses to a structurally equal tree. Parentheses appear only
//! where precedence or left-associativity needs them.

use super::ast::{DateValue, Expr, Literal};
use chrono::SecondsFormat;
use std::fmt;

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Self::DateTime(ts) => write!(f, "{}", ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Number(n) => write!(f, "{}", n),
            Self::Date(d) => write!(f, "{}", d),
            Self::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comparison { field, op, value } => {
                write!(f, "{} {} {}", field, op.as_str(), value)
            }
            Self::ListMembership { field, values } => {
                write!(f, "{} in (", field)?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str(")")
            }
            Self::Function { name, field, value } => {
                write!(f, "{}({}, {})", name.as_str(), field, value)
            }
            Self::Binary { op, left, right } => {
                let prec = self.precedence();
                write_operand(f, left, prec, false)?;
                write!(f, " {} ", op.as_str())?;
                write_operand(f, right, prec, true)
            }
            Self::Not(operand) => {
                f.write_str("not ")?;
                write_operand(f, operand, self.precedence(), false)
            }
            Self::Literal(value) => write!(f, "{}", value),
            Self::Lambda {
                collection,
                quantifier,
                variable,
                predicate,
            } => write!(
                f,
                "{}/{}({}: {})",
                collection,
                quantifier.as_str(),
                variable,
                predicate
            ),
        }
    }
}

fn write_operand(
    f: &mut fmt::Formatter<'_>,
    child: &Expr,
    parent_prec: u8,
    right_side: bool,
) -> fmt::Result {
    let child_prec = child.precedence();
    let wrap = child_prec < parent_prec
        || (right_side && child_prec == parent_prec && matches!(child, Expr::Binary { .. }));
    if wrap {
        write!(f, "({})", child)
    } else {
        write!(f, "{}", child)
    }
}

/// Serialize an optional tree; absent means empty filter text
pub fn to_filter_string(expr: Option<&Expr>) -> String {
    expr.map(ToString::to_string).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse;

    fn roundtrip(text: &str) -> String {
        let tree = parse(text).unwrap().unwrap();
        let rendered = tree.to_string();
        let reparsed = parse(&rendered).unwrap().unwrap();
        assert_eq!(tree, reparsed, "{text} -> {rendered}");
        rendered
    }

    #[test]
    fn test_canonical_rendering() {
        assert_eq!(roundtrip("a   eq   'x'"), "a eq 'x'");
        assert_eq!(roundtrip("(a eq 1)"), "a eq 1");
        assert_eq!(
            roundtrip("(a eq 'x' or b eq 'y') and not (c eq 'z')"),
            "(a eq 'x' or b eq 'y') and not c eq 'z'"
        );
    }

    #[test]
    fn test_right_nested_same_operator_keeps_parens() {
        assert_eq!(
            roundtrip("a eq 1 and (b eq 2 and c eq 3)"),
            "a eq 1 and (b eq 2 and c eq 3)"
        );
        assert_eq!(
            roundtrip("(a eq 1 and b eq 2) and c eq 3"),
            "a eq 1 and b eq 2 and c eq 3"
        );
    }

    #[test]
    fn test_not_over_group() {
        assert_eq!(
            roundtrip("not (a eq 1 or b eq 2)"),
            "not (a eq 1 or b eq 2)"
        );
        assert_eq!(roundtrip("not not a eq 1"), "not not a eq 1");
    }

    #[test]
    fn test_literals() {
        assert_eq!(roundtrip("a eq 'it''s'"), "a eq 'it''s'");
        assert_eq!(roundtrip("a ge 2020-01-01"), "a ge 2020-01-01");
        assert_eq!(
            roundtrip("a ge 2020-01-01T10:00:00Z"),
            "a ge 2020-01-01T10:00:00Z"
        );
        assert_eq!(roundtrip("a lt -1.5"), "a lt -1.5");
        assert_eq!(roundtrip("a eq 10"), "a eq 10");
        assert_eq!(roundtrip("a ne true"), "a ne true");
    }

    #[test]
    fn test_list_function_lambda() {
        assert_eq!(
            roundtrip("RecStatus in ('Open','Closed')"),
            "RecStatus in ('Open', 'Closed')"
        );
        assert_eq!(
            roundtrip("endswith(SourceDocumentTitle,'Act')"),
            "endswith(SourceDocumentTitle, 'Act')"
        );
        assert_eq!(
            roundtrip("referenced_agencies/any(a:a eq 'DOJ' or a eq 'DOD')"),
            "referenced_agencies/any(a: a eq 'DOJ' or a eq 'DOD')"
        );
    }

    #[test]
    fn test_absent_tree_is_empty_text() {
        assert_eq!(to_filter_string(None), "");
    }
}

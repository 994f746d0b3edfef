//! Filter expression tree
//!
//! Trees are immutable once built. Interior nodes hold their children behind
//! `Arc`, so a composed tree shares its inputs instead of copying them.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Comparison operators (`eq ne gt ge lt le`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "eq" => Some(Self::Eq),
            "ne" => Some(Self::Ne),
            "gt" => Some(Self::Gt),
            "ge" => Some(Self::Ge),
            "lt" => Some(Self::Lt),
            "le" => Some(Self::Le),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
        }
    }

    /// Ordering operators only make sense on ordered value types
    pub fn is_ordering(&self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }
}

/// String functions usable as atomic predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionName {
    Contains,
    StartsWith,
    EndsWith,
}

impl FunctionName {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "contains" => Some(Self::Contains),
            "startswith" => Some(Self::StartsWith),
            "endswith" => Some(Self::EndsWith),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    And,
    Or,
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// Collection quantifier for lambda predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantifier {
    Any,
    All,
}

impl Quantifier {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "any" => Some(Self::Any),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::All => "all",
        }
    }
}

/// Date literal, either a calendar date or a full timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateValue {
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
}

/// Literal value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Date(DateValue),
    Bool(bool),
}

/// Declared type of a literal, also used for facet field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralType {
    String,
    Number,
    Date,
    Bool,
}

impl LiteralType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Date => "date",
            Self::Bool => "bool",
        }
    }
}

impl Literal {
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn literal_type(&self) -> LiteralType {
        match self {
            Self::String(_) => LiteralType::String,
            Self::Number(_) => LiteralType::Number,
            Self::Date(_) => LiteralType::Date,
            Self::Bool(_) => LiteralType::Bool,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Filter expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `field op literal`
    Comparison {
        field: String,
        op: CompareOp,
        value: Literal,
    },
    /// `field in (v1, v2, ...)`
    ListMembership { field: String, values: Vec<Literal> },
    /// `contains(field, 'text')`
    Function {
        name: FunctionName,
        field: String,
        value: Literal,
    },
    Binary {
        op: BinaryOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    Not(Arc<Expr>),
    /// Bare boolean constant, e.g. `true`
    Literal(Literal),
    /// `collection/any(v: predicate)`
    Lambda {
        collection: String,
        quantifier: Quantifier,
        variable: String,
        predicate: Arc<Expr>,
    },
}

impl Expr {
    pub fn comparison(field: impl Into<String>, op: CompareOp, value: Literal) -> Self {
        Self::Comparison {
            field: field.into(),
            op,
            value,
        }
    }

    pub fn and(left: Arc<Expr>, right: Arc<Expr>) -> Self {
        Self::Binary {
            op: BinaryOp::And,
            left,
            right,
        }
    }

    pub fn or(left: Arc<Expr>, right: Arc<Expr>) -> Self {
        Self::Binary {
            op: BinaryOp::Or,
            left,
            right,
        }
    }

    pub fn not(operand: Arc<Expr>) -> Self {
        Self::Not(operand)
    }

    /// Binding strength used by the serializer; higher binds tighter
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            Self::Binary {
                op: BinaryOp::Or, ..
            } => 1,
            Self::Binary {
                op: BinaryOp::And, ..
            } => 2,
            Self::Not(_) => 3,
            _ => 4,
        }
    }

    /// Visit every node depth-first together with its path from the root
    pub fn walk<'a, F>(&'a self, mut visit: F)
    where
        F: FnMut(&'a Expr, &str),
    {
        fn go<'a, F: FnMut(&'a Expr, &str)>(node: &'a Expr, path: &mut String, visit: &mut F) {
            visit(node, path);
            let len = path.len();
            match node {
                Expr::Binary { left, right, .. } => {
                    path.push_str(".left");
                    go(left, path, visit);
                    path.truncate(len);
                    path.push_str(".right");
                    go(right, path, visit);
                    path.truncate(len);
                }
                Expr::Not(operand) => {
                    path.push_str(".operand");
                    go(operand, path, visit);
                    path.truncate(len);
                }
                Expr::Lambda { predicate, .. } => {
                    path.push_str(".predicate");
                    go(predicate, path, visit);
                    path.truncate(len);
                }
                _ => {}
            }
        }

        let mut path = String::from("root");
        go(self, &mut path, &mut visit);
    }

    /// Field names referenced anywhere in the tree
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        self.walk(|node, _| match node {
            Expr::Comparison { field, .. }
            | Expr::ListMembership { field, .. }
            | Expr::Function { field, .. } => fields.push(field.as_str()),
            Expr::Lambda { collection, .. } => fields.push(collection.as_str()),
            _ => {}
        });
        fields
    }
}

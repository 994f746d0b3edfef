//! Boolean filter expressions
//!
//! Filter text follows a subset of the OData `$filter` grammar. Text is parsed
//! into an immutable [`Expr`] tree, checked against a [`FacetSet`], merged with
//! tool presets and rendered back to text for the backend.

mod ast;
mod compose;
mod lexer;
mod parser;
mod serialize;
mod validate;

pub use ast::{
    BinaryOp, CompareOp, DateValue, Expr, FunctionName, Literal, LiteralType, Quantifier,
};
pub use compose::{compose, compose_all};
pub use lexer::parse_date;
pub use parser::{parse, MAX_OPERATORS};
pub use serialize::to_filter_string;
pub use validate::{validate, FacetSet, FieldKind, FieldSchema, ValueRange, Warning, WarningReason};

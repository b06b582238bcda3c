//! Portable condition, update and expectation expressions.
//!
//! The pipeline is:
//!
//! 1. **Parsing**: turn a caller-supplied JSON expression into tagged
//!    expression types ([`ast`]), or build them directly with the typed builders.
//! 2. **Compiling**: encode operands through the schema and translate operators
//!    into the backend's native wire structures ([`compiler`]).
//!
//! Both steps run before any request is issued, so malformed expressions never
//! reach the backend.

pub mod ast;
pub mod compiler;
pub mod parser;

pub use ast::{
    ConditionExpr, Conditions, ExpectExpr, Expectations, Shorthand, UpdateExpr, UpdateShorthand,
    Updates,
};
pub use compiler::OperatorCompiler;
pub use parser::{parse_conditions, parse_expectations, parse_updates};

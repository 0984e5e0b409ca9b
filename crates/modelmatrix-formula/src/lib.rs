//! Formula parsing for modelmatrix.
//!
//! A formula such as `y ~ x1 + x2 - 1` names one response term and zero or
//! more predictor terms. Parsing produces polars expressions, one per term,
//! plus a flag saying whether the design matrix should carry an intercept.
//!
//! The adapter in the `modelmatrix` crate only talks to [`types::FormulaParser`];
//! [`engine::PatsyParser`] is the default implementation.

pub mod engine;
pub mod parser;
pub mod poly;
pub mod types;

pub use engine::PatsyParser;
pub use types::{FormulaError, FormulaParser, NamedOutput, ParsedFormula};

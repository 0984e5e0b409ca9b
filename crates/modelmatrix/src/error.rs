//! Adapter error types.

use modelmatrix_config::ConfigError;
use modelmatrix_formula::FormulaError;
use polars::prelude::PolarsError;

/// Errors returned by the adapter.
///
/// Parser and evaluation errors are passed through as-is; their messages
/// are not rewrapped.
#[derive(Debug, thiserror::Error)]
pub enum ModelMatrixError {
    /// The formula could not be parsed.
    #[error(transparent)]
    Formula(#[from] FormulaError),

    /// Evaluating an expression against the DataFrame failed, e.g. because
    /// it references a column the DataFrame does not have.
    #[error(transparent)]
    Polars(#[from] PolarsError),

    /// The naming configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A dense export met a missing value.
    #[error("column '{column}' has a missing value at row {row}")]
    MissingValue {
        /// The column or series name.
        column: String,
        /// 0-based row of the first missing value.
        row: usize,
    },
}

/// Convenience alias used throughout the adapter crate.
pub type Result<T> = std::result::Result<T, ModelMatrixError>;

impl ModelMatrixError {
    /// Returns `true` if the formula was rejected by the parser.
    pub fn is_formula_error(&self) -> bool {
        matches!(self, Self::Formula(_))
    }

    /// Returns `true` if evaluation failed because a referenced column does
    /// not exist in the DataFrame.
    pub fn is_missing_column(&self) -> bool {
        match self {
            Self::Polars(err) => is_column_not_found(err),
            _ => false,
        }
    }
}

fn is_column_not_found(err: &PolarsError) -> bool {
    match err {
        PolarsError::ColumnNotFound(_) => true,
        PolarsError::Context { error, .. } => is_column_not_found(error),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formula_errors_keep_their_message() {
        let inner = FormulaError::UnknownFunction("center".into());
        let err = ModelMatrixError::from(inner.clone());
        assert!(err.is_formula_error());
        assert!(!err.is_missing_column());
        assert_eq!(err.to_string(), inner.to_string());
    }

    #[test]
    fn missing_column_is_detected() {
        let err = ModelMatrixError::from(PolarsError::ColumnNotFound("nope".into()));
        assert!(err.is_missing_column());
        assert!(!err.is_formula_error());
    }

    #[test]
    fn missing_column_is_detected_through_context() {
        let err = PolarsError::Context {
            error: Box::new(PolarsError::ColumnNotFound("nope".into())),
            msg: "resolving select".into(),
        };
        assert!(ModelMatrixError::from(err).is_missing_column());
    }
}

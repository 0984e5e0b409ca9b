//! Response vectors and design matrices from polars DataFrames.
//!
//! ```no_run
//! use polars::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let df = df! {
//!     "y" => [1.0, 2.0, 3.0],
//!     "x1" => [0.5, 1.5, 2.5],
//!     "x2" => [3.0, 2.0, 1.0],
//! }?;
//! let (y, x) = modelmatrix::build_model_matrix(&df, "y ~ x1 + x2")?;
//! assert_eq!(x.width(), 3); // Intercept, x1, x2
//! assert_eq!(y.len(), 3);
//! # Ok(())
//! # }
//! ```
//!
//! Formula parsing is delegated to a [`FormulaParser`]; the default is
//! [`PatsyParser`]. Column naming is controlled by [`MatrixConfig`].
//!
//! With the `faer` feature, `dense` converts the results into `faer`
//! matrices for linear algebra.

pub mod adapter;
#[cfg(feature = "faer")]
pub mod dense;
pub mod error;
pub mod names;

pub use adapter::{ModelMatrixBuilder, build_model_matrix, build_model_matrix_with, parse};
#[cfg(feature = "faer")]
pub use dense::{to_faer_col, to_faer_mat};
pub use error::{ModelMatrixError, Result};
pub use names::make_clean_names;
pub use modelmatrix_config::MatrixConfig;
pub use modelmatrix_formula::{FormulaError, FormulaParser, NamedOutput, ParsedFormula, PatsyParser};

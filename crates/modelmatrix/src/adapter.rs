//! Build a response vector and a design matrix from a formula.

use std::path::Path;

use polars::prelude::*;
use tracing::debug;

use modelmatrix_config::{MatrixConfig, load_config};
use modelmatrix_formula::{FormulaError, FormulaParser, NamedOutput, PatsyParser};

use crate::error::Result;
use crate::names::make_clean_names;

/// Parse `formula` with the default parser.
///
/// Returns the response expression, the predictor expressions in order, and
/// whether an intercept column is requested.
pub fn parse(formula: &str) -> Result<(Expr, Vec<Expr>, bool)> {
    parse_with(&PatsyParser, formula)
}

/// Build `(y, X)` from `df` using the default parser and naming.
///
/// `X` holds an `Intercept` column of ones (unless the formula removes it)
/// followed by one column per predictor term. Both results are freshly
/// materialized; `df` is not modified.
///
/// # Errors
///
/// Parser errors and polars evaluation errors are returned unchanged. No
/// partial result is produced.
pub fn build_model_matrix(df: &DataFrame, formula: &str) -> Result<(Series, DataFrame)> {
    build_model_matrix_with(&PatsyParser, &MatrixConfig::default(), df, formula)
}

/// Build `(y, X)` with an explicit parser and naming configuration.
///
/// # Errors
///
/// Besides parser and evaluation errors, an invalid `config` (an empty
/// name) is rejected before anything is evaluated.
pub fn build_model_matrix_with<P: FormulaParser>(
    parser: &P,
    config: &MatrixConfig,
    df: &DataFrame,
    formula: &str,
) -> Result<(Series, DataFrame)> {
    config.validate()?;
    let (response, predictors, has_intercept) = parse_with(parser, formula)?;

    let label = config.response_name.clone();
    let response: Expr = response.into();
    let frame = project(df, vec![response.alias(label.as_str())], &[label.clone()])?;
    let y = frame
        .column(label.as_str())?
        .as_materialized_series()
        .clone();

    let mut columns = Vec::with_capacity(predictors.len() + 1);
    let mut names = Vec::with_capacity(predictors.len() + 1);
    if has_intercept && config.intercept {
        let name = column_name(config.intercept_name.clone(), config);
        columns.push(lit(1.0).alias(name.as_str()));
        names.push(name);
    }
    for (i, term) in predictors.into_iter().enumerate() {
        let name = column_name(predictor_name(&term, i + 1, config), config);
        let expr: Expr = term.into();
        columns.push(expr.alias(name.as_str()));
        names.push(name);
    }

    let x = project(df, columns, &names)?;
    debug!(
        formula,
        rows = x.height(),
        columns = x.width(),
        "built model matrix"
    );
    Ok((y, x))
}

/// Evaluate `columns` against `df` and keep only `names`, in order.
///
/// The columns are added with `with_columns` rather than selected directly
/// so that scalar results (`I(2)`, the intercept) are broadcast to the
/// height of `df`.
fn project(df: &DataFrame, columns: Vec<Expr>, names: &[String]) -> PolarsResult<DataFrame> {
    if columns.is_empty() {
        return Ok(DataFrame::empty());
    }
    df.clone()
        .lazy()
        .with_columns(columns)
        .select(names.iter().map(|name| col(name.as_str())).collect::<Vec<_>>())
        .collect()
}

fn column_name(name: String, config: &MatrixConfig) -> String {
    if config.clean_names {
        make_clean_names(&name)
    } else {
        name
    }
}

/// The output name for the predictor at 1-based `position`: its own name if
/// it reports one, otherwise the positional fallback.
fn predictor_name<T: NamedOutput>(term: &T, position: usize, config: &MatrixConfig) -> String {
    match term.output_name() {
        Some(name) => name,
        None => {
            let fallback = config.fallback_name(position);
            debug!(position, name = %fallback, "predictor has no output name");
            fallback
        }
    }
}

fn parse_with<P: FormulaParser>(
    parser: &P,
    formula: &str,
) -> Result<(P::Term, Vec<P::Term>, bool)> {
    let parsed = parser.parse(formula, true)?;
    let response = parsed.response.ok_or(FormulaError::MissingResponse)?;
    Ok((response, parsed.predictors, parsed.has_intercept))
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// A reusable adapter holding a parser and a naming configuration.
#[derive(Debug, Clone, Default)]
pub struct ModelMatrixBuilder<P = PatsyParser> {
    parser: P,
    config: MatrixConfig,
}

impl ModelMatrixBuilder<PatsyParser> {
    /// A builder with the default parser and naming.
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder with the default parser and naming loaded from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ModelMatrixError::Config`] if the file exists but
    /// cannot be loaded.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let config = load_config(path)?;
        Self::new().with_config(config)
    }
}

impl<P: FormulaParser> ModelMatrixBuilder<P> {
    /// A builder using `parser` and the default naming.
    pub fn with_parser(parser: P) -> Self {
        Self {
            parser,
            config: MatrixConfig::default(),
        }
    }

    /// Replace the naming configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ModelMatrixError::Config`] if `config` has an empty
    /// name.
    pub fn with_config(mut self, config: MatrixConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// The naming configuration in use.
    pub fn config(&self) -> &MatrixConfig {
        &self.config
    }

    /// Parse `formula` into response, predictors, and intercept flag.
    pub fn parse(&self, formula: &str) -> Result<(P::Term, Vec<P::Term>, bool)> {
        parse_with(&self.parser, formula)
    }

    /// Build `(y, X)`; see [`build_model_matrix`].
    pub fn build(&self, df: &DataFrame, formula: &str) -> Result<(Series, DataFrame)> {
        build_model_matrix_with(&self.parser, &self.config, df, formula)
    }
}

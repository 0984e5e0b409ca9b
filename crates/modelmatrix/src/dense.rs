//! Dense `faer` exports of the response and design matrix.

use faer::{Col, Mat};
use polars::prelude::*;

use crate::error::{ModelMatrixError, Result};

/// Copy a numeric DataFrame into a column-major `faer` matrix with one
/// column per DataFrame column.
///
/// # Errors
///
/// Fails if a column cannot be cast to `Float64` or holds a missing value.
pub fn to_faer_mat(df: &DataFrame) -> Result<Mat<f64>> {
    let columns = df
        .get_columns()
        .iter()
        .map(|c| f64_values(c.as_materialized_series()))
        .collect::<Result<Vec<_>>>()?;
    Ok(Mat::from_fn(df.height(), columns.len(), |i, j| columns[j][i]))
}

/// Copy a numeric Series into a `faer` column vector.
///
/// # Errors
///
/// Fails if the series cannot be cast to `Float64` or holds a missing value.
pub fn to_faer_col(series: &Series) -> Result<Col<f64>> {
    let values = f64_values(series)?;
    Ok(Col::from_fn(values.len(), |i| values[i]))
}

fn f64_values(series: &Series) -> Result<Vec<f64>> {
    let cast = series.cast(&DataType::Float64)?;
    cast.f64()?
        .iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| ModelMatrixError::MissingValue {
                column: series.name().to_string(),
                row,
            })
        })
        .collect()
}

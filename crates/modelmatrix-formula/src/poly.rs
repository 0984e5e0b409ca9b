//! Orthogonal polynomial bases for `poly(x, d)`.
//!
//! The basis matches R's `poly(x, degree)`: column `k` is a polynomial of
//! degree `k` in the centered data, orthogonal to every lower-degree column
//! (including the constant) and scaled to unit length.

use polars::prelude::*;

/// Evaluate column `order` (1-based) of the orthogonal basis of `column`.
///
/// Used as a whole-column polars UDF; nulls are rejected because the basis
/// is defined over every row.
pub fn orthogonal_column(
    column: Column,
    degree: usize,
    order: usize,
) -> PolarsResult<Option<Column>> {
    let name = column.name().clone();
    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    let values = series
        .f64()?
        .iter()
        .map(|v| {
            v.ok_or_else(|| {
                PolarsError::ComputeError(
                    format!("poly() does not accept missing values in '{name}'").into(),
                )
            })
        })
        .collect::<PolarsResult<Vec<f64>>>()?;

    let basis = orthogonal_basis(&values, degree)?;
    let picked = basis
        .into_iter()
        .nth(order.saturating_sub(1))
        .unwrap_or_else(|| vec![0.0; values.len()]);
    Ok(Some(Column::from(Series::new(name, picked))))
}

/// Columns 1..=`degree` of the orthogonal polynomial basis of `values`.
///
/// Uses the three-term recurrence on the centered data:
///
/// ```text
/// p0 = 1, p1 = c - a0
/// p(k+1) = (c - a_k) p_k - (n_k / n_(k-1)) p_(k-1)
/// a_k = sum(c p_k^2) / n_k,  n_k = sum(p_k^2)
/// ```
///
/// and divides each `p_k` by `sqrt(n_k)`. An empty input yields empty
/// columns.
///
/// # Errors
///
/// Fails when `degree` is not below the number of distinct values, since the
/// basis is then rank deficient.
pub fn orthogonal_basis(values: &[f64], degree: usize) -> PolarsResult<Vec<Vec<f64>>> {
    let n = values.len();
    if n == 0 {
        return Ok(vec![Vec::new(); degree]);
    }

    let distinct = distinct_count(values);
    if degree >= distinct {
        return Err(PolarsError::ComputeError(
            format!(
                "poly() degree must be less than the number of distinct values \
                 (degree {degree}, distinct values {distinct})"
            )
            .into(),
        ));
    }

    let mean = values.iter().sum::<f64>() / n as f64;
    let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();

    // p_(-1) = 0, so the first step reduces to p1 = c - a0.
    let mut prev = vec![0.0; n];
    let mut prev_norm = 1.0;
    let mut current = vec![1.0; n];
    let mut current_norm = n as f64;
    let mut basis = Vec::with_capacity(degree);

    for _ in 0..degree {
        let alpha = centered
            .iter()
            .zip(&current)
            .map(|(c, p)| c * p * p)
            .sum::<f64>()
            / current_norm;
        let beta = current_norm / prev_norm;
        let next: Vec<f64> = centered
            .iter()
            .zip(current.iter().zip(&prev))
            .map(|(c, (p, q))| (c - alpha) * p - beta * q)
            .collect();
        let next_norm: f64 = next.iter().map(|v| v * v).sum();

        let scale = next_norm.sqrt();
        basis.push(next.iter().map(|v| v / scale).collect());

        prev = std::mem::replace(&mut current, next);
        prev_norm = current_norm;
        current_norm = next_norm;
    }
    Ok(basis)
}

fn distinct_count(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup();
    sorted.len()
}

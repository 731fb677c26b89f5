//! Statistics helpers shared by the estimators
//!
//! Population moments, single-regressor OLS and a small dense least-squares
//! solver (normal equations, Gauss-Jordan inverse) for the ADF regressions.

use thiserror::Error;

/// Pivot magnitude below which a normal-equation matrix is treated as singular
const SINGULAR_PIVOT: f64 = 1e-12;
/// Relative variance below which a regressor is treated as constant
const MIN_RELATIVE_VARIANCE: f64 = 1e-12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StatsError {
    #[error("Insufficient data: requires {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Empty series")]
    EmptySeries,

    #[error("Degenerate regression: {0}")]
    DegenerateRegression(String),

    #[error("Series length mismatch: {0} vs {1}")]
    LengthMismatch(usize, usize),

    #[error("Non-finite value at index {0}")]
    NonFinite(usize),
}

pub fn mean(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        return None;
    }
    Some(xs.iter().sum::<f64>() / xs.len() as f64)
}

/// Standard deviation with divisor `n`
pub fn population_std(xs: &[f64], mean: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let variance = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64;
    variance.sqrt()
}

/// Standard deviation with divisor `n - 1`
pub fn sample_std(xs: &[f64], mean: f64) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    let variance = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    Some(variance.sqrt())
}

/// True when `std` is zero up to floating noise around `mean`
pub fn is_zero_spread(std: f64, mean: f64) -> bool {
    !std.is_finite() || std <= 1e-12 * (1.0 + mean.abs())
}

pub fn ensure_finite(xs: &[f64]) -> Result<(), StatsError> {
    match xs.iter().position(|x| !x.is_finite()) {
        Some(idx) => Err(StatsError::NonFinite(idx)),
        None => Ok(()),
    }
}

/// `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleRegression {
    pub intercept: f64,
    pub slope: f64,
}

/// Ordinary least squares of `y` on `x` with an intercept
pub fn simple_ols(y: &[f64], x: &[f64]) -> Result<SimpleRegression, StatsError> {
    if y.len() != x.len() {
        return Err(StatsError::LengthMismatch(y.len(), x.len()));
    }
    if x.len() < 2 {
        return Err(StatsError::InsufficientData { required: 2, actual: x.len() });
    }
    let mean_x = mean(x).ok_or(StatsError::EmptySeries)?;
    let mean_y = mean(y).ok_or(StatsError::EmptySeries)?;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        sxx += dx * dx;
        sxy += dx * (yi - mean_y);
    }

    let var_x = sxx / x.len() as f64;
    if !var_x.is_finite() || var_x <= MIN_RELATIVE_VARIANCE * mean_x.abs().max(1.0).powi(2) {
        return Err(StatsError::DegenerateRegression(format!(
            "regressor variance {:.3e} is effectively zero",
            var_x
        )));
    }

    let slope = sxy / sxx;
    Ok(SimpleRegression {
        intercept: mean_y - slope * mean_x,
        slope,
    })
}

/// Slope of `y` on `x` with no intercept: `sum(x * y) / sum(x^2)`
pub fn ols_through_origin(y: &[f64], x: &[f64]) -> Result<f64, StatsError> {
    if y.len() != x.len() {
        return Err(StatsError::LengthMismatch(y.len(), x.len()));
    }
    if x.is_empty() {
        return Err(StatsError::EmptySeries);
    }
    let sxx: f64 = x.iter().map(|v| v * v).sum();
    let sxy: f64 = x.iter().zip(y).map(|(xi, yi)| xi * yi).sum();
    if !sxx.is_finite() || sxx <= MIN_RELATIVE_VARIANCE * x.len() as f64 {
        return Err(StatsError::DegenerateRegression(format!(
            "regressor sum of squares {:.3e} is effectively zero",
            sxx
        )));
    }
    Ok(sxy / sxx)
}

/// Fitted multiple regression
#[derive(Debug, Clone, PartialEq)]
pub struct LeastSquares {
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    /// Sum of squared residuals
    pub ssr: f64,
    pub nobs: usize,
}

impl LeastSquares {
    pub fn t_value(&self, idx: usize) -> f64 {
        self.coefficients[idx] / self.std_errors[idx]
    }

    /// Gaussian log-likelihood based AIC, as reported by standard OLS packages
    pub fn aic(&self) -> f64 {
        let n = self.nobs as f64;
        let k = self.coefficients.len() as f64;
        let llf = -n / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (self.ssr / n).ln() + 1.0);
        -2.0 * llf + 2.0 * k
    }
}

/// Least squares of `y` on the columns of `rows` (no implicit intercept)
pub fn least_squares(rows: &[Vec<f64>], y: &[f64]) -> Result<LeastSquares, StatsError> {
    let n = rows.len();
    if n != y.len() {
        return Err(StatsError::LengthMismatch(n, y.len()));
    }
    let k = rows.first().map(|r| r.len()).unwrap_or(0);
    if k == 0 {
        return Err(StatsError::DegenerateRegression("no regressors".into()));
    }
    if n <= k {
        return Err(StatsError::InsufficientData { required: k + 1, actual: n });
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, yi) in rows.iter().zip(y) {
        for i in 0..k {
            xty[i] += row[i] * yi;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let inverse = invert(xtx)?;
    let coefficients: Vec<f64> = (0..k)
        .map(|i| (0..k).map(|j| inverse[i][j] * xty[j]).sum())
        .collect();

    let ssr: f64 = rows
        .iter()
        .zip(y)
        .map(|(row, yi)| {
            let fitted: f64 = row.iter().zip(&coefficients).map(|(x, b)| x * b).sum();
            (yi - fitted).powi(2)
        })
        .sum();

    let sigma2 = ssr / (n - k) as f64;
    let std_errors: Vec<f64> = (0..k).map(|i| (sigma2 * inverse[i][i]).sqrt()).collect();
    if std_errors.iter().any(|se| !se.is_finite() || *se <= 0.0) {
        return Err(StatsError::DegenerateRegression(
            "residual variance is zero; the fit is exact".into(),
        ));
    }

    Ok(LeastSquares {
        coefficients,
        std_errors,
        ssr,
        nobs: n,
    })
}

/// Gauss-Jordan inverse with partial pivoting
fn invert(mut a: Vec<Vec<f64>>) -> Result<Vec<Vec<f64>>, StatsError> {
    let k = a.len();
    let scale = (0..k).map(|i| a[i][i].abs()).fold(0.0_f64, f64::max).max(1.0);
    let mut inv: Vec<Vec<f64>> = (0..k)
        .map(|i| (0..k).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..k {
        let pivot_row = (col..k)
            .max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))
            .unwrap_or(col);
        if a[pivot_row][col].abs() <= SINGULAR_PIVOT * scale {
            return Err(StatsError::DegenerateRegression(
                "normal equations are singular".into(),
            ));
        }
        a.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot = a[col][col];
        for j in 0..k {
            a[col][j] /= pivot;
            inv[col][j] /= pivot;
        }
        for row in 0..k {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..k {
                a[row][j] -= factor * a[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }
    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_moments() {
        let xs = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = mean(&xs).unwrap();
        assert_eq!(m, 5.0);
        assert_eq!(population_std(&xs, m), 2.0);
        assert_relative_eq!(sample_std(&xs, m).unwrap(), 2.13809, epsilon = 1e-5);
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn test_simple_ols_exact_line() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 + 2.0 * v).collect();
        let fit = simple_ols(&y, &x).unwrap();
        assert_relative_eq!(fit.slope, 2.0, epsilon = 1e-12);
        assert_relative_eq!(fit.intercept, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_ols_through_origin() {
        let x = [1.0, 2.0, 3.0];
        let y = [2.0, 4.0, 6.0];
        assert_relative_eq!(ols_through_origin(&y, &x).unwrap(), 2.0);

        // an offset is absorbed into the slope
        let y = [12.0, 14.0, 16.0];
        assert_relative_eq!(ols_through_origin(&y, &x).unwrap(), 88.0 / 14.0, epsilon = 1e-12);

        assert!(matches!(
            ols_through_origin(&[1.0, 2.0], &[0.0, 0.0]),
            Err(StatsError::DegenerateRegression(_))
        ));
        assert_eq!(ols_through_origin(&[], &[]).unwrap_err(), StatsError::EmptySeries);
    }

    #[test]
    fn test_simple_ols_constant_regressor() {
        let x = vec![100.0; 40];
        let y: Vec<f64> = (0..40).map(|i| i as f64).collect();
        assert!(matches!(simple_ols(&y, &x), Err(StatsError::DegenerateRegression(_))));
    }

    #[test]
    fn test_least_squares_recovers_coefficients() {
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![1.0, i as f64, ((i * 7) % 5) as f64])
            .collect();
        let noise = [0.01, -0.02, 0.015, -0.01, 0.0];
        let y: Vec<f64> = rows
            .iter()
            .enumerate()
            .map(|(i, r)| 1.0 + 0.5 * r[1] - 2.0 * r[2] + noise[i % 5])
            .collect();

        let fit = least_squares(&rows, &y).unwrap();
        assert_relative_eq!(fit.coefficients[0], 1.0, epsilon = 0.05);
        assert_relative_eq!(fit.coefficients[1], 0.5, epsilon = 0.01);
        assert_relative_eq!(fit.coefficients[2], -2.0, epsilon = 0.01);
        assert!(fit.std_errors.iter().all(|se| *se > 0.0));
        assert!(fit.aic().is_finite());
    }

    #[test]
    fn test_least_squares_collinear_columns() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        let y: Vec<f64> = (0..10).map(|i| i as f64 + 0.1 * (i % 3) as f64).collect();
        assert!(matches!(least_squares(&rows, &y), Err(StatsError::DegenerateRegression(_))));
    }

    #[test]
    fn test_ensure_finite() {
        assert!(ensure_finite(&[1.0, 2.0]).is_ok());
        assert_eq!(ensure_finite(&[1.0, f64::INFINITY]), Err(StatsError::NonFinite(1)));
    }
}

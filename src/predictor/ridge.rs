//! Ridge-regularised linear regression solved through the normal equations.

use crate::error::TraderError;
use ndarray::{s, Array1, Array2, ArrayView1, Axis};

#[derive(Debug, Clone, Default)]
pub struct RidgeRegression {
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl RidgeRegression {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }

    pub fn n_features(&self) -> Option<usize> {
        self.coefficients.as_ref().map(|c| c.len())
    }

    /// Fit β = (X'X + λI)^(-1) X'y with an unpenalised intercept
    pub fn fit(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        lambda: f64,
    ) -> Result<(), TraderError> {
        if x.nrows() != y.len() {
            return Err(TraderError::Model(format!(
                "dimension mismatch: {} rows, {} targets",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 {
            return Err(TraderError::Model("no training rows".to_string()));
        }

        let ones = Array2::<f64>::ones((x.nrows(), 1));
        let design = ndarray::concatenate(Axis(1), &[ones.view(), x.view()])
            .map_err(|e| TraderError::Model(e.to_string()))?;

        let mut xtx = design.t().dot(&design);
        let xty = design.t().dot(y);

        // Small jitter keeps the intercept row positive definite too
        for i in 0..xtx.nrows() {
            xtx[[i, i]] += if i == 0 { 1e-10 } else { lambda + 1e-10 };
        }

        let beta = cholesky_solve(&xtx, &xty)?;
        self.intercept = beta[0];
        self.coefficients = Some(beta.slice(s![1..]).to_owned());

        Ok(())
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> Result<f64, TraderError> {
        let coefficients = self.coefficients.as_ref().ok_or(TraderError::NotFitted)?;

        if row.len() != coefficients.len() {
            return Err(TraderError::Model(format!(
                "expected {} features, got {}",
                coefficients.len(),
                row.len()
            )));
        }

        Ok(row.dot(coefficients) + self.intercept)
    }

    /// Mean squared error over a set of rows
    pub fn mse(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64, TraderError> {
        if x.nrows() == 0 {
            return Ok(0.0);
        }

        let mut total = 0.0;
        for (row, &target) in x.rows().into_iter().zip(y.iter()) {
            let err = self.predict_row(row)? - target;
            total += err * err;
        }
        Ok(total / x.nrows() as f64)
    }
}

/// Solve A x = b for symmetric positive definite A (A = L L^T)
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>, TraderError> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return Err(TraderError::Model(
                        "normal equations are not positive definite".to_string(),
                    ));
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * z[j];
        }
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (z[i] - sum) / l[[i, i]];
    }

    Ok(x)
}

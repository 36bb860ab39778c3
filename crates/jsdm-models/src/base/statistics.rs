//! Statistical transforms for fitted model artifacts

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Log-likelihood decomposition returned by a backend
///
/// The regularization loss answers a different question than the
/// likelihood and is never added to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogLikelihood {
    /// Negative log-likelihood of the data
    pub negative_log_likelihood: f64,
    /// Penalty incurred by the l1/l2 regularization
    pub regularization_loss: f64,
}

impl LogLikelihood {
    /// Create a new decomposition
    pub fn new(negative_log_likelihood: f64, regularization_loss: f64) -> Self {
        Self {
            negative_log_likelihood,
            regularization_loss,
        }
    }

    /// Log-likelihood, `-nll`
    pub fn log_lik(&self) -> f64 {
        -self.negative_log_likelihood
    }

    /// Deviance, `2 * nll`
    pub fn deviance(&self) -> f64 {
        deviance(self.negative_log_likelihood)
    }

    /// Both terms are finite
    pub fn is_finite(&self) -> bool {
        self.negative_log_likelihood.is_finite() && self.regularization_loss.is_finite()
    }
}

/// Deviance from a negative log-likelihood
pub fn deviance(negative_log_likelihood: f64) -> f64 {
    2.0 * negative_log_likelihood
}

/// Species association matrix `Σ Σᵗ` from its low-rank factor
pub fn covariance_from_factor(sigma: &Array2<f64>) -> Array2<f64> {
    sigma.dot(&sigma.t())
}

/// Covariance to correlation, `c_ij / sqrt(c_ii c_jj)`
///
/// Entries involving a zero-variance species are NaN.
pub fn cov_to_cor(cov: &Array2<f64>) -> Array2<f64> {
    let sd = cov.diag().mapv(f64::sqrt);
    let mut cor = cov.clone();

    for ((i, j), value) in cor.indexed_iter_mut() {
        *value /= sd[i] * sd[j];
    }
    // Exact ones, division may be off by an ulp
    for (i, s) in sd.iter().enumerate() {
        if *s > 0.0 {
            cor[(i, i)] = 1.0;
        }
    }

    cor
}

/// Two-sided Wald p-value, `2 (1 - Φ(|z|))`
pub fn pvalue_z(z: f64) -> f64 {
    match Normal::new(0.0, 1.0) {
        Ok(normal) if !z.is_nan() => (2.0 * normal.sf(z.abs())).min(1.0),
        _ => f64::NAN,
    }
}

/// Elementwise `estimate / std_error`
pub fn z_scores(estimates: &Array2<f64>, std_errors: &Array2<f64>) -> Array2<f64> {
    Zip::from(estimates)
        .and(std_errors)
        .map_collect(|&b, &se| b / se)
}

/// Elementwise two-sided p-values
pub fn p_values(z: &Array2<f64>) -> Array2<f64> {
    z.mapv(pvalue_z)
}

/// Significance code as printed by R
pub fn significance_stars(p: f64) -> &'static str {
    match p {
        p if p < 0.001 => "***",
        p if p < 0.01 => "**",
        p if p < 0.05 => "*",
        p if p < 0.1 => ".",
        _ => "",
    }
}

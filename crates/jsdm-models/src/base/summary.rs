//! Model summary structures

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::coefficient::Coefficient;
use super::statistics::{LogLikelihood, cov_to_cor, covariance_from_factor, p_values, z_scores};
use crate::sdm::config::Link;

/// Labels and dimensions of a fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Expanded model formula
    pub formula: String,
    /// Link function
    pub link: Link,
    /// Number of sites (rows)
    pub n_sites: usize,
    /// Degrees of freedom of the covariance factor
    pub df: usize,
    /// Species names, one per response column
    pub species: Vec<String>,
    /// Design column names
    pub predictors: Vec<String>,
}

/// Summary of a joint species distribution model
///
/// Returned matrices are never masked; only the printed correlation matrix
/// hides its upper triangle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdmSummary {
    /// Model labels and dimensions
    pub info: ModelInfo,
    /// Coefficients, predictors × species
    pub estimates: Array2<f64>,
    /// Standard errors, predictors × species
    pub standard_errors: Option<Array2<f64>>,
    /// Wald z-statistics, predictors × species
    pub z_scores: Option<Array2<f64>>,
    /// Two-sided p-values, predictors × species
    pub p_values: Option<Array2<f64>>,
    /// Coefficient table, species-major
    pub coefficients: Vec<Coefficient>,
    /// Species association matrix `Σ Σᵗ`
    pub covariance: Array2<f64>,
    /// Correlation matrix derived from `covariance`
    pub correlation: Array2<f64>,
    /// Log-likelihood decomposition
    pub log_likelihood: LogLikelihood,
}

impl SdmSummary {
    /// Assemble a summary from fitted artifacts
    ///
    /// `sigma` is the covariance factor (species × df). Test statistics are
    /// only computed when `standard_errors` is present.
    pub fn new(
        info: ModelInfo,
        estimates: Array2<f64>,
        standard_errors: Option<Array2<f64>>,
        sigma: &Array2<f64>,
        log_likelihood: LogLikelihood,
    ) -> Self {
        let covariance = covariance_from_factor(sigma);
        let correlation = cov_to_cor(&covariance);

        let z = standard_errors.as_ref().map(|se| z_scores(&estimates, se));
        let p = z.as_ref().map(p_values);

        let mut coefficients = Vec::with_capacity(estimates.len());
        for (k, species) in info.species.iter().enumerate() {
            for (j, predictor) in info.predictors.iter().enumerate() {
                let mut coef = Coefficient::new(species, predictor, estimates[(j, k)]);
                if let (Some(se), Some(z), Some(p)) = (&standard_errors, &z, &p) {
                    coef = coef
                        .with_std_error(se[(j, k)])
                        .with_z_stat(z[(j, k)])
                        .with_p_value(p[(j, k)]);
                }
                coefficients.push(coef);
            }
        }

        Self {
            info,
            estimates,
            standard_errors,
            z_scores: z,
            p_values: p,
            coefficients,
            covariance,
            correlation,
            log_likelihood,
        }
    }

    /// Whether the coefficient table carries test statistics
    pub fn has_tests(&self) -> bool {
        self.standard_errors.is_some()
    }

    /// Correlation matrix with the upper triangle zeroed, as printed
    pub fn masked_correlation(&self) -> Array2<f64> {
        let mut masked = self.correlation.clone();
        for ((i, j), value) in masked.indexed_iter_mut() {
            if j > i {
                *value = 0.0;
            }
        }
        masked
    }
}

impl fmt::Display for SdmSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Joint Species Distribution Model")?;
        writeln!(f, "================================")?;
        writeln!(f, "Formula: {}", self.info.formula)?;
        writeln!(f, "Link:    {}", self.info.link)?;
        writeln!(f, "Sites:   {}", self.info.n_sites)?;
        writeln!(f, "Species: {}", self.info.species.len())?;
        writeln!(f, "df:      {}", self.info.df)?;
        writeln!(f)?;

        let label_width = self
            .info
            .species
            .iter()
            .map(|s| s.len())
            .max()
            .unwrap_or(0)
            .max(8);

        writeln!(f, "Species-species correlation matrix:")?;
        write!(f, "{:<width$}", "", width = label_width)?;
        for species in &self.info.species {
            write!(f, " {:>10}", species)?;
        }
        writeln!(f)?;
        let masked = self.masked_correlation();
        for (i, row) in masked.rows().into_iter().enumerate() {
            write!(f, "{:<width$}", self.info.species[i], width = label_width)?;
            for value in row {
                write!(f, " {:>10.4}", value)?;
            }
            writeln!(f)?;
        }
        writeln!(f)?;

        writeln!(f, "LogLik:              {:.4}", self.log_likelihood.log_lik())?;
        writeln!(f, "Deviance:            {:.4}", self.log_likelihood.deviance())?;
        writeln!(
            f,
            "Regularization loss: {:.4}",
            self.log_likelihood.regularization_loss
        )?;
        writeln!(f)?;

        let name_width = self
            .coefficients
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0)
            .max(20);

        writeln!(f, "Coefficients:")?;
        if self.has_tests() {
            writeln!(
                f,
                "{:<width$} {:>12} {:>12} {:>12} {:>12}",
                "",
                "Estimate",
                "Std.Err",
                "Z value",
                "Pr(>|z|)",
                width = name_width
            )?;
            for coef in &self.coefficients {
                writeln!(
                    f,
                    "{:<width$} {:>12.6} {:>12.6} {:>12.4} {:>12.4} {}",
                    coef.name,
                    coef.estimate,
                    coef.std_error.unwrap_or(f64::NAN),
                    coef.z_stat.unwrap_or(f64::NAN),
                    coef.p_value.unwrap_or(f64::NAN),
                    coef.stars(),
                    width = name_width
                )?;
            }
            writeln!(f, "---")?;
            writeln!(
                f,
                "Signif. codes:  0 '***' 0.001 '**' 0.01 '*' 0.05 '.' 0.1 ' ' 1"
            )?;
        } else {
            writeln!(f, "{:<width$} {:>12}", "", "Estimate", width = name_width)?;
            for coef in &self.coefficients {
                writeln!(
                    f,
                    "{:<width$} {:>12.6}",
                    coef.name,
                    coef.estimate,
                    width = name_width
                )?;
            }
        }

        Ok(())
    }
}

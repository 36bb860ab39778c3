//! Fitted joint species distribution model

use log::{debug, warn};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::backend::ModelHandle;
use crate::base::{
    LogLikelihood, ModelError, ModelInfo, Result, SdmSummary, cov_to_cor, covariance_from_factor,
};
use crate::sdm::config::ModelConfig;
use crate::sdm::simulate::simulate_bernoulli;
use jsdm_core::data::{DataFrame, Matrix};
use jsdm_core::design::{DesignMatrix, PredictorData};
use jsdm_core::formula::ExpandedFormula;

/// Everything the backend handed back after training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedArtifacts {
    /// Layer weights, the first being predictors × species
    pub weights: Vec<Array2<f64>>,
    /// Covariance factor Σ, species × df
    pub sigma: Array2<f64>,
    /// Loss per epoch
    pub history: Vec<f64>,
    /// Log-likelihood on the training data
    pub log_likelihood: LogLikelihood,
    /// Standard errors, predictors × species
    pub standard_errors: Option<Array2<f64>>,
    /// Wall-clock fit time
    pub duration: Duration,
}

impl TrainedArtifacts {
    /// Check weight and factor shapes against the configuration
    pub(crate) fn validate(&self, config: &ModelConfig) -> Result<()> {
        let expected = (config.input_dim, config.output_dim);
        match self.weights.first() {
            Some(w) if w.dim() == expected => {}
            Some(w) => return Err(shape_error("weights", expected, w.dim())),
            None => return Err(shape_error("weights", expected, (0, 0))),
        }

        let expected = (config.output_dim, config.df);
        if self.sigma.dim() != expected {
            return Err(shape_error("covariance_factor", expected, self.sigma.dim()));
        }

        Ok(())
    }
}

fn shape_error(
    operation: &'static str,
    expected: (usize, usize),
    actual: (usize, usize),
) -> ModelError {
    ModelError::Collaborator {
        operation,
        source: crate::base::BackendError::shape(expected, actual),
    }
}

/// A trained model together with the data and formula it was trained on
///
/// Only the fit orchestrator creates one, so every method can assume a
/// completed fit.
#[derive(Debug)]
pub struct FittedModel<H: ModelHandle> {
    pub(crate) handle: H,
    pub(crate) config: ModelConfig,
    pub(crate) formula: ExpandedFormula,
    pub(crate) design: DesignMatrix,
    pub(crate) predictors: DataFrame,
    pub(crate) responses: Matrix,
    pub(crate) species: Vec<String>,
    pub(crate) artifacts: TrainedArtifacts,
}

impl<H: ModelHandle> FittedModel<H> {
    /// Resolved configuration
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Expanded formula, re-applied to new data at prediction time
    pub fn formula(&self) -> &ExpandedFormula {
        &self.formula
    }

    /// Design column names
    pub fn columns(&self) -> &[String] {
        &self.design.columns
    }

    /// Species names
    pub fn species(&self) -> &[String] {
        &self.species
    }

    /// Raw training predictors
    pub fn predictors(&self) -> &DataFrame {
        &self.predictors
    }

    /// Training responses, sites × species
    pub fn responses(&self) -> &Matrix {
        &self.responses
    }

    /// Backend handle
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Trained artifacts
    pub fn artifacts(&self) -> &TrainedArtifacts {
        &self.artifacts
    }

    /// Coefficients, predictors × species
    pub fn coefficients(&self) -> &Array2<f64> {
        // Non-empty, checked when the model was assembled
        &self.artifacts.weights[0]
    }

    /// All layer weights
    pub fn weights(&self) -> &[Array2<f64>] {
        &self.artifacts.weights
    }

    /// Replace the layer weights
    ///
    /// Shapes must match the current weights. Standard errors computed for
    /// the old coefficients are dropped.
    pub fn set_weights(&mut self, weights: Vec<Array2<f64>>) -> Result<()> {
        let expected: Vec<_> = self.artifacts.weights.iter().map(|w| w.dim()).collect();
        let actual: Vec<_> = weights.iter().map(|w| w.dim()).collect();
        if expected != actual {
            return Err(ModelError::invalid_config(format!(
                "Weight shapes {:?} do not match the model's {:?}",
                actual, expected
            )));
        }

        self.handle
            .set_weights(weights.clone())
            .map_err(ModelError::collaborator("set_weights"))?;
        self.artifacts.weights = weights;
        self.artifacts.standard_errors = None;

        Ok(())
    }

    /// Covariance factor Σ, species × df
    pub fn sigma(&self) -> &Array2<f64> {
        &self.artifacts.sigma
    }

    /// Species association matrix `Σ Σᵗ`
    pub fn covariance(&self) -> Array2<f64> {
        covariance_from_factor(&self.artifacts.sigma)
    }

    /// Species correlation matrix
    pub fn correlation(&self) -> Array2<f64> {
        cov_to_cor(&self.covariance())
    }

    /// Log-likelihood of the training data
    pub fn log_likelihood(&self) -> f64 {
        self.artifacts.log_likelihood.log_lik()
    }

    /// Negative log-likelihood and regularization loss
    pub fn log_likelihood_parts(&self) -> LogLikelihood {
        self.artifacts.log_likelihood
    }

    /// Training loss per epoch
    pub fn history(&self) -> &[f64] {
        &self.artifacts.history
    }

    /// Wall-clock fit time
    pub fn duration(&self) -> Duration {
        self.artifacts.duration
    }

    /// Standard errors, if computed and successful
    pub fn standard_errors(&self) -> Option<&Array2<f64>> {
        self.artifacts.standard_errors.as_ref()
    }

    /// Ask the backend for standard errors
    ///
    /// A backend failure is logged and leaves the model without standard
    /// errors; it never fails the model. Returns whether standard errors are
    /// now available.
    pub fn compute_standard_errors(&mut self) -> bool {
        let result = self.handle.standard_errors(
            &self.design.values,
            &self.responses,
            self.config.batch_size,
            self.config.parallel,
        );

        self.artifacts.standard_errors = match result {
            Ok(per_species) => self.stack_standard_errors(per_species),
            Err(e) => {
                warn!("Standard errors unavailable: {}", e);
                None
            }
        };

        self.artifacts.standard_errors.is_some()
    }

    /// Consuming form of [`FittedModel::compute_standard_errors`]
    pub fn with_standard_errors(mut self) -> Self {
        self.compute_standard_errors();
        self
    }

    fn stack_standard_errors(&self, per_species: Vec<ndarray::Array1<f64>>) -> Option<Array2<f64>> {
        let (p, k) = (self.config.input_dim, self.config.output_dim);
        if per_species.len() != k || per_species.iter().any(|se| se.len() != p) {
            warn!(
                "Standard errors unavailable: backend returned {} vectors, expected {} of length {}",
                per_species.len(),
                k,
                p
            );
            return None;
        }

        Some(Array2::from_shape_fn((p, k), |(j, s)| per_species[s][j]))
    }

    /// Labels and dimensions for reports
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            formula: self.formula.to_string(),
            link: self.config.link,
            n_sites: self.design.nrows(),
            df: self.config.df,
            species: self.species.clone(),
            predictors: self.design.columns.clone(),
        }
    }

    /// Coefficient table, correlations and likelihood
    pub fn summary(&self) -> SdmSummary {
        SdmSummary::new(
            self.info(),
            self.coefficients().clone(),
            self.artifacts.standard_errors.clone(),
            &self.artifacts.sigma,
            self.artifacts.log_likelihood,
        )
    }

    /// Predict responses
    ///
    /// Without new data the training predictors are used. New data goes
    /// through the stored formula and must produce the training-time design
    /// columns.
    pub fn predict(&self, newdata: Option<PredictorData>) -> Result<Array2<f64>> {
        let prediction = match newdata {
            None => self.handle.predict(&self.design.values),
            Some(data) => {
                let design = self.design_for(data)?;
                self.handle.predict(&design.values)
            }
        };

        prediction.map_err(ModelError::collaborator("predict"))
    }

    fn design_for(&self, data: PredictorData) -> Result<DesignMatrix> {
        let frame = data.into_frame()?;

        let design = self.formula.design_matrix(&frame).map_err(|e| {
            if e.is_schema_mismatch() {
                debug!("New data does not fit the training formula: {}", e);
                ModelError::ColumnMismatch {
                    expected: self.formula.variables().iter().map(|s| s.to_string()).collect(),
                    actual: frame.column_names().iter().map(|s| s.to_string()).collect(),
                }
            } else {
                ModelError::InvalidFormula(e)
            }
        })?;

        if design.columns != self.design.columns {
            return Err(ModelError::ColumnMismatch {
                expected: self.design.columns.clone(),
                actual: design.columns,
            });
        }

        Ok(design)
    }

    /// Draw `n` binary replicates of the training responses
    ///
    /// Returns an array indexed (replicate, site, species). Fails under the
    /// linear link before any draw.
    pub fn simulate(&self, n: usize, seed: Option<u64>) -> Result<Array3<f64>> {
        if !self.config.link.is_binary() {
            return Err(ModelError::UnsupportedLink {
                link: self.config.link.to_string(),
            });
        }

        let probabilities = self.predict(None)?;
        simulate_bernoulli(&probabilities, n, seed)
    }

    /// Serializable copy of the model
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            config: self.config.clone(),
            formula: self.formula.clone(),
            design: self.design.clone(),
            predictors: self.predictors.clone(),
            responses: self.responses.clone(),
            species: self.species.clone(),
            artifacts: self.artifacts.clone(),
        }
    }
}

impl<H: ModelHandle> fmt::Display for FittedModel<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ll = &self.artifacts.log_likelihood;

        writeln!(f, "Joint Species Distribution Model")?;
        writeln!(f, "Formula:    {}", self.formula)?;
        writeln!(f, "Link:       {}", self.config.link)?;
        writeln!(
            f,
            "Dimensions: {} sites, {} species, {} predictors, df = {}",
            self.design.nrows(),
            self.config.output_dim,
            self.config.input_dim,
            self.config.df
        )?;
        writeln!(f)?;
        writeln!(f, "LogLik:              {:.4}", ll.log_lik())?;
        writeln!(f, "Regularization loss: {:.4}", ll.regularization_loss)?;
        writeln!(f, "Fit time:            {:.2?}", self.artifacts.duration)?;

        Ok(())
    }
}

/// Plain-data copy of a fitted model, serializable with serde
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub config: ModelConfig,
    pub formula: ExpandedFormula,
    pub design: DesignMatrix,
    pub predictors: DataFrame,
    pub responses: Matrix,
    pub species: Vec<String>,
    pub artifacts: TrainedArtifacts,
}

impl ModelSnapshot {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check that the stored data and names agree with the configuration
    pub(crate) fn validate(&self) -> Result<()> {
        let (p, k) = (self.config.input_dim, self.config.output_dim);
        let n = self.design.nrows();

        if self.design.columns.len() != p || self.design.values.ncols() != p {
            return Err(ModelError::invalid_config(format!(
                "snapshot design has {} columns and {} names, expected {}",
                self.design.values.ncols(),
                self.design.columns.len(),
                p
            )));
        }
        if self.species.len() != k {
            return Err(ModelError::invalid_config(format!(
                "snapshot names {} species, expected {}",
                self.species.len(),
                k
            )));
        }
        if self.responses.dim() != (n, k) {
            return Err(ModelError::invalid_config(format!(
                "snapshot responses are {:?}, expected ({}, {})",
                self.responses.dim(),
                n,
                k
            )));
        }
        if self.predictors.nrows() != n {
            return Err(ModelError::invalid_config(format!(
                "snapshot predictors have {} rows, expected {}",
                self.predictors.nrows(),
                n
            )));
        }
        if let Some(se) = self.artifacts.standard_errors.as_ref().filter(|se| se.dim() != (p, k)) {
            return Err(ModelError::invalid_config(format!(
                "snapshot standard errors are {:?}, expected ({}, {})",
                se.dim(),
                p,
                k
            )));
        }

        self.artifacts.validate(&self.config)
    }
}

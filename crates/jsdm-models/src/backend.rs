//! Numerical backend interface
//!
//! Training, prediction and the likelihood are computed by an external
//! engine. A [`Backend`] builds models; a [`ModelHandle`] is one model living
//! inside that engine. Everything crossing this boundary is an `ndarray`
//! array or one of the plain configuration structs below.

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use crate::base::{BackendResult, LogLikelihood};
use crate::sdm::config::{Device, Link, ModelConfig, OptimizerSpec, Precision};

/// Activation of a dense layer; the species layer is always linear
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
    #[default]
    Linear,
}

/// Dense layer added on top of the model input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    /// Output width
    pub width: usize,
    /// Whether the layer has a bias term
    pub bias: bool,
    pub l1: f64,
    pub l2: f64,
    pub activation: Activation,
}

/// Covariance head, optimizer and link
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CovarianceSpec {
    /// Columns of the covariance factor
    pub df: usize,
    pub l1_cov: f64,
    pub l2_cov: f64,
    /// Penalize `Σ Σᵗ` rather than `Σ`
    pub reg_on_cov: bool,
    /// Include the diagonal in the penalty
    pub reg_on_diag: bool,
    pub optimizer: OptimizerSpec,
    pub link: Link,
}

/// Training loop settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitSpec {
    pub batch_size: usize,
    pub epochs: usize,
    /// Data-loading workers
    pub parallel: usize,
    /// Monte-Carlo samples per likelihood evaluation
    pub sampling: usize,
}

impl LayerSpec {
    /// The single bias-free linear layer from inputs to species
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            width: config.output_dim,
            bias: false,
            l1: config.l1_coefs,
            l2: config.l2_coefs,
            activation: Activation::Linear,
        }
    }
}

impl CovarianceSpec {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            df: config.df,
            l1_cov: config.l1_cov,
            l2_cov: config.l2_cov,
            reg_on_cov: config.reg_on_cov,
            reg_on_diag: config.reg_on_diag,
            optimizer: config.optimizer,
            link: config.link,
        }
    }
}

impl FitSpec {
    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            epochs: config.epochs,
            parallel: config.parallel,
            sampling: config.sampling,
        }
    }
}

/// A model instance inside the numerical engine
pub trait ModelHandle {
    /// Append a dense layer
    fn add_layer(&mut self, layer: &LayerSpec) -> BackendResult<()>;

    /// Attach the covariance head, optimizer and link
    fn configure(&mut self, spec: &CovarianceSpec) -> BackendResult<()>;

    /// Train on sites × predictors `x` and sites × species `y`, blocking
    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>, spec: &FitSpec) -> BackendResult<()>;

    /// Negative log-likelihood and regularization loss on `(x, y)`
    fn log_likelihood(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        batch_size: usize,
        parallel: usize,
    ) -> BackendResult<LogLikelihood>;

    /// Standard errors of the coefficients, one vector per species
    fn standard_errors(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        batch_size: usize,
        parallel: usize,
    ) -> BackendResult<Vec<Array1<f64>>>;

    /// Predicted responses (probabilities under probit/logit), sites × species
    fn predict(&self, x: &Array2<f64>) -> BackendResult<Array2<f64>>;

    /// Layer weights, the first being predictors × species
    fn weights(&self) -> Vec<Array2<f64>>;

    fn set_weights(&mut self, weights: Vec<Array2<f64>>) -> BackendResult<()>;

    /// Covariance factor Σ, species × df
    fn covariance_factor(&self) -> Array2<f64>;

    fn set_covariance_factor(&mut self, sigma: Array2<f64>) -> BackendResult<()>;

    /// Loss per epoch
    fn training_history(&self) -> Vec<f64>;
}

/// Factory for model handles
pub trait Backend {
    type Handle: ModelHandle;

    /// Create an empty model taking `input_dim` columns
    fn build_model(
        &self,
        input_dim: usize,
        device: Device,
        precision: Precision,
    ) -> BackendResult<Self::Handle>;

    /// Free cached device memory
    ///
    /// Must be safe to call at any time, including when no accelerator was
    /// ever used.
    fn release_cache(&self);
}

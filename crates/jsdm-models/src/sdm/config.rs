//! Model configuration
//!
//! [`SdmConfig`] holds what the caller asks for; [`SdmConfig::resolve`]
//! validates it against the design and response matrices and fills in the
//! data-dependent defaults, producing an immutable [`ModelConfig`].

use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::base::{ModelError, Result};
use jsdm_core::data::{DataFrame, Matrix};
use jsdm_core::design::DesignMatrix;

/// Link between the linear predictor and the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Link {
    /// Multivariate probit
    #[default]
    Probit,
    /// Logistic
    Logit,
    /// Identity
    Linear,
}

impl Link {
    /// Whether predictions are probabilities
    pub fn is_binary(&self) -> bool {
        matches!(self, Link::Probit | Link::Logit)
    }

    /// Lower-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            Link::Probit => "probit",
            Link::Logit => "logit",
            Link::Linear => "linear",
        }
    }
}

impl FromStr for Link {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "probit" => Ok(Link::Probit),
            "logit" => Ok(Link::Logit),
            "linear" => Ok(Link::Linear),
            other => Err(ModelError::invalid_config(format!(
                "link must be one of probit, logit, linear; got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Device {
    /// No accelerator
    #[default]
    Cpu,
    /// Accelerator by index
    Gpu(usize),
}

impl Device {
    /// Normalize a device token
    ///
    /// An integer is an accelerator index, `"gpu"` / `"cuda"` mean index 0,
    /// `"cpu"` or no token means no accelerator.
    pub fn parse(token: Option<&str>) -> Result<Self> {
        let Some(token) = token else {
            return Ok(Device::Cpu);
        };

        let token = token.trim().to_ascii_lowercase();
        if let Ok(index) = token.parse::<usize>() {
            return Ok(Device::Gpu(index));
        }

        match token.as_str() {
            "" | "cpu" => Ok(Device::Cpu),
            "gpu" | "cuda" => Ok(Device::Gpu(0)),
            other => match other.strip_prefix("cuda:").map(str::parse::<usize>) {
                Some(Ok(index)) => Ok(Device::Gpu(index)),
                _ => Err(ModelError::invalid_config(format!(
                    "Unknown device '{}'; use 'cpu', 'gpu' or an index",
                    other
                ))),
            },
        }
    }
}

impl From<usize> for Device {
    fn from(index: usize) -> Self {
        Device::Gpu(index)
    }
}

impl FromStr for Device {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Device::parse(Some(s))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Gpu(index) => write!(f, "gpu:{}", index),
        }
    }
}

/// Floating point precision used by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Float32,
    Float64,
}

impl FromStr for Precision {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float32" | "f32" => Ok(Precision::Float32),
            "float64" | "f64" | "double" => Ok(Precision::Float64),
            other => Err(ModelError::invalid_config(format!(
                "precision must be float32 or float64; got '{}'",
                other
            ))),
        }
    }
}

/// Optimizer families understood by backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OptimizerKind {
    #[default]
    Adamax,
    Adam,
    RmsProp,
    Sgd,
}

/// Optimizer and its step size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSpec {
    /// Optimizer family
    pub kind: OptimizerKind,
    /// Learning rate
    pub learning_rate: f64,
}

impl OptimizerSpec {
    /// Create an optimizer spec
    pub fn new(kind: OptimizerKind, learning_rate: f64) -> Self {
        Self {
            kind,
            learning_rate,
        }
    }
}

impl Default for OptimizerSpec {
    fn default() -> Self {
        Self::new(OptimizerKind::Adamax, 0.01)
    }
}

/// User-facing model settings
///
/// `None` fields are derived from the data by [`SdmConfig::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdmConfig {
    /// Degrees of freedom of the covariance factor, default `species / 2`
    pub df: Option<usize>,
    /// l1 penalty on coefficients
    pub l1_coefs: f64,
    /// l2 penalty on coefficients
    pub l2_coefs: f64,
    /// l1 penalty on the covariance
    pub l1_cov: f64,
    /// l2 penalty on the covariance
    pub l2_cov: f64,
    /// Penalize the full association matrix instead of its factor
    pub reg_on_cov: bool,
    /// Include the diagonal in the covariance penalty
    pub reg_on_diag: bool,
    /// Link function
    pub link: Link,
    /// Optimizer
    pub optimizer: OptimizerSpec,
    /// Mini-batch size, default a tenth of the sites
    pub batch_size: Option<usize>,
    /// Training epochs
    pub epochs: usize,
    /// Monte-Carlo samples per likelihood evaluation
    pub sampling: usize,
    /// Data-loading workers, passed through to the backend
    pub parallel: usize,
    /// Compute device
    pub device: Device,
    /// Numeric precision
    pub precision: Precision,
    /// Compute standard errors after fitting
    pub se: bool,
}

impl Default for SdmConfig {
    fn default() -> Self {
        Self {
            df: None,
            l1_coefs: 0.0,
            l2_coefs: 0.0,
            l1_cov: 0.0,
            l2_cov: 0.0,
            reg_on_cov: true,
            reg_on_diag: true,
            link: Link::Probit,
            optimizer: OptimizerSpec::default(),
            batch_size: None,
            epochs: 100,
            sampling: 100,
            parallel: 0,
            device: Device::Cpu,
            precision: Precision::Float32,
            se: false,
        }
    }
}

impl SdmConfig {
    /// Set the covariance degrees of freedom
    pub fn with_df(mut self, df: usize) -> Self {
        self.df = Some(df);
        self
    }

    /// Set l1 and l2 penalties on the coefficients
    pub fn with_coef_penalty(mut self, l1: f64, l2: f64) -> Self {
        self.l1_coefs = l1;
        self.l2_coefs = l2;
        self
    }

    /// Set l1 and l2 penalties on the covariance
    pub fn with_cov_penalty(mut self, l1: f64, l2: f64) -> Self {
        self.l1_cov = l1;
        self.l2_cov = l2;
        self
    }

    /// Choose what the covariance penalty applies to
    pub fn with_cov_regularization(mut self, reg_on_cov: bool, reg_on_diag: bool) -> Self {
        self.reg_on_cov = reg_on_cov;
        self.reg_on_diag = reg_on_diag;
        self
    }

    /// Set the link function
    pub fn with_link(mut self, link: Link) -> Self {
        self.link = link;
        self
    }

    /// Set the optimizer
    pub fn with_optimizer(mut self, kind: OptimizerKind, learning_rate: f64) -> Self {
        self.optimizer = OptimizerSpec::new(kind, learning_rate);
        self
    }

    /// Set the learning rate, keeping the optimizer
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.optimizer.learning_rate = learning_rate;
        self
    }

    /// Set the mini-batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Set the number of epochs
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the Monte-Carlo sample count
    pub fn with_sampling(mut self, sampling: usize) -> Self {
        self.sampling = sampling;
        self
    }

    /// Set the number of data-loading workers
    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the device
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Set the precision
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Compute standard errors after fitting
    pub fn with_se(mut self, se: bool) -> Self {
        self.se = se;
        self
    }

    /// Validate against the data and fill in derived defaults
    pub fn resolve(&self, design: &DesignMatrix, responses: &Matrix) -> Result<ModelConfig> {
        let (n_sites, input_dim) = (design.nrows(), design.ncols());
        let (n_rows, output_dim) = responses.dim();

        if n_sites == 0 || input_dim == 0 {
            return Err(ModelError::invalid_config(format!(
                "Predictors must be a non-empty 2D table, got {} x {}",
                n_sites, input_dim
            )));
        }
        if n_rows == 0 || output_dim == 0 {
            return Err(ModelError::invalid_config(format!(
                "Responses must be a non-empty 2D matrix, got {} x {}",
                n_rows, output_dim
            )));
        }
        if n_rows != n_sites {
            return Err(ModelError::invalid_config(format!(
                "Predictors have {} rows but responses have {}",
                n_sites, n_rows
            )));
        }
        if responses.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::invalid_config(
                "Responses contain non-finite values",
            ));
        }

        for (name, value) in [
            ("l1_coefs", self.l1_coefs),
            ("l2_coefs", self.l2_coefs),
            ("l1_cov", self.l1_cov),
            ("l2_cov", self.l2_cov),
            ("learning_rate", self.optimizer.learning_rate),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ModelError::invalid_config(format!(
                    "{} must be a finite value >= 0, got {}",
                    name, value
                )));
            }
        }

        let df = match self.df {
            Some(0) => return Err(ModelError::invalid_config("df must be > 0")),
            Some(df) => df,
            None => (output_dim / 2).max(1),
        };

        let batch_size = match self.batch_size {
            Some(0) => return Err(ModelError::invalid_config("batch_size must be >= 1")),
            Some(size) => size,
            None => (n_sites / 10).max(1),
        };

        let config = ModelConfig {
            input_dim,
            output_dim,
            df,
            l1_coefs: self.l1_coefs,
            l2_coefs: self.l2_coefs,
            l1_cov: self.l1_cov,
            l2_cov: self.l2_cov,
            reg_on_cov: self.reg_on_cov,
            reg_on_diag: self.reg_on_diag,
            link: self.link,
            optimizer: self.optimizer,
            batch_size,
            epochs: self.epochs,
            sampling: self.sampling,
            parallel: self.parallel,
            device: self.device,
            precision: self.precision,
        };
        debug!("Resolved model configuration: {:?}", config);

        Ok(config)
    }
}

/// Validated, immutable model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of design columns
    pub input_dim: usize,
    /// Number of species
    pub output_dim: usize,
    /// Degrees of freedom of the covariance factor
    pub df: usize,
    pub l1_coefs: f64,
    pub l2_coefs: f64,
    pub l1_cov: f64,
    pub l2_cov: f64,
    pub reg_on_cov: bool,
    pub reg_on_diag: bool,
    pub link: Link,
    pub optimizer: OptimizerSpec,
    pub batch_size: usize,
    pub epochs: usize,
    pub sampling: usize,
    pub parallel: usize,
    pub device: Device,
    pub precision: Precision,
}

/// Response input: a numeric matrix or a table of numeric columns
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    /// Unnamed matrix, species become `Y1 ... YK`
    Matrix(Matrix),
    /// Table with one numeric column per species
    Frame(DataFrame),
}

impl ResponseData {
    /// Numeric matrix and species names
    pub fn into_matrix(self) -> Result<(Matrix, Vec<String>)> {
        match self {
            ResponseData::Matrix(m) => {
                let names = (1..=m.ncols()).map(|k| format!("Y{}", k)).collect();
                Ok((m, names))
            }
            ResponseData::Frame(df) => {
                let names = df.column_names().iter().map(|s| s.to_string()).collect();
                let m = df.numeric_matrix().map_err(|e| {
                    ModelError::invalid_config(format!("Responses must be numeric: {}", e))
                })?;
                Ok((m, names))
            }
        }
    }
}

impl From<Array2<f64>> for ResponseData {
    fn from(m: Array2<f64>) -> Self {
        ResponseData::Matrix(m)
    }
}

impl From<&Array2<f64>> for ResponseData {
    fn from(m: &Array2<f64>) -> Self {
        ResponseData::Matrix(m.clone())
    }
}

impl From<DataFrame> for ResponseData {
    fn from(df: DataFrame) -> Self {
        ResponseData::Frame(df)
    }
}

impl From<&DataFrame> for ResponseData {
    fn from(df: &DataFrame) -> Self {
        ResponseData::Frame(df.clone())
    }
}

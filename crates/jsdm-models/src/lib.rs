//! Joint species distribution models
//!
//! Configuration, fit orchestration and statistical reporting on top of a
//! pluggable numerical [`Backend`]. Formula parsing and design matrices come
//! from `jsdm-core`.
//!
//! ```ignore
//! use jsdm_models::{Sdm, SdmConfig};
//!
//! let sdm = Sdm::new(backend);
//! let model = sdm.fit(&x, &y, None, &SdmConfig::default().with_se(true))?;
//! println!("{}", model.summary());
//! ```

pub mod backend;
pub mod base;
pub mod error;
pub mod sdm;

pub use backend::{Activation, Backend, CovarianceSpec, FitSpec, LayerSpec, ModelHandle};
pub use base::{BackendResult, Coefficient, LogLikelihood, ModelInfo, Result, SdmSummary};
pub use error::{BackendError, ModelError};
pub use sdm::{
    Device, FittedModel, Link, ModelConfig, ModelSnapshot, OptimizerKind, OptimizerSpec,
    Precision, ResponseData, Sdm, SdmConfig,
};

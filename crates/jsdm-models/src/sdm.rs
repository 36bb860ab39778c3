//! Joint species distribution models
//!
//! A multivariate probit (or logit) model: one dense layer maps the design
//! matrix to species, and a low-rank covariance factor Σ (species × df)
//! captures species associations. Training runs inside a [`Backend`];
//! this module configures it, drives it and reports on the result.
//!
//! [`Backend`]: crate::backend::Backend

pub mod config;
pub mod fitted;
pub mod model;
pub mod simulate;

#[cfg(test)]
pub(crate) mod mock;

pub use config::{
    Device, Link, ModelConfig, OptimizerKind, OptimizerSpec, Precision, ResponseData, SdmConfig,
};
pub use fitted::{FittedModel, ModelSnapshot, TrainedArtifacts};
pub use model::Sdm;
pub use simulate::simulate_bernoulli;

//! Shared result types and statistical reporting
//!
//! Everything here works on plain arrays handed back by a backend: the
//! covariance-to-correlation transform, Wald tests and the printed summary.

pub use coefficient::Coefficient;
pub use statistics::{
    LogLikelihood, cov_to_cor, covariance_from_factor, deviance, p_values, pvalue_z,
    significance_stars, z_scores,
};
pub use summary::{ModelInfo, SdmSummary};

pub use crate::error::{BackendError, ModelError};

pub mod coefficient;
pub mod statistics;
pub mod summary;


/// Result type for model operations
pub type Result<T> = std::result::Result<T, ModelError>;

/// Result type for backend operations
pub type BackendResult<T> = std::result::Result<T, BackendError>;

//! Model-related error types

use thiserror::Error;

use jsdm_core::formula::error::FormulaError;

/// Errors raised by a numerical backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// Numerical failure inside the engine (singular information matrix, NaN loss, ...)
    #[error("Numerical failure in {operation}: {message}")]
    Numerical {
        /// Operation that failed
        operation: String,
        /// Error message
        message: String,
    },

    /// Array handed to the engine has the wrong shape
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    Shape {
        /// Expected shape
        expected: String,
        /// Actual shape
        actual: String,
    },

    /// Device could not be used
    #[error("Device error: {0}")]
    Device(String),

    /// Method called out of order, e.g. fit before configure
    #[error("Invalid backend state: {0}")]
    State(String),
}

impl BackendError {
    /// Create a numerical error
    pub fn numerical(operation: &str, message: impl Into<String>) -> Self {
        BackendError::Numerical {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Create a shape error from two `(rows, cols)` pairs
    pub fn shape(expected: (usize, usize), actual: (usize, usize)) -> Self {
        BackendError::Shape {
            expected: format!("{:?}", expected),
            actual: format!("{:?}", actual),
        }
    }
}

/// Model-related errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// Formula parsing failed or referenced an unknown variable
    #[error("Invalid formula: {0}")]
    InvalidFormula(#[from] FormulaError),

    /// Out-of-range hyperparameter or malformed input shape
    #[error("Invalid model configuration: {message}")]
    InvalidConfig {
        /// Configuration error message
        message: String,
    },

    /// Prediction data does not produce the training-time design columns
    #[error("Column mismatch: expected {expected:?}, got {actual:?}")]
    ColumnMismatch {
        /// Columns seen at training time
        expected: Vec<String>,
        /// Columns found in the new data
        actual: Vec<String>,
    },

    /// The numerical backend failed
    #[error("Backend failed during {operation}: {source}")]
    Collaborator {
        /// Backend operation that failed
        operation: &'static str,
        /// Underlying backend error
        #[source]
        source: BackendError,
    },

    /// Binary simulation requested under a link without probabilities
    #[error("Link '{link}' does not produce probabilities; simulation needs probit or logit")]
    UnsupportedLink {
        /// Name of the link
        link: String,
    },

    /// Snapshot (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ModelError {
    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        ModelError::InvalidConfig {
            message: message.into(),
        }
    }

    /// Wrap a backend error with the operation that raised it
    pub fn collaborator(operation: &'static str) -> impl FnOnce(BackendError) -> Self {
        move |source| ModelError::Collaborator { operation, source }
    }
}

//! Tabular data structures for predictor and response tables
//!
//! Sites are rows, variables are columns. Raw numeric matrices are coerced
//! into a [`DataFrame`] with synthetic column names before formula expansion.

mod builder;
mod dataframe;
mod series;


// Re-exports
pub use builder::DataFrameBuilder;
pub use dataframe::DataFrame;
pub use series::{Series, SeriesValue};

// Type aliases for common use cases
pub type FloatArray = ndarray::Array1<f64>;
pub type IntArray = ndarray::Array1<i64>;
pub type BoolArray = ndarray::Array1<bool>;
pub type StringArray = Vec<String>;
pub type Matrix = ndarray::Array2<f64>;

/// Error types specific to data operations
#[derive(thiserror::Error, Debug)]
pub enum DataError {
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    #[error("Column '{0}' not found")]
    ColumnNotFound(String),

    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("Column '{column}' requires numeric data, got {dtype}")]
    NonNumericData { column: String, dtype: &'static str },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for data operations
pub type Result<T> = std::result::Result<T, DataError>;

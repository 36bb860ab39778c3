//! Core data structures for jsdm
//!
//! Site-by-variable tables, R-style formulas and the design matrices built
//! from them. Model fitting and reporting live in `jsdm-models`.

pub mod data;
pub mod design;
pub mod formula;

pub use data::{DataError, DataFrame, DataFrameBuilder, Matrix, Series};
pub use design::{DesignMatrix, PredictorData, expand_predictors};
pub use formula::{ExpandedFormula, Formula, FormulaError, FormulaResult};

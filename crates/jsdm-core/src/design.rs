//! Design matrices and predictor input coercion

use crate::data::{DataFrame, Matrix};
use crate::formula::{ExpandedFormula, Formula, FormulaError, FormulaResult};
use serde::{Deserialize, Serialize};

/// Predictor input: a named table or a raw numeric matrix
#[derive(Debug, Clone, PartialEq)]
pub enum PredictorData {
    /// Table with named columns
    Frame(DataFrame),
    /// Unnamed matrix, columns become `X1 ... Xp`
    Matrix(Matrix),
}

impl PredictorData {
    /// Coerce to a table, naming matrix columns `X1 ... Xp`
    pub fn into_frame(self) -> FormulaResult<DataFrame> {
        match self {
            PredictorData::Frame(df) => Ok(df),
            PredictorData::Matrix(m) => Ok(DataFrame::from_matrix::<&str>(&m, None)?),
        }
    }

    /// Number of sites
    pub fn nrows(&self) -> usize {
        match self {
            PredictorData::Frame(df) => df.nrows(),
            PredictorData::Matrix(m) => m.nrows(),
        }
    }

    /// Number of raw predictor columns
    pub fn ncols(&self) -> usize {
        match self {
            PredictorData::Frame(df) => df.ncols(),
            PredictorData::Matrix(m) => m.ncols(),
        }
    }
}

impl From<DataFrame> for PredictorData {
    fn from(df: DataFrame) -> Self {
        PredictorData::Frame(df)
    }
}

impl From<&DataFrame> for PredictorData {
    fn from(df: &DataFrame) -> Self {
        PredictorData::Frame(df.clone())
    }
}

impl From<Matrix> for PredictorData {
    fn from(m: Matrix) -> Self {
        PredictorData::Matrix(m)
    }
}

impl From<&Matrix> for PredictorData {
    fn from(m: &Matrix) -> Self {
        PredictorData::Matrix(m.clone())
    }
}

/// Numeric design matrix with named columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignMatrix {
    /// Sites × design columns
    pub values: Matrix,
    /// Column names, one per column of `values`
    pub columns: Vec<String>,
}

impl DesignMatrix {
    /// Create a design matrix, checking names against the column count
    pub fn new(values: Matrix, columns: Vec<String>) -> FormulaResult<Self> {
        if values.ncols() != columns.len() {
            return Err(FormulaError::DimensionMismatch {
                message: "Design matrix column names do not match its width".to_string(),
                expected: format!("{} names", values.ncols()),
                actual: format!("{} names", columns.len()),
            });
        }
        Ok(Self { values, columns })
    }

    /// Number of sites
    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of design columns
    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    /// Column names
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }
}

/// Expand predictors with an optional formula, defaulting to `~ .`
///
/// Returns the expanded formula, to be re-applied at prediction time, and
/// the raw table the design matrix was built from.
pub fn expand_predictors(
    predictors: PredictorData,
    formula: Option<&str>,
) -> FormulaResult<(ExpandedFormula, DesignMatrix, DataFrame)> {
    let frame = predictors.into_frame()?;
    let formula = match formula {
        Some(text) => Formula::parse(text)?,
        None => Formula::all_columns(),
    };

    let expanded = formula.expand(&frame)?;
    let design = expanded.design_matrix(&frame)?;

    Ok((expanded, design, frame))
}

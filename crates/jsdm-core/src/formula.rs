//! R-style formula parsing and design matrix construction
//!
//! A [`Formula`] is parsed once from text. Expanding it against a predictor
//! table yields an [`ExpandedFormula`]: the ordered term list with `.`
//! resolved and factor levels recorded. The expanded formula is what a
//! fitted model keeps, so prediction data is laid out exactly like the
//! training data.

use crate::data::{DataFrame, Matrix};
use crate::design::DesignMatrix;
pub use crate::formula::error::{FormulaError, FormulaResult};

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;

pub mod error;
mod expander;
mod parser;
mod term;

#[cfg(test)]
mod tests;

pub use expander::{Expansion, FormulaExpander};
pub use parser::{Expr, FormulaParser};
pub use term::{Factor, LevelMap, Term};

/// Name of the intercept column
pub const INTERCEPT: &str = "(Intercept)";

/// Formula used when the caller does not supply one
pub const DEFAULT_FORMULA: &str = "~ .";

/// A parsed formula specifying the predictors of a model
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    /// Response variable (left-hand side)
    pub response: Option<String>,

    /// Right-hand side expression
    pub rhs: Expr,

    /// Original formula string
    pub original: String,
}

impl Formula {
    /// Parse a formula from a string
    pub fn parse(formula: &str) -> FormulaResult<Self> {
        FormulaParser::parse(formula)
    }

    /// Every column with an intercept, `~ .`
    pub fn all_columns() -> Self {
        Self {
            response: None,
            rhs: Expr::Sum(vec![Expr::Dot]),
            original: DEFAULT_FORMULA.to_string(),
        }
    }

    /// Check if formula has a response variable
    pub fn has_response(&self) -> bool {
        self.response.is_some()
    }

    /// Expand the formula against a predictor table
    ///
    /// Fails with [`FormulaError::VariableNotFound`] when a term references
    /// a column the table does not have.
    pub fn expand(&self, df: &DataFrame) -> FormulaResult<ExpandedFormula> {
        let columns = df.column_names();
        let expansion =
            FormulaExpander::new(&columns, self.response.as_deref()).expand(&self.rhs)?;

        let mut levels = LevelMap::new();
        for term in &expansion.terms {
            for factor in &term.factors {
                let name = factor.variable_name();
                let series = df
                    .get_column(name)
                    .ok_or_else(|| FormulaError::variable_not_found(name, &columns))?;

                if let Some(found) = series.levels() {
                    if !factor.is_variable() {
                        return Err(FormulaError::TypeMismatch {
                            variable: name.to_string(),
                            expected_type: "numeric",
                            actual_type: series.dtype().to_string(),
                        });
                    }
                    levels.entry(name.to_string()).or_insert(found);
                }
            }
        }

        let expanded = ExpandedFormula {
            original: self.original.clone(),
            has_intercept: expansion.has_intercept,
            terms: expansion.terms,
            levels,
        };
        debug!("Expanded '{}' into '{}'", self.original, expanded);

        Ok(expanded)
    }
}

impl FromStr for Formula {
    type Err = FormulaError;

    fn from_str(s: &str) -> FormulaResult<Self> {
        Formula::parse(s)
    }
}

impl std::fmt::Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// A formula with its terms fully expanded against a table schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpandedFormula {
    /// Formula text as written by the caller
    pub original: String,

    /// Whether to include an intercept
    pub has_intercept: bool,

    /// Ordered terms
    pub terms: Vec<Term>,

    /// Levels of every categorical variable at expansion time
    pub levels: LevelMap,
}

impl ExpandedFormula {
    /// Raw variables the terms read, in first-use order
    pub fn variables(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.terms
            .iter()
            .flat_map(|t| t.variable_names())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Build the design matrix for a predictor table
    pub fn design_matrix(&self, df: &DataFrame) -> FormulaResult<DesignMatrix> {
        let nrows = df.nrows();
        let mut names = Vec::new();
        let mut blocks: Vec<Matrix> = Vec::new();

        if self.has_intercept {
            names.push(INTERCEPT.to_string());
            blocks.push(Matrix::ones((nrows, 1)));
        }

        let full_coding = self.full_coding_term();
        for (i, term) in self.terms.iter().enumerate() {
            let block = term.columns(df, &self.levels, full_coding == Some(i))?;
            if block.values.nrows() != nrows {
                return Err(FormulaError::DimensionMismatch {
                    message: format!("Term '{}' has incorrect number of rows", term),
                    expected: format!("{} rows (matching DataFrame)", nrows),
                    actual: format!("{} rows", block.values.nrows()),
                });
            }
            names.extend(block.names);
            blocks.push(block.values);
        }

        if blocks.is_empty() {
            return DesignMatrix::new(Matrix::zeros((nrows, 0)), names);
        }

        let views: Vec<ndarray::ArrayView2<f64>> = blocks.iter().map(|b| b.view()).collect();
        let values = ndarray::concatenate(ndarray::Axis(1), &views).map_err(|e| {
            FormulaError::EvaluationError {
                message: format!("Failed to stack design matrix columns: {}", e),
                context: None,
            }
        })?;

        DesignMatrix::new(values, names)
    }

    /// Get the names of columns in the design matrix
    pub fn design_matrix_names(&self, df: &DataFrame) -> FormulaResult<Vec<String>> {
        Ok(self.design_matrix(df)?.columns)
    }

    /// Without an intercept the first categorical main effect keeps every
    /// level; all other factor codings drop their first level.
    fn full_coding_term(&self) -> Option<usize> {
        if self.has_intercept {
            return None;
        }
        self.terms.iter().position(|t| {
            t.order() == 1
                && t.factors[0].is_variable()
                && self.levels.contains_key(t.factors[0].variable_name())
        })
    }
}

impl std::fmt::Display for ExpandedFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "~ ")?;

        if self.terms.is_empty() {
            return write!(f, "{}", if self.has_intercept { "1" } else { "0" });
        }

        if !self.has_intercept {
            write!(f, "0 + ")?;
        }
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{}", term)?;
        }

        Ok(())
    }
}

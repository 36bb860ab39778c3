//! Term types for formula specification
//!
//! A [`Term`] is a product of [`Factor`]s: a single factor is a main effect,
//! two or more factors form an interaction. Each factor maps to one or more
//! named design columns.

use crate::data::{DataFrame, Matrix, Series};
use crate::formula::error::{FormulaError, FormulaResult};
use indexmap::IndexMap;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Functions accepted inside a formula, besides `poly`
const UNARY_FUNCTIONS: &[&str] = &["log", "log10", "log2", "exp", "sqrt", "abs", "I"];

/// Factor levels recorded per categorical variable, in coding order
pub type LevelMap = IndexMap<String, Vec<String>>;

/// Smallest unit of a term
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Factor {
    /// Raw variable
    Variable(String),
    /// Elementwise power of a variable, `x^k`
    Power { variable: String, exponent: u32 },
    /// Transformation, `log(x)`, `I(x^2)` or `poly(x, d)`
    Function {
        name: String,
        argument: Box<Factor>,
        degree: Option<u32>,
    },
}

impl Factor {
    /// Create a variable factor
    pub fn variable(name: &str) -> Self {
        Factor::Variable(name.to_string())
    }

    /// Create a power factor
    pub fn power(name: &str, exponent: u32) -> Self {
        Factor::Power {
            variable: name.to_string(),
            exponent,
        }
    }

    /// Create a function factor, checking the function name
    pub fn function(name: &str, argument: Factor, degree: Option<u32>) -> FormulaResult<Self> {
        match (name, degree) {
            ("poly", Some(d)) if d >= 1 => {}
            ("poly", Some(d)) => {
                return Err(FormulaError::function(
                    "poly",
                    format!("poly() degree must be >= 1, got {}", d),
                ));
            }
            ("poly", None) => {
                return Err(FormulaError::function("poly", "Expected 2 arguments, got 1"));
            }
            (name, None) if UNARY_FUNCTIONS.contains(&name) => {}
            (name, Some(_)) if UNARY_FUNCTIONS.contains(&name) => {
                return Err(FormulaError::function(name, "Expected 1 argument, got 2"));
            }
            (name, _) => {
                return Err(FormulaError::function(
                    name,
                    format!("Function '{}' not supported", name),
                ));
            }
        }

        Ok(Factor::Function {
            name: name.to_string(),
            argument: Box::new(argument),
            degree,
        })
    }

    /// The raw variable this factor reads
    pub fn variable_name(&self) -> &str {
        match self {
            Factor::Variable(name) => name,
            Factor::Power { variable, .. } => variable,
            Factor::Function { argument, .. } => argument.variable_name(),
        }
    }

    /// Whether the factor is a bare variable
    pub fn is_variable(&self) -> bool {
        matches!(self, Factor::Variable(_))
    }

    /// Evaluate the factor into named columns
    ///
    /// `contrasts` drops the first level of a categorical variable
    /// (treatment coding).
    pub(crate) fn columns(
        &self,
        df: &DataFrame,
        levels: &LevelMap,
        contrasts: bool,
    ) -> FormulaResult<Block> {
        match self {
            Factor::Variable(name) => {
                let series = lookup(df, name)?;
                if series.is_factor() {
                    dummy_columns(name, series, levels, contrasts)
                } else {
                    Block::single(self.to_string(), numeric_column(df, name)?)
                }
            }
            Factor::Power { variable, exponent } => {
                let exponent = i32::try_from(*exponent).map_err(|_| FormulaError::NumericalError {
                    message: format!("exponent {} is too large", exponent),
                    operation: "power".to_string(),
                })?;
                let data = numeric_column(df, variable)?;
                Block::single(self.to_string(), data.mapv(|x| x.powi(exponent)))
            }
            Factor::Function {
                name,
                argument,
                degree,
            } => {
                let inner = argument.columns(df, levels, contrasts)?;
                if inner.names.len() != 1 {
                    return Err(FormulaError::function_with_arg(
                        name,
                        &argument.to_string(),
                        format!("{}() expects single column input", name),
                    ));
                }
                let data = inner.values.column(0).to_owned();

                match (name.as_str(), degree) {
                    ("poly", Some(d)) => Ok(polynomial_columns(&self.to_string(), &data, *d)),
                    _ => Block::single(self.to_string(), apply_function(name, &data)?),
                }
            }
        }
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Factor::Variable(name) => write!(f, "{}", name),
            Factor::Power { variable, exponent } => write!(f, "{}^{}", variable, exponent),
            Factor::Function {
                name,
                argument,
                degree: Some(d),
            } => write!(f, "{}({}, {})", name, argument, d),
            Factor::Function { name, argument, .. } => write!(f, "{}({})", name, argument),
        }
    }
}

/// A term in a formula
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Term {
    /// Factors multiplied together, in written order
    pub factors: Vec<Factor>,
}

impl Term {
    /// Create a main-effect term from one factor
    pub fn main(factor: Factor) -> Self {
        Self {
            factors: vec![factor],
        }
    }

    /// Order of the term (1 for main effects, 2 for two-way interactions, ...)
    pub fn order(&self) -> usize {
        self.factors.len()
    }

    /// Get the variable names referenced in this term
    pub fn variable_names(&self) -> Vec<&str> {
        self.factors.iter().map(|f| f.variable_name()).collect()
    }

    /// Same set of factors regardless of order, so `a:b` equals `b:a`
    pub fn same_as(&self, other: &Term) -> bool {
        self.order() == other.order() && self.factors.iter().all(|f| other.factors.contains(f))
    }

    /// Interaction of two terms; repeated factors collapse (`a:a` is `a`)
    pub fn merge(&self, other: &Term) -> Term {
        let mut factors = self.factors.clone();
        for factor in &other.factors {
            if !factors.contains(factor) {
                factors.push(factor.clone());
            }
        }
        Term { factors }
    }

    /// Evaluate the term into named design columns
    ///
    /// Interaction columns vary the first factor fastest.
    pub(crate) fn columns(
        &self,
        df: &DataFrame,
        levels: &LevelMap,
        full_coding: bool,
    ) -> FormulaResult<Block> {
        let mut factors = self.factors.iter();
        let first = factors.next().ok_or_else(|| FormulaError::EvaluationError {
            message: "Empty term".to_string(),
            context: None,
        })?;

        let mut block = first.columns(df, levels, !full_coding)?;
        for factor in factors {
            let next = factor.columns(df, levels, true)?;
            block = block.interact(&next);
        }

        Ok(block)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, factor) in self.factors.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{}", factor)?;
        }
        Ok(())
    }
}

/// Named columns produced by a term or factor
#[derive(Debug, Clone)]
pub(crate) struct Block {
    pub(crate) names: Vec<String>,
    pub(crate) values: Matrix,
}

impl Block {
    fn single(name: String, column: Array1<f64>) -> FormulaResult<Self> {
        let n = column.len();
        let values = column
            .into_shape_with_order((n, 1))
            .map_err(|e| FormulaError::EvaluationError {
                message: format!("Failed to reshape column '{}': {}", name, e),
                context: None,
            })?;

        Ok(Self {
            names: vec![name],
            values,
        })
    }

    /// Elementwise products of every column pair
    fn interact(&self, other: &Block) -> Block {
        let nrows = self.values.nrows();
        let mut names = Vec::with_capacity(self.names.len() * other.names.len());
        let mut values = Array2::zeros((nrows, self.names.len() * other.names.len()));

        let mut col_idx = 0;
        for (j, right) in other.names.iter().enumerate() {
            for (i, left) in self.names.iter().enumerate() {
                let product = &self.values.column(i) * &other.values.column(j);
                values.column_mut(col_idx).assign(&product);
                names.push(format!("{}:{}", left, right));
                col_idx += 1;
            }
        }

        Block { names, values }
    }
}

fn lookup<'a>(df: &'a DataFrame, name: &str) -> FormulaResult<&'a Series> {
    df.get_column(name)
        .ok_or_else(|| FormulaError::variable_not_found(name, &df.column_names()))
}

/// Extract a numeric column as floats
fn numeric_column(df: &DataFrame, name: &str) -> FormulaResult<Array1<f64>> {
    let series = lookup(df, name)?;
    series.to_float().ok_or_else(|| FormulaError::TypeMismatch {
        variable: name.to_string(),
        expected_type: "numeric",
        actual_type: series.dtype().to_string(),
    })
}

/// Dummy columns `name[level]` for a factor variable
fn dummy_columns(
    name: &str,
    series: &Series,
    levels: &LevelMap,
    contrasts: bool,
) -> FormulaResult<Block> {
    let known = match levels.get(name) {
        Some(known) => known.clone(),
        None => series.levels().unwrap_or_default(),
    };
    let labels = series.labels().unwrap_or_default();

    let kept: Vec<&String> = known.iter().skip(usize::from(contrasts)).collect();
    let mut values = Array2::zeros((labels.len(), kept.len()));

    for (row, label) in labels.iter().enumerate() {
        if !known.iter().any(|k| k == label) {
            return Err(FormulaError::UnknownLevel {
                variable: name.to_string(),
                level: label.to_string(),
                known: known.clone(),
            });
        }
        if let Some(col) = kept.iter().position(|k| k == label) {
            values[(row, col)] = 1.0;
        }
    }

    Ok(Block {
        names: kept.iter().map(|k| format!("{}[{}]", name, k)).collect(),
        values,
    })
}

/// Apply a unary transformation
fn apply_function(name: &str, data: &Array1<f64>) -> FormulaResult<Array1<f64>> {
    let transformed = match name {
        "log" | "log10" | "log2" => {
            if data.iter().any(|&x| x <= 0.0) {
                return Err(FormulaError::NumericalError {
                    message: format!("{}() requires positive values", name),
                    operation: name.to_string(),
                });
            }
            match name {
                "log" => data.mapv(f64::ln),
                "log10" => data.mapv(f64::log10),
                _ => data.mapv(f64::log2),
            }
        }
        "sqrt" => {
            if data.iter().any(|&x| x < 0.0) {
                return Err(FormulaError::NumericalError {
                    message: "sqrt() requires non-negative values".to_string(),
                    operation: "sqrt".to_string(),
                });
            }
            data.mapv(f64::sqrt)
        }
        "exp" => data.mapv(f64::exp),
        "abs" => data.mapv(f64::abs),
        // Identity, protects arithmetic such as I(x^2)
        "I" => data.clone(),
        other => {
            return Err(FormulaError::function(
                other,
                format!("Function '{}' not supported", other),
            ));
        }
    };

    Ok(transformed)
}

/// Raw polynomial columns `x, x^2, ..., x^degree`
fn polynomial_columns(label: &str, data: &Array1<f64>, degree: u32) -> Block {
    let mut values = Array2::zeros((data.len(), degree as usize));
    let mut names = Vec::with_capacity(degree as usize);

    for d in 1..=degree {
        values
            .column_mut(d as usize - 1)
            .assign(&data.mapv(|x| x.powi(d as i32)));
        names.push(format!("{}{}", label, d));
    }

    Block { names, values }
}

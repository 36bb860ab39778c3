//! Series data structure for holding one typed column
//!
//! A Series is a one-dimensional array that holds a single predictor or
//! response variable. It's the building block of DataFrames.

use super::*;

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A Series is a typed, one-dimensional array of data
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Series {
    /// Floating point numbers (f64)
    Float(FloatArray),
    /// Integer numbers (i64)
    Int(IntArray),
    /// Boolean values
    Bool(BoolArray),
    /// String values, treated as an unordered factor by formulas
    String(StringArray),
    /// Categorical data (encoded as u32)
    Categorical(Array1<u32>, Vec<String>), // values, levels
}

impl Series {
    /// Create a new Float series
    pub fn float(data: impl Into<FloatArray>) -> Self {
        Series::Float(data.into())
    }

    /// Create a new Int series
    pub fn int(data: impl Into<IntArray>) -> Self {
        Series::Int(data.into())
    }

    /// Create a new Bool series
    pub fn bool(data: impl Into<BoolArray>) -> Self {
        Series::Bool(data.into())
    }

    /// Create a new String series
    pub fn string(data: impl Into<StringArray>) -> Self {
        Series::String(data.into())
    }

    /// Create a new Categorical series with sorted levels
    pub fn categorical<T: AsRef<str>>(data: &[T]) -> Self {
        let levels: Vec<String> = data
            .iter()
            .map(|s| s.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // Every value is one of the collected levels
        let codes: Array1<u32> = data
            .iter()
            .map(|s| {
                levels
                    .iter()
                    .position(|level| level == s.as_ref())
                    .unwrap_or_default() as u32
            })
            .collect();

        Series::Categorical(codes, levels)
    }

    /// Create a Categorical series with an explicit level set
    ///
    /// Prediction data often only covers a subset of the training levels;
    /// fixing the levels keeps the dummy columns aligned.
    pub fn categorical_with_levels<T: AsRef<str>>(data: &[T], levels: &[&str]) -> Result<Self> {
        let codes = data
            .iter()
            .map(|s| {
                levels
                    .iter()
                    .position(|level| *level == s.as_ref())
                    .map(|code| code as u32)
                    .ok_or_else(|| {
                        DataError::InvalidParameter(format!(
                            "value '{}' is not one of the levels {:?}",
                            s.as_ref(),
                            levels
                        ))
                    })
            })
            .collect::<Result<Array1<u32>>>()?;

        Ok(Series::Categorical(
            codes,
            levels.iter().map(|l| l.to_string()).collect(),
        ))
    }

    /// Get the length of the series
    pub fn len(&self) -> usize {
        match self {
            Series::Float(arr) => arr.len(),
            Series::Int(arr) => arr.len(),
            Series::Bool(arr) => arr.len(),
            Series::String(arr) => arr.len(),
            Series::Categorical(arr, _) => arr.len(),
        }
    }

    /// Check if the series is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the type name of the series
    pub fn dtype(&self) -> &'static str {
        match self {
            Series::Float(_) => "float64",
            Series::Int(_) => "int64",
            Series::Bool(_) => "bool",
            Series::String(_) => "string",
            Series::Categorical(_, _) => "categorical",
        }
    }

    /// Whether the series holds numbers (booleans count as 0/1)
    pub fn is_numeric(&self) -> bool {
        matches!(self, Series::Float(_) | Series::Int(_) | Series::Bool(_))
    }

    /// Whether formulas treat this series as a factor
    pub fn is_factor(&self) -> bool {
        matches!(self, Series::String(_) | Series::Categorical(_, _))
    }

    /// Get a value at index
    pub fn get(&self, idx: usize) -> Option<SeriesValue> {
        match self {
            Series::Float(arr) => arr.get(idx).map(|&v| SeriesValue::Float(v)),
            Series::Int(arr) => arr.get(idx).map(|&v| SeriesValue::Int(v)),
            Series::Bool(arr) => arr.get(idx).map(|&v| SeriesValue::Bool(v)),
            Series::String(arr) => arr.get(idx).map(|v| SeriesValue::String(v.clone())),
            Series::Categorical(arr, levels) => arr
                .get(idx)
                .and_then(|&code| levels.get(code as usize))
                .map(|level| SeriesValue::String(level.clone())),
        }
    }

    /// Convert a numeric series to floats
    pub fn to_float(&self) -> Option<FloatArray> {
        match self {
            Series::Float(arr) => Some(arr.clone()),
            Series::Int(arr) => Some(arr.mapv(|v| v as f64)),
            Series::Bool(arr) => Some(arr.mapv(|v| if v { 1.0 } else { 0.0 })),
            Series::String(_) | Series::Categorical(_, _) => None,
        }
    }

    /// Factor levels in coding order
    ///
    /// String series use their sorted distinct values, matching
    /// [`Series::categorical`].
    pub fn levels(&self) -> Option<Vec<String>> {
        match self {
            Series::Categorical(_, levels) => Some(levels.clone()),
            Series::String(values) => Some(
                values
                    .iter()
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Level label of every element of a factor series
    pub fn labels(&self) -> Option<Vec<&str>> {
        match self {
            Series::String(values) => Some(values.iter().map(|s| s.as_str()).collect()),
            Series::Categorical(codes, levels) => Some(
                codes
                    .iter()
                    .map(|&code| levels.get(code as usize).map_or("", |l| l.as_str()))
                    .collect(),
            ),
            _ => None,
        }
    }
}

/// Enum for type-safe value access
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    String(String),
}

impl std::fmt::Display for SeriesValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SeriesValue::Float(v) => write!(f, "{}", v),
            SeriesValue::Int(v) => write!(f, "{}", v),
            SeriesValue::Bool(v) => write!(f, "{}", v),
            SeriesValue::String(v) => write!(f, "{}", v),
        }
    }
}

//! DataFrame implementation for tabular site data
//!
//! A DataFrame is a 2-dimensional labeled data structure with columns of
//! potentially different types. Rows are sites; columns are environmental
//! predictors or species.

use super::*;

use indexmap::IndexMap;
use ndarray::{Axis, stack};
use serde::{Deserialize, Serialize};

/// Main DataFrame structure
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub(crate) columns: IndexMap<String, Series>,
    pub(crate) nrows: usize,
}

impl DataFrame {
    /// Create an empty DataFrame
    pub fn new() -> Self {
        Self::default()
    }

    /// Create DataFrame from columns
    pub fn from_columns<I, S>(columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Series)>,
        S: Into<String>,
    {
        let mut builder = DataFrameBuilder::new();

        for (name, series) in columns.into_iter() {
            builder = builder.with_column(name, series)?;
        }

        builder.build()
    }

    /// Create a DataFrame from a numeric matrix
    ///
    /// Without explicit names the columns are called `X1`, `X2`, ... in
    /// column order.
    pub fn from_matrix<S: AsRef<str>>(matrix: &Matrix, names: Option<&[S]>) -> Result<Self> {
        let names: Vec<String> = match names {
            Some(names) => {
                if names.len() != matrix.ncols() {
                    return Err(DataError::DimensionMismatch {
                        expected: format!("{} column names", matrix.ncols()),
                        actual: format!("{} column names", names.len()),
                    });
                }
                names.iter().map(|n| n.as_ref().to_string()).collect()
            }
            None => Self::synthetic_names(matrix.ncols()),
        };

        let mut builder = DataFrameBuilder::new().with_nrows(matrix.nrows());
        for (name, column) in names.into_iter().zip(matrix.columns()) {
            builder = builder.with_column(name, Series::float(column.to_owned()))?;
        }

        builder.build()
    }

    /// Synthetic column names used when coercing an unnamed matrix
    pub fn synthetic_names(ncols: usize) -> Vec<String> {
        (1..=ncols).map(|i| format!("X{}", i)).collect()
    }

    /// Get the shape of the DataFrame (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.columns.len())
    }

    /// Get the number of rows
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Get the number of columns
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    /// Get column names
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(|k| k.as_str()).collect()
    }

    /// Get a reference to a column
    pub fn get_column(&self, name: &str) -> Option<&Series> {
        self.columns.get(name)
    }

    /// Iterate over `(name, series)` pairs in column order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Series)> {
        self.columns.iter().map(|(name, series)| (name.as_str(), series))
    }

    /// Select specific columns
    pub fn select<I, S>(&self, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = DataFrameBuilder::new();

        for name in names.into_iter() {
            let name = name.as_ref();
            match self.columns.get(name) {
                Some(series) => {
                    builder = builder.with_column(name, series.clone())?;
                }
                None => {
                    return Err(DataError::ColumnNotFound(name.to_string()));
                }
            }
        }

        builder.build()
    }

    /// Add a new column
    pub fn with_column<S: Into<String>>(mut self, name: S, series: Series) -> Result<Self> {
        let name = name.into();

        if self.columns.contains_key(&name) {
            return Err(DataError::DuplicateColumn(name));
        }

        if !self.columns.is_empty() && series.len() != self.nrows {
            return Err(DataError::DimensionMismatch {
                expected: format!("{} rows", self.nrows),
                actual: format!("{} rows", series.len()),
            });
        }

        if self.columns.is_empty() {
            self.nrows = series.len();
        }

        self.columns.insert(name, series);
        Ok(self)
    }

    /// Get every column as a float matrix
    ///
    /// Fails on the first string or categorical column; responses must be
    /// strictly numeric.
    pub fn numeric_matrix(&self) -> Result<Matrix> {
        if self.columns.is_empty() {
            return Ok(Matrix::zeros((self.nrows, 0)));
        }

        let float_cols = self
            .columns
            .iter()
            .map(|(name, series)| {
                series.to_float().ok_or_else(|| DataError::NonNumericData {
                    column: name.clone(),
                    dtype: series.dtype(),
                })
            })
            .collect::<Result<Vec<FloatArray>>>()?;

        let arrays: Vec<ndarray::ArrayView1<f64>> =
            float_cols.iter().map(|arr| arr.view()).collect();

        stack(Axis(1), &arrays).map_err(|e| DataError::DimensionMismatch {
            expected: "compatible dimensions".to_string(),
            actual: e.to_string(),
        })
    }
}

impl std::fmt::Display for DataFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DataFrame({} rows × {} cols)", self.nrows, self.ncols())
    }
}

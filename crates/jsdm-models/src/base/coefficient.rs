//! Coefficient definition

use serde::{Deserialize, Serialize};

use super::statistics::significance_stars;

/// One species' coefficient for one predictor, with Wald statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficient {
    /// Row label, `"<species> <predictor>"`
    pub name: String,
    /// Species (response column)
    pub species: String,
    /// Design column
    pub predictor: String,
    /// Coefficient estimate
    pub estimate: f64,
    /// Standard error
    pub std_error: Option<f64>,
    /// z-statistic
    pub z_stat: Option<f64>,
    /// p-value
    pub p_value: Option<f64>,
}

impl Coefficient {
    /// Create a new coefficient
    pub fn new(species: impl Into<String>, predictor: impl Into<String>, estimate: f64) -> Self {
        let species = species.into();
        let predictor = predictor.into();

        Self {
            name: format!("{} {}", species, predictor),
            species,
            predictor,
            estimate,
            std_error: None,
            z_stat: None,
            p_value: None,
        }
    }

    /// Set standard error
    pub fn with_std_error(mut self, se: f64) -> Self {
        self.std_error = Some(se);
        self
    }

    /// Set z-statistic
    pub fn with_z_stat(mut self, z: f64) -> Self {
        self.z_stat = Some(z);
        self
    }

    /// Set p-value
    pub fn with_p_value(mut self, p: f64) -> Self {
        self.p_value = Some(p);
        self
    }

    /// Whether test statistics are attached
    pub fn has_test(&self) -> bool {
        self.std_error.is_some()
    }

    /// Significance code for the p-value, empty without one
    pub fn stars(&self) -> &'static str {
        self.p_value.map_or("", significance_stars)
    }
}

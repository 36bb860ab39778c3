//! Deterministic in-memory backend for tests
//!
//! Trains the dense layer by plain mini-batch gradient descent on the
//! Bernoulli likelihood (probit through its logistic approximation) and
//! leaves the covariance factor at a fixed, full-rank starting value.

use nalgebra::DMatrix;
use ndarray::{Array1, Array2, Axis, Zip, s};
use std::cell::Cell;

use crate::backend::{Backend, CovarianceSpec, FitSpec, LayerSpec, ModelHandle};
use crate::base::{BackendError, BackendResult, LogLikelihood};
use crate::sdm::config::{Device, Link, Precision};

/// Logistic approximation to the standard normal CDF
const PROBIT_SCALE: f64 = 1.70169;
const EPS: f64 = 1e-5;

#[derive(Debug, Default)]
pub(crate) struct MockBackend {
    builds: Cell<usize>,
    releases: Cell<usize>,
    fail_fit: bool,
    fail_se: bool,
}

impl MockBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every `fit` call fails
    pub(crate) fn failing_fit() -> Self {
        Self {
            fail_fit: true,
            ..Self::default()
        }
    }

    /// Every `standard_errors` call fails
    pub(crate) fn failing_standard_errors() -> Self {
        Self {
            fail_se: true,
            ..Self::default()
        }
    }

    pub(crate) fn builds(&self) -> usize {
        self.builds.get()
    }

    pub(crate) fn releases(&self) -> usize {
        self.releases.get()
    }
}

impl Backend for MockBackend {
    type Handle = MockHandle;

    fn build_model(
        &self,
        input_dim: usize,
        device: Device,
        precision: Precision,
    ) -> BackendResult<MockHandle> {
        if input_dim == 0 {
            return Err(BackendError::State("input_dim must be > 0".to_string()));
        }
        self.builds.set(self.builds.get() + 1);

        Ok(MockHandle {
            input_dim,
            device,
            precision,
            layer: None,
            spec: None,
            fit_spec: None,
            weights: Array2::zeros((input_dim, 0)),
            sigma: Array2::zeros((0, 0)),
            history: Vec::new(),
            fail_fit: self.fail_fit,
            fail_se: self.fail_se,
        })
    }

    fn release_cache(&self) {
        self.releases.set(self.releases.get() + 1);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockHandle {
    pub(crate) input_dim: usize,
    pub(crate) device: Device,
    pub(crate) precision: Precision,
    pub(crate) layer: Option<LayerSpec>,
    pub(crate) spec: Option<CovarianceSpec>,
    pub(crate) fit_spec: Option<FitSpec>,
    weights: Array2<f64>,
    sigma: Array2<f64>,
    history: Vec<f64>,
    fail_fit: bool,
    fail_se: bool,
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl MockHandle {
    fn link(&self) -> Link {
        self.spec.map_or(Link::Probit, |s| s.link)
    }

    fn width(&self) -> usize {
        self.weights.ncols()
    }

    fn check_x(&self, x: &Array2<f64>) -> BackendResult<()> {
        if x.ncols() != self.input_dim {
            return Err(BackendError::shape(
                (x.nrows(), self.input_dim),
                x.dim(),
            ));
        }
        Ok(())
    }

    fn check_xy(&self, x: &Array2<f64>, y: &Array2<f64>) -> BackendResult<()> {
        self.check_x(x)?;
        if y.dim() != (x.nrows(), self.width()) {
            return Err(BackendError::shape((x.nrows(), self.width()), y.dim()));
        }
        Ok(())
    }

    fn mean(&self, mu: f64) -> f64 {
        match self.link() {
            Link::Probit => sigmoid(PROBIT_SCALE * mu),
            Link::Logit => sigmoid(mu),
            Link::Linear => mu,
        }
    }

    /// Derivative of the loss wrt the linear predictor
    fn gradient(&self, mu: f64, y: f64) -> f64 {
        match self.link() {
            Link::Probit => PROBIT_SCALE * (self.mean(mu) - y),
            Link::Logit | Link::Linear => self.mean(mu) - y,
        }
    }

    /// Fisher weight of one observation
    fn information_weight(&self, mu: f64) -> f64 {
        let p = self.mean(mu);
        match self.link() {
            Link::Probit => PROBIT_SCALE * PROBIT_SCALE * p * (1.0 - p),
            Link::Logit => p * (1.0 - p),
            Link::Linear => 1.0,
        }
    }

    fn nll(&self, x: &Array2<f64>, y: &Array2<f64>) -> f64 {
        let mu = x.dot(&self.weights);
        let link = self.link();

        Zip::from(&mu).and(y).fold(0.0, |acc, &m, &obs| {
            let loss = match link {
                Link::Linear => 0.5 * (obs - m).powi(2),
                _ => {
                    let p = self.mean(m).clamp(EPS, 1.0 - EPS);
                    -(obs * p.ln() + (1.0 - obs) * (1.0 - p).ln())
                }
            };
            acc + loss
        })
    }

    fn regularization(&self) -> f64 {
        let mut loss = 0.0;

        if let Some(layer) = &self.layer {
            loss += layer.l1 * self.weights.mapv(f64::abs).sum()
                + layer.l2 * self.weights.mapv(|w| w * w).sum();
        }

        if let Some(spec) = &self.spec {
            let mut target = if spec.reg_on_cov {
                self.sigma.dot(&self.sigma.t())
            } else {
                self.sigma.clone()
            };
            if !spec.reg_on_diag {
                for i in 0..target.nrows().min(target.ncols()) {
                    target[(i, i)] = 0.0;
                }
            }
            loss += spec.l1_cov * target.mapv(f64::abs).sum()
                + spec.l2_cov * target.mapv(|v| v * v).sum();
        }

        loss
    }
}

impl ModelHandle for MockHandle {
    fn add_layer(&mut self, layer: &LayerSpec) -> BackendResult<()> {
        if self.layer.is_some() {
            return Err(BackendError::State(
                "mock backend supports a single layer".to_string(),
            ));
        }
        self.weights = Array2::zeros((self.input_dim, layer.width));
        self.layer = Some(*layer);
        Ok(())
    }

    fn configure(&mut self, spec: &CovarianceSpec) -> BackendResult<()> {
        if self.layer.is_none() {
            return Err(BackendError::State("configure before add_layer".to_string()));
        }

        self.sigma = Array2::from_shape_fn((self.width(), spec.df), |(i, j)| {
            let v = 0.1 * (1 + (i + 2 * j) % 5) as f64;
            if (i + j) % 2 == 0 { v } else { -v }
        });
        self.spec = Some(*spec);
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>, spec: &FitSpec) -> BackendResult<()> {
        let Some(cov) = self.spec else {
            return Err(BackendError::State("fit before configure".to_string()));
        };
        self.check_xy(x, y)?;
        if self.fail_fit {
            return Err(BackendError::numerical("fit", "loss is NaN"));
        }

        let (l1, l2) = self.layer.map_or((0.0, 0.0), |l| (l.l1, l.l2));
        let lr = cov.optimizer.learning_rate;
        let n = x.nrows();
        let batch = spec.batch_size.max(1);

        for _ in 0..spec.epochs {
            for start in (0..n).step_by(batch) {
                let end = (start + batch).min(n);
                let xb = x.slice(s![start..end, ..]);
                let yb = y.slice(s![start..end, ..]);

                let mu = xb.dot(&self.weights);
                let residual = Zip::from(&mu)
                    .and(&yb)
                    .map_collect(|&m, &obs| self.gradient(m, obs));

                let grad = xb.t().dot(&residual) / (end - start) as f64
                    + self.weights.mapv(|w| 2.0 * l2 * w + l1 * w.signum());
                self.weights = &self.weights - &(grad * lr);
            }
            self.history.push(self.nll(x, y) / y.len() as f64);
        }

        self.fit_spec = Some(*spec);
        Ok(())
    }

    fn log_likelihood(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        _batch_size: usize,
        _parallel: usize,
    ) -> BackendResult<LogLikelihood> {
        self.check_xy(x, y)?;
        Ok(LogLikelihood::new(self.nll(x, y), self.regularization()))
    }

    fn standard_errors(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        _batch_size: usize,
        _parallel: usize,
    ) -> BackendResult<Vec<Array1<f64>>> {
        self.check_xy(x, y)?;
        if self.fail_se {
            return Err(BackendError::numerical("standard_errors", "out of memory"));
        }

        let mu = x.dot(&self.weights);
        (0..self.width())
            .map(|k| {
                let w = mu.column(k).mapv(|m| self.information_weight(m).sqrt());
                let xw = x * &w.insert_axis(Axis(1));
                let information = xw.t().dot(&xw);

                inverse_diagonal(&information)
                    .map(|d| d.mapv(f64::sqrt))
                    .ok_or_else(|| {
                        BackendError::numerical(
                            "standard_errors",
                            format!("information matrix of species {} is singular", k),
                        )
                    })
            })
            .collect()
    }

    fn predict(&self, x: &Array2<f64>) -> BackendResult<Array2<f64>> {
        self.check_x(x)?;
        Ok(x.dot(&self.weights).mapv(|m| self.mean(m)))
    }

    fn weights(&self) -> Vec<Array2<f64>> {
        vec![self.weights.clone()]
    }

    fn set_weights(&mut self, weights: Vec<Array2<f64>>) -> BackendResult<()> {
        match weights.as_slice() {
            [w] if w.dim() == self.weights.dim() => {
                self.weights = w.clone();
                Ok(())
            }
            [w] => Err(BackendError::shape(self.weights.dim(), w.dim())),
            _ => Err(BackendError::State(format!(
                "expected 1 weight matrix, got {}",
                weights.len()
            ))),
        }
    }

    fn covariance_factor(&self) -> Array2<f64> {
        self.sigma.clone()
    }

    fn set_covariance_factor(&mut self, sigma: Array2<f64>) -> BackendResult<()> {
        if sigma.dim() != self.sigma.dim() {
            return Err(BackendError::shape(self.sigma.dim(), sigma.dim()));
        }
        self.sigma = sigma;
        Ok(())
    }

    fn training_history(&self) -> Vec<f64> {
        self.history.clone()
    }
}

/// Diagonal of the inverse of a symmetric positive definite matrix
///
/// `None` when the Cholesky factorization fails or a pivot is numerically
/// zero relative to the largest diagonal entry.
pub(crate) fn inverse_diagonal(a: &Array2<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let scale = a.diag().iter().cloned().fold(0.0, f64::max);
    if scale <= 0.0 {
        return None;
    }

    let chol = DMatrix::from_fn(n, n, |i, j| a[(i, j)]).cholesky()?;
    if chol.l_dirty().diagonal().iter().any(|&d| d * d <= 1e-10 * scale) {
        return None;
    }

    let inverse = chol.inverse();
    Some(Array1::from_shape_fn(n, |i| inverse[(i, i)]))
}

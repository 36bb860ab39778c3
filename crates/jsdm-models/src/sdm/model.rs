//! Fit orchestration
//!
//! [`Sdm`] owns an injected [`Backend`]. Fitting expands the formula and
//! resolves the configuration first, so bad input never reaches the
//! backend, then builds a fresh model, trains it and collects the trained
//! artifacts into a [`FittedModel`].

use log::{debug, info};
use std::time::Instant;

use crate::backend::{Backend, CovarianceSpec, FitSpec, LayerSpec, ModelHandle};
use crate::base::{ModelError, Result};
use crate::sdm::config::{ModelConfig, ResponseData, SdmConfig};
use crate::sdm::fitted::{FittedModel, ModelSnapshot, TrainedArtifacts};
use jsdm_core::design::{PredictorData, expand_predictors};

/// Releases backend caches when orchestration ends, however it ends
struct CacheGuard<'a, B: Backend>(&'a B);

impl<B: Backend> Drop for CacheGuard<'_, B> {
    fn drop(&mut self) {
        self.0.release_cache();
    }
}

/// Joint species distribution model fitter
#[derive(Debug, Clone, Default)]
pub struct Sdm<B: Backend> {
    backend: B,
}

impl<B: Backend> Sdm<B> {
    /// Create a fitter on top of a backend
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// The backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Fit a model
    ///
    /// `x` is a predictor table or matrix, `y` a sites × species response
    /// matrix or table, and `formula` defaults to `~ .`. Formula and
    /// configuration errors are raised before the backend is touched;
    /// backend failures while training are fatal. Standard errors, when
    /// requested, never fail the fit.
    pub fn fit(
        &self,
        x: impl Into<PredictorData>,
        y: impl Into<ResponseData>,
        formula: Option<&str>,
        config: &SdmConfig,
    ) -> Result<FittedModel<B::Handle>> {
        let (formula, design, predictors) = expand_predictors(x.into(), formula)?;
        let (responses, species) = y.into().into_matrix()?;
        let resolved = config.resolve(&design, &responses)?;
        debug!("Design columns: {:?}", design.columns);

        let _cache = CacheGuard(&self.backend);
        let mut handle = self.build(&resolved)?;

        info!(
            "Fitting {} species on {} sites with {} predictors ({} epochs, df = {})",
            resolved.output_dim,
            design.nrows(),
            resolved.input_dim,
            resolved.epochs,
            resolved.df
        );
        let start = Instant::now();
        handle
            .fit(&design.values, &responses, &FitSpec::from_config(&resolved))
            .map_err(ModelError::collaborator("fit"))?;
        let duration = start.elapsed();

        let log_likelihood = handle
            .log_likelihood(
                &design.values,
                &responses,
                resolved.batch_size,
                resolved.parallel,
            )
            .map_err(ModelError::collaborator("log_likelihood"))?;
        info!(
            "Fit finished in {:.2?}: logLik {:.4}, regularization loss {:.4}",
            duration,
            log_likelihood.log_lik(),
            log_likelihood.regularization_loss
        );

        let artifacts = TrainedArtifacts {
            weights: handle.weights(),
            sigma: handle.covariance_factor(),
            history: handle.training_history(),
            log_likelihood,
            standard_errors: None,
            duration,
        };
        artifacts.validate(&resolved)?;

        let mut model = FittedModel {
            handle,
            config: resolved,
            formula,
            design,
            predictors,
            responses,
            species,
            artifacts,
        };
        if config.se {
            model.compute_standard_errors();
        }

        Ok(model)
    }

    /// Rebuild a fitted model from a snapshot without retraining
    pub fn restore(&self, snapshot: ModelSnapshot) -> Result<FittedModel<B::Handle>> {
        snapshot.validate()?;
        let ModelSnapshot {
            config,
            formula,
            design,
            predictors,
            responses,
            species,
            artifacts,
        } = snapshot;

        let _cache = CacheGuard(&self.backend);
        let mut handle = self.build(&config)?;
        handle
            .set_weights(artifacts.weights.clone())
            .map_err(ModelError::collaborator("set_weights"))?;
        handle
            .set_covariance_factor(artifacts.sigma.clone())
            .map_err(ModelError::collaborator("set_covariance_factor"))?;
        debug!("Restored model with design columns {:?}", design.columns);

        Ok(FittedModel {
            handle,
            config,
            formula,
            design,
            predictors,
            responses,
            species,
            artifacts,
        })
    }

    /// Fresh model: one bias-free dense layer and the covariance head
    fn build(&self, config: &ModelConfig) -> Result<B::Handle> {
        let mut handle = self
            .backend
            .build_model(config.input_dim, config.device, config.precision)
            .map_err(ModelError::collaborator("build_model"))?;
        handle
            .add_layer(&LayerSpec::from_config(config))
            .map_err(ModelError::collaborator("add_layer"))?;
        handle
            .configure(&CovarianceSpec::from_config(config))
            .map_err(ModelError::collaborator("configure"))?;

        Ok(handle)
    }
}

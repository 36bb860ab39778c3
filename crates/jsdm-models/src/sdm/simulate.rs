//! Stochastic replicates from predicted probabilities

use ndarray::{Array2, Array3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Bernoulli, Distribution};

use crate::base::{BackendError, ModelError, Result};

/// Draw `n` binary replicates, one Bernoulli trial per (site, species)
///
/// Returns an array shaped (n, sites, species). The same seed reproduces the
/// same draws; without one the generator is seeded from the OS.
pub fn simulate_bernoulli(
    probabilities: &Array2<f64>,
    n: usize,
    seed: Option<u64>,
) -> Result<Array3<f64>> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let trials = probabilities
        .iter()
        .map(|&p| {
            Bernoulli::new(p.clamp(0.0, 1.0)).map_err(|e| ModelError::Collaborator {
                operation: "predict",
                source: BackendError::numerical(
                    "predict",
                    format!("prediction {} is not a probability: {}", p, e),
                ),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let (sites, species) = probabilities.dim();
    let mut draws = Array3::zeros((n, sites, species));

    for mut replicate in draws.outer_iter_mut() {
        for (value, trial) in replicate.iter_mut().zip(&trials) {
            *value = if trial.sample(&mut rng) { 1.0 } else { 0.0 };
        }
    }

    Ok(draws)
}

//! The user-supplied model interface: the four callbacks named in the
//! external-interfaces section. Kept deliberately thin -- the engine treats
//! `prior_loglike`/`loglike` as opaque and may perform arbitrary I/O.

use crate::particle::Theta;
use rand::RngCore;

/// How a particle's `weight` is computed: the full posterior for sampling,
/// or just the objective for optimization (maximize/minimize).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UpdateRule {
    /// Metropolis-Hastings acceptance against `logprior + loglike`.
    Mh,
    /// Greedy replace-iff-strictly-greater against `loglike` alone.
    Maximize,
    /// Greedy replace-iff-strictly-less against `loglike` alone.
    Minimize,
}

/// The model a run is conditioned on: a way to draw an initial point, the
/// prior and likelihood densities, and the parameter names matching
/// `sample_prior`'s output shape.
pub trait Model: Send + Sync {
    /// Draws an initial particle's parameter vector. Its shape, once drawn,
    /// is fixed for the whole run.
    fn sample_prior(&self, rng: &mut dyn RngCore) -> Theta;

    fn prior_loglike(&self, theta: &Theta) -> f64;

    fn loglike(&self, theta: &Theta) -> f64;

    /// Ordered top-level component names, matching `sample_prior`'s shape.
    fn names(&self) -> Vec<String>;
}

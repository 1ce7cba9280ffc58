//! `demcmc`: a population-based Differential Evolution MCMC sampler.
//!
//! Draws correlated samples from a user-supplied target density (a
//! log-prior plus a log-likelihood) over a bounded, possibly mixed
//! real/integer parameter space, using parallel chains organized into
//! groups, differential-mutation and snooker proposals, Metropolis-Hastings
//! acceptance, and periodic cross-group migration. The same engine doubles
//! as a bounded maximize/minimize optimizer when configured with a greedy
//! update rule instead of MH.
//!
//! The four things a caller supplies are an implementation of [`Model`],
//! per-parameter [`Bounds`], and a [`SamplerConfig`]. Everything else --
//! chain post-processing, progress UI, RNG seeding policy -- is left to the
//! caller; see the `demos/` binaries for a worked example.

pub mod acceptance;
pub mod bounds;
pub mod error;
pub mod evaluator;
pub mod group;
pub mod migration;
pub mod model;
pub mod particle;
pub mod proposal;
pub mod result;
pub mod sampler;

pub use bounds::Bounds;
pub use error::{ConfigError, DeMcmcError};
pub use model::{Model, UpdateRule};
pub use particle::{Component, Kind, Particle, Theta};
pub use proposal::GammaPolicy;
pub use result::{OptimizeResult, RunOutcome, SampleResult};
pub use sampler::{CancelToken, IterationProgress, RunResult, Sampler, SamplerConfig};

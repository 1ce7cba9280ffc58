use crate::particle::Theta;
use thiserror::Error;

/// Errors that can terminate a sampling or optimization run.
///
/// Internal numeric issues (bounds violations, NaNs, degenerate snooker
/// directions) are absorbed locally and never surface here -- see
/// [`crate::proposal`] and [`crate::acceptance`].
#[derive(Debug, Error)]
pub enum DeMcmcError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A user-supplied `sample_prior`/`prior_loglike`/`loglike` callback
    /// panicked. `theta` is the offending parameter vector when one had
    /// already been produced (absent for `sample_prior` panics, which
    /// happen before a `theta` exists).
    #[error("user callback panicked (theta={theta:?}): {message}")]
    UserCallback { theta: Option<Theta>, message: String },
}

/// Configuration problems surfaced to the caller before sampling begins.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("particles_per_group (Np) must be >= 4, got {0}")]
    NpTooSmall(usize),

    #[error("n_groups must be >= 1, got 0")]
    ZeroGroups,

    #[error("n_groups must be >= 2 to use migration (migration_prob > 0), got {0}")]
    NotEnoughGroupsForMigration(usize),

    #[error("bounds must not be empty")]
    EmptyBounds,

    #[error("n_iter must be > 0")]
    ZeroIterations,

    #[error("migration_interval must be > 0")]
    ZeroMigrationInterval,

    #[error("{field} must be a probability in [0, 1], got {value}")]
    NotAProbability { field: &'static str, value: f64 },

    #[error("a lower bound exceeds its upper bound at component {index}: ({lo}, {hi})")]
    InvertedBound { index: usize, lo: f64, hi: f64 },

    #[error("blocking mask length {mask_len} does not match the flattened parameter count {d_scalar}")]
    BlockingShapeMismatch { mask_len: usize, d_scalar: usize },
}

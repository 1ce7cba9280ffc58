//! The result extractor: the output surface exposed to post-processing
//! collaborators (sampling mode) or returned directly (optimization mode).

use crate::particle::Theta;
use ndarray::Array3;

/// Whether a run finished all iterations or was cancelled early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Cancelled { at_iteration: usize },
}

/// Sampling-mode output: the dense `[iter, param, particle]` tensor plus the
/// flattened parameter names (with `"acceptance"`, `"lp"` trailing) and the
/// burnin count the post-processing collaborator should skip.
///
/// Pre-burnin rows are left zero-initialized rather than truncated (see
/// DESIGN.md's resolution of this spec.md §9 open question).
pub struct SampleResult {
    pub tensor: Array3<f64>,
    pub names: Vec<String>,
    pub n_initial: usize,
    pub burnin: usize,
    pub outcome: RunOutcome,
}

impl SampleResult {
    /// A view over only the post-burnin rows, the slice a post-processing
    /// collaborator actually wants. The tensor's leading `n_initial` rows
    /// are warm-start preview draws, not main-loop iterations, so the first
    /// real post-burnin row is `n_initial + burnin`, not `burnin + 1`.
    pub fn post_burnin(&self) -> ndarray::ArrayView3<'_, f64> {
        let start = self.tensor.shape()[0].min(self.n_initial + self.burnin);
        self.tensor.slice(ndarray::s![start.., .., ..])
    }
}

/// Optimization-mode output: the incumbent particle found, per the
/// configured comparator (`>` for maximize, `<` for minimize).
pub struct OptimizeResult {
    pub theta: Theta,
    pub weight: f64,
    pub outcome: RunOutcome,
}

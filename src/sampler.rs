//! The sampler driver: owns the sample tensor, runs the initial draws, then
//! the main propose/accept/store/migrate loop, in both sampling and
//! optimization modes.

use crate::acceptance::{accept, maximize_update, minimize_update};
use crate::bounds::Bounds;
use crate::error::{ConfigError, DeMcmcError};
use crate::evaluator::{call_sample_prior, score, SilentPanicGuard};
use crate::group::{partition_groups, Group, ParticleArena};
use crate::migration::migrate;
use crate::model::{Model, UpdateRule};
use crate::particle::{Particle, Theta};
use crate::proposal::{
    apply_block, block_d_eff, crossover, differential_mutation, pick_distinct_peers, sample_gamma, snooker, GammaPolicy,
};
use crate::result::{OptimizeResult, RunOutcome, SampleResult};
use ndarray::Array3;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-particle, per-initial-draw flattened preview rows, used to seed the
/// sample tensor's `n_initial` warm-start rows before the main loop starts.
type InitialPreviews = Vec<Vec<Vec<f64>>>;

/// Cooperative cancellation, checked once per iteration between groups.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Reported to the progress callback once per completed iteration.
#[derive(Debug, Clone, Copy)]
pub struct IterationProgress {
    pub iteration: usize,
    pub acceptance_rate: f64,
    pub best_weight: f64,
}

/// Immutable-once-sampling-starts run configuration (spec.md §3/§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplerConfig {
    pub n_groups: usize,
    pub particles_per_group: usize,
    pub n_iter: usize,
    pub n_initial: usize,
    pub burnin: usize,
    pub bounds: Vec<(f64, f64)>,
    pub gamma_policy: GammaPolicy,
    pub crossover_prob: f64,
    pub migration_prob: f64,
    pub migration_interval: usize,
    pub snooker_prob: f64,
    pub blocking: Option<Vec<Vec<bool>>>,
    pub update_rule: UpdateRule,
    /// Half-width `b` of the `Uniform(-b, b)` jitter added to every
    /// differential mutation proposal (spec.md §4.3 suggests `b ~= 1e-3`).
    pub jitter_bound: f64,
}

impl SamplerConfig {
    pub fn n_particles(&self) -> usize {
        self.n_groups * self.particles_per_group
    }

    /// Surfaces every `ConfigError` case from spec.md §7 before a run
    /// starts. Blocking-mask shape is checked once the parameter count is
    /// known, in `Sampler::run`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.particles_per_group < 4 {
            return Err(ConfigError::NpTooSmall(self.particles_per_group));
        }
        if self.n_groups == 0 {
            return Err(ConfigError::ZeroGroups);
        }
        if self.n_groups < 2 && self.migration_prob > 0.0 {
            return Err(ConfigError::NotEnoughGroupsForMigration(self.n_groups));
        }
        if self.bounds.is_empty() {
            return Err(ConfigError::EmptyBounds);
        }
        if self.n_iter == 0 {
            return Err(ConfigError::ZeroIterations);
        }
        if self.migration_interval == 0 {
            return Err(ConfigError::ZeroMigrationInterval);
        }
        for (index, &(lo, hi)) in self.bounds.iter().enumerate() {
            if lo > hi {
                return Err(ConfigError::InvertedBound { index, lo, hi });
            }
        }
        for (field, value) in [
            ("crossover_prob", self.crossover_prob),
            ("migration_prob", self.migration_prob),
            ("snooker_prob", self.snooker_prob),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::NotAProbability { field, value });
            }
        }
        Ok(())
    }
}

/// Either the run's sample tensor (MH mode) or its optimum (greedy mode).
pub enum RunResult {
    Sampled(SampleResult),
    Optimized(OptimizeResult),
}

/// Owns one run of the population evolution engine.
pub struct Sampler<'a> {
    model: &'a dyn Model,
    config: SamplerConfig,
}

impl<'a> Sampler<'a> {
    pub fn new(model: &'a dyn Model, config: SamplerConfig) -> Result<Self, DeMcmcError> {
        config.validate()?;
        Ok(Sampler { model, config })
    }

    fn seeded_rng(seed: u64, id: usize) -> Pcg64 {
        // Distinct, reproducible per-chain streams from one master seed.
        Pcg64::seed_from_u64(seed ^ (id as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    /// Draws the initial population: one evaluated prior draw per particle,
    /// plus `n_initial - 1` extra unevaluated warm-start preview draws per
    /// particle. The preview draws are returned flattened (for the tensor's
    /// leading rows) but do not feed into the chain's working state -- see
    /// DESIGN.md for why.
    fn draw_initial(&self, bounds: &Bounds, rngs: &mut [Pcg64]) -> Result<(Vec<Particle>, InitialPreviews), DeMcmcError> {
        let n_particles = self.config.n_particles();
        let n_iter = self.config.n_iter;
        let mut particles = Vec::with_capacity(n_particles);
        let mut previews = Vec::with_capacity(n_particles);
        let mut first_shape: Option<Vec<Vec<usize>>> = None;

        for (id, rng) in rngs.iter_mut().enumerate().take(n_particles) {
            let theta = call_sample_prior(self.model, rng)?;
            let shape: Vec<Vec<usize>> = theta.components().iter().map(|c| c.shape().to_vec()).collect();
            match &first_shape {
                None => first_shape = Some(shape),
                Some(expected) => assert_eq!(*expected, shape, "sample_prior must return a fixed shape across particles"),
            }
            let weight = score(self.model, bounds, &theta, self.config.update_rule)?;

            let mut particle_previews = Vec::with_capacity(self.config.n_initial.saturating_sub(1));
            for _ in 1..self.config.n_initial {
                let extra = call_sample_prior(self.model, rng)?;
                particle_previews.push(extra.flatten());
            }
            previews.push(particle_previews);

            particles.push(Particle::new(id, theta, weight, n_iter));
        }
        Ok((particles, previews))
    }

    /// Builds one proposal for the particle at `local_idx` within `group`,
    /// reading peers only from `snapshot` (the group's state as of the end
    /// of the previous iteration). Returns `(proposal_theta, log_adj)`.
    #[allow(clippy::too_many_arguments)]
    fn build_proposal(
        &self,
        local_idx: usize,
        snapshot: &[Theta],
        active_block: Option<&[bool]>,
        rng: &mut impl Rng,
    ) -> (Theta, f64) {
        let x_theta = &snapshot[local_idx];

        if rng.gen::<f64>() < self.config.snooker_prob {
            let peers = pick_distinct_peers(rng, local_idx, snapshot.len(), 3);
            let (z, a, b) = (&snapshot[peers[0]], &snapshot[peers[1]], &snapshot[peers[2]]);
            if let Some(sp) = snooker(x_theta, z, a, b, rng) {
                let theta = match active_block {
                    Some(mask) => apply_block(&sp.theta, x_theta, mask),
                    None => sp.theta,
                };
                return (theta, sp.log_adj);
            }
            log::debug!("snooker direction degenerate, falling back to differential mutation");
        }

        let peers = pick_distinct_peers(rng, local_idx, snapshot.len(), 2);
        let (a, b) = (&snapshot[peers[0]], &snapshot[peers[1]]);
        let d_eff = match active_block {
            Some(mask) => block_d_eff(mask).max(1),
            None => x_theta.scalar_len(),
        };
        let gamma = sample_gamma(self.config.gamma_policy, d_eff, rng);
        let mutated = differential_mutation(x_theta, a, b, gamma, self.config.jitter_bound, rng);
        let y = crossover(&mutated, x_theta, self.config.crossover_prob, rng);
        let theta = match active_block {
            Some(mask) => apply_block(&y, x_theta, mask),
            None => y,
        };
        (theta, 0.0)
    }

    /// Runs one group's particles for one iteration: snapshots the group's
    /// state, builds+scores all proposals in parallel (rayon), then applies
    /// the update rule sequentially so writes land only on the live state.
    fn step_group(
        &self,
        group: &Group,
        arena: &mut ParticleArena,
        rngs: &mut [Pcg64],
        bounds: &Bounds,
        active_block: Option<&[bool]>,
    ) -> Result<(), DeMcmcError> {
        let snapshot: Vec<Theta> = group.slots.iter().map(|&id| arena.get(id).theta.clone()).collect();

        // Temporarily take ownership of this group's RNG streams so the
        // (expensive, opaque) proposal-building and scoring can run on
        // rayon's pool; each id is only ever touched by one worker.
        let placeholder = || Pcg64::seed_from_u64(0);
        let local_rngs: Vec<Pcg64> = group.slots.iter().map(|&id| std::mem::replace(&mut rngs[id], placeholder())).collect();

        let results: Vec<Result<(Theta, f64, f64, Pcg64), DeMcmcError>> = local_rngs
            .into_par_iter()
            .enumerate()
            .map(|(local_idx, mut rng)| {
                let (proposal, log_adj) = self.build_proposal(local_idx, &snapshot, active_block, &mut rng);
                let weight = score(self.model, bounds, &proposal, self.config.update_rule)?;
                Ok((proposal, weight, log_adj, rng))
            })
            .collect();

        for (&id, result) in group.slots.iter().zip(results) {
            let (proposal, weight, log_adj, rng) = result?;
            rngs[id] = rng;
            let particle = arena.get_mut(id);
            match self.config.update_rule {
                UpdateRule::Mh => {
                    let accepted = accept(weight, particle.weight, log_adj, &mut rngs[id]);
                    if accepted {
                        particle.theta = proposal;
                        particle.weight = weight;
                    }
                    particle.accept.push(accepted);
                    particle.lp.push(particle.weight);
                }
                UpdateRule::Maximize => maximize_update(particle, proposal, weight),
                UpdateRule::Minimize => minimize_update(particle, proposal, weight),
            }
        }
        Ok(())
    }

    /// Runs the configured number of iterations in sampling (MH) or
    /// optimization (maximize/minimize) mode, per spec.md §4.7's driver
    /// pseudocontract.
    pub fn run(&self, seed: u64, cancel: &CancelToken, mut progress: impl FnMut(IterationProgress)) -> Result<RunResult, DeMcmcError> {
        let _silence_callback_panics = SilentPanicGuard::install();
        let bounds = Bounds::new(self.config.bounds.clone());
        let n_particles = self.config.n_particles();
        let mut rngs: Vec<Pcg64> = (0..n_particles).map(|id| Self::seeded_rng(seed, id)).collect();

        let is_sampling = self.config.update_rule == UpdateRule::Mh;

        let (mut particles, previews) = self.draw_initial(&bounds, &mut rngs)?;
        let d_scalar = particles[0].theta.scalar_len();

        if let Some(blocks) = &self.config.blocking {
            for mask in blocks {
                if mask.len() != d_scalar {
                    return Err(DeMcmcError::Config(ConfigError::BlockingShapeMismatch {
                        mask_len: mask.len(),
                        d_scalar,
                    }));
                }
            }
        }

        let mut tensor = if is_sampling {
            let mut t = Array3::<f64>::zeros((self.config.n_iter + self.config.n_initial, d_scalar + 2, n_particles));
            for p in &particles {
                for (k, v) in p.theta.flatten().iter().enumerate() {
                    t[[0, k, p.id]] = *v;
                }
                for (i, preview) in previews[p.id].iter().enumerate() {
                    for (k, v) in preview.iter().enumerate() {
                        t[[i + 1, k, p.id]] = *v;
                    }
                }
            }
            Some(t)
        } else {
            None
        };

        let names = self.model.names();
        let mut flat_names = particles[0].theta.flatten_names(&names);
        flat_names.push("acceptance".to_string());
        flat_names.push("lp".to_string());

        let mut groups = partition_groups(self.config.n_groups, self.config.particles_per_group);
        let mut arena = ParticleArena::new(std::mem::take(&mut particles));

        let mut outcome = RunOutcome::Completed;

        'outer: for main_iter in 1..=self.config.n_iter {
            if cancel.is_cancelled() {
                outcome = RunOutcome::Cancelled { at_iteration: main_iter - 1 };
                break 'outer;
            }

            let active_block: Option<Vec<bool>> = self
                .config
                .blocking
                .as_ref()
                .map(|blocks| blocks[(main_iter - 1) % blocks.len()].clone());

            for group in groups.iter() {
                self.step_group(group, &mut arena, &mut rngs, &bounds, active_block.as_deref())?;
            }

            if let Some(t) = tensor.as_mut() {
                if main_iter > self.config.burnin {
                    let row = self.config.n_initial + main_iter - 1;
                    for p in arena.iter() {
                        let flat = p.theta.flatten();
                        for (k, v) in flat.iter().enumerate() {
                            t[[row, k, p.id]] = *v;
                        }
                        t[[row, d_scalar, p.id]] = *p.accept.last().unwrap_or(&false) as u8 as f64;
                        t[[row, d_scalar + 1, p.id]] = p.weight;
                    }
                }
            }

            if main_iter % self.config.migration_interval == 0 {
                let master_rng = &mut rngs[0];
                if master_rng.gen::<f64>() < self.config.migration_prob && self.config.n_groups >= 2 {
                    migrate(&mut groups, &arena, master_rng);
                }
            }

            let total_accepted: usize = arena.iter().filter_map(|p| p.accept.last()).filter(|&&a| a).count();
            let acceptance_rate = if is_sampling { total_accepted as f64 / n_particles as f64 } else { f64::NAN };
            let best_weight = match self.config.update_rule {
                UpdateRule::Maximize | UpdateRule::Mh => arena.iter().map(|p| p.weight).fold(f64::NEG_INFINITY, f64::max),
                UpdateRule::Minimize => arena.iter().map(|p| p.weight).fold(f64::INFINITY, f64::min),
            };
            progress(IterationProgress { iteration: main_iter, acceptance_rate, best_weight });
        }

        match self.config.update_rule {
            UpdateRule::Mh => Ok(RunResult::Sampled(SampleResult {
                tensor: tensor.expect("sampling mode always allocates a tensor"),
                names: flat_names,
                n_initial: self.config.n_initial,
                burnin: self.config.burnin,
                outcome,
            })),
            UpdateRule::Maximize => {
                let best = arena.iter().max_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap()).expect("non-empty population");
                Ok(RunResult::Optimized(OptimizeResult { theta: best.theta.clone(), weight: best.weight, outcome }))
            }
            UpdateRule::Minimize => {
                let best = arena.iter().min_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap()).expect("non-empty population");
                Ok(RunResult::Optimized(OptimizeResult { theta: best.theta.clone(), weight: best.weight, outcome }))
            }
        }
    }
}

//! Proposal operators: differential mutation (three gamma policies),
//! crossover, and the snooker update.

use crate::particle::Theta;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;

/// The three documented ways to scale the differential vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GammaPolicy {
    Fixed,
    Variable,
    Random,
}

/// `2.38 / sqrt(2 * d_eff)`, the classical DE-MCMC scaling constant.
/// `d_eff` is the number of scalar parameters actually being updated this
/// step: the full flattened count, or the active block's count when
/// blocking is in effect.
pub fn fixed_gamma(d_eff: usize) -> f64 {
    2.38 / (2.0 * d_eff as f64).sqrt()
}

/// Draws gamma under the configured policy.
///
/// `Random` draws from `Uniform(0.5, 1.0) * fixed_gamma(d_eff)`, the same
/// parametric form as `Variable` -- a narrow, symmetric multiplicative
/// perturbation around the fixed value, redrawn independently at every call
/// site rather than cached per chain (see SPEC_FULL.md §6's decision on
/// this open question).
pub fn sample_gamma(policy: GammaPolicy, d_eff: usize, rng: &mut impl Rng) -> f64 {
    let base = fixed_gamma(d_eff);
    match policy {
        GammaPolicy::Fixed => base,
        GammaPolicy::Variable | GammaPolicy::Random => {
            Uniform::new(0.5, 1.0).sample(rng) * base
        }
    }
}

/// Draws `k` distinct indices from `0..pool_len`, excluding `exclude`.
/// Panics if the pool (after excluding `exclude`) is smaller than `k`.
pub fn pick_distinct_peers(rng: &mut impl Rng, exclude: usize, pool_len: usize, k: usize) -> Vec<usize> {
    assert!(pool_len > k, "group too small to pick {k} distinct peers excluding the current particle");
    let mut picked = Vec::with_capacity(k);
    let dist = Uniform::new(0, pool_len);
    while picked.len() < k {
        let candidate = dist.sample(rng);
        if candidate != exclude && !picked.contains(&candidate) {
            picked.push(candidate);
        }
    }
    picked
}

/// `y = x + gamma * (a - b) + jitter`, jitter drawn from `Uniform(-b, b)`
/// per scalar entry and added with the type-preserving rule.
pub fn differential_mutation(x: &Theta, a: &Theta, b: &Theta, gamma: f64, jitter_bound: f64, rng: &mut impl Rng) -> Theta {
    let diff = a.sub(b);
    let scaled = diff.mul_scalar(gamma);
    let mutated = x.add(&scaled);
    mutated.add_uniform_jitter(jitter_bound, rng)
}

/// Per-scalar crossover mask: `true` keeps the mutated value, `false`
/// reverts to the current particle's value. Guarantees at least one `true`
/// so the step is never a pure no-op.
pub fn crossover_mask(d: usize, crossover_prob: f64, rng: &mut impl Rng) -> Vec<bool> {
    let mut mask: Vec<bool> = (0..d).map(|_| rng.gen::<f64>() >= crossover_prob).collect();
    if !mask.iter().any(|&keep| keep) {
        let forced = Uniform::new(0, d).sample(rng);
        mask[forced] = true;
    }
    mask
}

/// Applies the crossover mask: entries with `mask[k] == true` keep `y`'s
/// (mutated) value, the rest revert to `x`'s current value.
pub fn crossover(y: &Theta, x: &Theta, crossover_prob: f64, rng: &mut impl Rng) -> Theta {
    let mask = crossover_mask(y.scalar_len(), crossover_prob, rng);
    y.merge_with_mask(x, &mask)
}

/// Result of a successful snooker step: the proposal and its Jacobian-style
/// log-adjustment, which must enter MH acceptance alongside the weight
/// difference.
pub struct SnookerProposal {
    pub theta: Theta,
    pub log_adj: f64,
}

/// Builds a snooker proposal from `x` and three distinct peers `z, a, b`.
/// Returns `None` if `‖x - z‖ == 0` (degenerate direction): the caller must
/// fall back to differential mutation for this step.
pub fn snooker(x: &Theta, z: &Theta, a: &Theta, b: &Theta, rng: &mut impl Rng) -> Option<SnookerProposal> {
    let u = x.sub(z);
    let u_norm = u.norm();
    if u_norm == 0.0 {
        return None;
    }
    let a_proj = Theta::project(a, &u);
    let b_proj = Theta::project(b, &u);
    let gamma_s = Uniform::new(1.2, 2.2).sample(rng);
    let step = a_proj.sub(&b_proj).mul_scalar(gamma_s);
    let y = x.add(&step);

    let d = x.scalar_len() as f64;
    let y_minus_z = y.sub(z).norm();
    let log_adj = if y_minus_z == 0.0 || u_norm == 0.0 {
        0.0
    } else {
        (d - 1.0) * (y_minus_z.ln() - u_norm.ln())
    };
    Some(SnookerProposal { theta: y, log_adj })
}

/// Restricts a proposal to an active block: entries outside `active_mask`
/// are copied back from `x`, entries inside keep `y`'s value.
pub fn apply_block(y: &Theta, x: &Theta, active_mask: &[bool]) -> Theta {
    y.merge_with_mask(x, active_mask)
}

/// Number of `true` entries in a block mask -- the `d_eff` gamma uses when
/// blocking restricts the update to a subset of scalars.
pub fn block_d_eff(active_mask: &[bool]) -> usize {
    active_mask.iter().filter(|&&m| m).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Component;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn theta1(v: f64) -> Theta {
        Theta::new(vec![Component::scalar_real(v)])
    }

    #[test]
    fn fixed_gamma_matches_classical_constant() {
        let g = fixed_gamma(4);
        assert!((g - 2.38 / (8.0_f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn crossover_mask_never_all_false() {
        let mut rng = Pcg64::seed_from_u64(1);
        for _ in 0..200 {
            let mask = crossover_mask(5, 1.0, &mut rng);
            assert!(mask.iter().any(|&m| m));
        }
    }

    #[test]
    fn differential_mutation_moves_toward_ab_difference() {
        let mut rng = Pcg64::seed_from_u64(42);
        let x = theta1(0.0);
        let a = theta1(10.0);
        let b = theta1(0.0);
        let y = differential_mutation(&x, &a, &b, 1.0, 0.0, &mut rng);
        // gamma * (a - b) = 10.0, jitter bound is 0 so this is exact
        assert!((y.flatten()[0] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn snooker_degenerate_direction_returns_none() {
        let mut rng = Pcg64::seed_from_u64(7);
        let x = theta1(1.0);
        let z = theta1(1.0);
        let a = theta1(2.0);
        let b = theta1(3.0);
        assert!(snooker(&x, &z, &a, &b, &mut rng).is_none());
    }

    #[test]
    fn snooker_produces_finite_log_adjustment() {
        let mut rng = Pcg64::seed_from_u64(7);
        let x = theta1(1.0);
        let z = theta1(0.0);
        let a = theta1(2.0);
        let b = theta1(3.0);
        let prop = snooker(&x, &z, &a, &b, &mut rng).unwrap();
        assert!(prop.log_adj.is_finite());
    }

    #[test]
    fn block_restricts_changes_to_masked_entries() {
        let y = Theta::new(vec![Component::scalar_real(1.0), Component::scalar_real(2.0)]);
        let x = Theta::new(vec![Component::scalar_real(10.0), Component::scalar_real(20.0)]);
        let out = apply_block(&y, &x, &[true, false]);
        assert_eq!(out.flatten(), vec![1.0, 20.0]);
        assert_eq!(block_d_eff(&[true, false]), 1);
    }
}

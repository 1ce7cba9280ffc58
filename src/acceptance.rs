//! Metropolis-Hastings acceptance and the greedy optimization update rules.

use crate::particle::{Particle, Theta};
use rand::Rng;

/// `p = min(1, exp(w_new - w_cur + log_adj))`; accept iff `u ~ U(0,1) <= p`.
/// Any NaN in the exponent rejects the step.
pub fn accept(w_new: f64, w_cur: f64, log_adj: f64, rng: &mut impl Rng) -> bool {
    let exponent = w_new - w_cur + log_adj;
    if exponent.is_nan() {
        return false;
    }
    let p = exponent.exp().min(1.0);
    if p.is_nan() {
        return false;
    }
    let u: f64 = rng.gen();
    u <= p
}

/// Runs MH acceptance against `current` and records the trace. On accept,
/// `current`'s theta/weight are replaced with the proposal's.
pub fn mh_update(current: &mut Particle, proposal_theta: Theta, proposal_weight: f64, log_adj: f64, rng: &mut impl Rng) {
    let accepted = accept(proposal_weight, current.weight, log_adj, rng);
    if accepted {
        current.theta = proposal_theta;
        current.weight = proposal_weight;
    }
    current.accept.push(accepted);
    current.lp.push(current.weight);
}

/// Replaces `current` iff the proposal is strictly greater. Does not record
/// an acceptance trace -- optimization mode tracks only the incumbent.
pub fn maximize_update(current: &mut Particle, proposal_theta: Theta, proposal_weight: f64) {
    if proposal_weight > current.weight {
        current.theta = proposal_theta;
        current.weight = proposal_weight;
    }
}

/// Replaces `current` iff the proposal is strictly less.
pub fn minimize_update(current: &mut Particle, proposal_theta: Theta, proposal_weight: f64) {
    if proposal_weight < current.weight {
        current.theta = proposal_theta;
        current.weight = proposal_weight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Component;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn particle(weight: f64) -> Particle {
        Particle::new(0, Theta::new(vec![Component::scalar_real(0.0)]), weight, 10)
    }

    #[test]
    fn equal_weight_zero_log_adj_always_accepts() {
        let mut rng = Pcg64::seed_from_u64(3);
        for _ in 0..50 {
            assert!(accept(1.0, 1.0, 0.0, &mut rng));
        }
    }

    #[test]
    fn nan_exponent_rejects() {
        let mut rng = Pcg64::seed_from_u64(3);
        assert!(!accept(f64::NEG_INFINITY, f64::NEG_INFINITY, 0.0, &mut rng));
    }

    #[test]
    fn maximize_replaces_only_on_strict_improvement() {
        let mut p = particle(1.0);
        maximize_update(&mut p, Theta::new(vec![Component::scalar_real(5.0)]), 1.0);
        assert_eq!(p.weight, 1.0, "equal weight must not replace");
        maximize_update(&mut p, Theta::new(vec![Component::scalar_real(5.0)]), 2.0);
        assert_eq!(p.weight, 2.0);
    }

    #[test]
    fn minimize_replaces_only_on_strict_improvement() {
        let mut p = particle(1.0);
        minimize_update(&mut p, Theta::new(vec![Component::scalar_real(5.0)]), 1.0);
        assert_eq!(p.weight, 1.0);
        minimize_update(&mut p, Theta::new(vec![Component::scalar_real(5.0)]), 0.5);
        assert_eq!(p.weight, 0.5);
    }

    #[test]
    fn mh_update_never_replaces_finite_with_neg_inf() {
        let mut rng = Pcg64::seed_from_u64(9);
        let mut p = particle(-1.0);
        for _ in 0..100 {
            mh_update(&mut p, Theta::new(vec![Component::scalar_real(99.0)]), f64::NEG_INFINITY, 0.0, &mut rng);
            assert!(p.weight.is_finite());
        }
    }
}

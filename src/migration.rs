//! Periodic cross-group migration: swaps worst-like particles between a
//! random subset of groups in a circular shift, without re-evaluating their
//! weight.

use crate::group::{Group, ParticleArena};
use ordered_float::OrderedFloat;
use rand::seq::index::sample as sample_indices;
use rand::Rng;

/// One migration step's outcome, useful for logging and testing.
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub group_index: usize,
    pub slot_index: usize,
    pub particle_id_before: usize,
    pub particle_id_after: usize,
}

/// Picks the slot within `group` to export: softmax-proportional to
/// `exp(-weight)` (lower weight -> higher chance), or the single worst
/// (lowest-weight) slot if any weight is non-finite or the softmax
/// underflows to NaN.
fn select_slot(group: &Group, arena: &ParticleArena, rng: &mut impl Rng) -> usize {
    let weights: Vec<f64> = group.slots.iter().map(|&id| arena.get(id).weight).collect();

    let degenerate = weights.iter().any(|w| !w.is_finite());
    if degenerate {
        log::debug!("migration: non-finite weight in group, selecting worst particle");
        return worst_slot(&weights);
    }

    let min_w = weights.iter().cloned().fold(f64::INFINITY, f64::min);
    let unnormalized: Vec<f64> = weights.iter().map(|&w| (-(w - min_w)).exp()).collect();
    let sum: f64 = unnormalized.iter().sum();
    if !sum.is_finite() || sum <= 0.0 {
        log::warn!("migration: softmax underflow selecting export particle, falling back to worst");
        return worst_slot(&weights);
    }

    let mut cumulative = Vec::with_capacity(unnormalized.len());
    let mut running = 0.0;
    for &u in &unnormalized {
        running += u;
        cumulative.push(running);
    }

    // First index whose cumulative weight is >= r: a binary search over the
    // sorted (monotonically increasing) cumulative-sum table.
    let r: f64 = rng.gen::<f64>() * sum;
    let idx = bisection::bisect_left_by(&cumulative, |c| c.partial_cmp(&r).unwrap());
    idx.min(cumulative.len() - 1)
}

fn worst_slot(weights: &[f64]) -> usize {
    weights
        .iter()
        .enumerate()
        .min_by_key(|&(_, &w)| OrderedFloat(w))
        .map(|(i, _)| i)
        .expect("group must be non-empty")
}

/// Runs one migration step: draws `k in {2..=n_groups}`, samples `k`
/// distinct groups, exports one particle per selected group, and rotates
/// the exported particles right by one slot across the selected groups.
/// Weights are carried verbatim; only the arena id occupying each slot
/// changes.
pub fn migrate(groups: &mut [Group], arena: &ParticleArena, rng: &mut impl Rng) -> Vec<MigrationRecord> {
    let n_groups = groups.len();
    assert!(n_groups >= 2, "migration requires at least 2 groups");

    let k = rng.gen_range(2..=n_groups);
    let selected_groups = sample_indices(rng, n_groups, k).into_vec();

    let selections: Vec<(usize, usize)> = selected_groups
        .iter()
        .map(|&g| {
            let slot = select_slot(&groups[g], arena, rng);
            (g, slot)
        })
        .collect();

    let exported_ids: Vec<usize> = selections.iter().map(|&(g, s)| groups[g].slots[s]).collect();

    let mut records = Vec::with_capacity(k);
    for i in 0..k {
        let (dest_group, dest_slot) = selections[(i + 1) % k];
        let before = groups[dest_group].slots[dest_slot];
        groups[dest_group].slots[dest_slot] = exported_ids[i];
        records.push(MigrationRecord {
            group_index: dest_group,
            slot_index: dest_slot,
            particle_id_before: before,
            particle_id_after: exported_ids[i],
        });
    }
    log::debug!("migration moved {k} particles across {k} groups");
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::{Component, Particle, Theta};
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn make_arena(weights: &[f64]) -> ParticleArena {
        let particles = weights
            .iter()
            .enumerate()
            .map(|(id, &w)| Particle::new(id, Theta::new(vec![Component::scalar_real(id as f64)]), w, 10))
            .collect();
        ParticleArena::new(particles)
    }

    #[test]
    fn migration_preserves_population_identities() {
        let arena = make_arena(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut groups = crate::group::partition_groups(3, 2);
        let mut rng = Pcg64::seed_from_u64(5);

        let before: Vec<usize> = groups.iter().flat_map(|g| g.slots.clone()).collect();
        migrate(&mut groups, &arena, &mut rng);
        let mut after: Vec<usize> = groups.iter().flat_map(|g| g.slots.clone()).collect();
        after.sort_unstable();
        let mut before_sorted = before.clone();
        before_sorted.sort_unstable();
        assert_eq!(before_sorted, after, "the multiset of ids must be unchanged");
    }

    #[test]
    fn migration_moves_at_least_one_identity_with_certainty_at_migration_interval_one() {
        let arena = make_arena(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut groups = crate::group::partition_groups(3, 2);
        let mut rng = Pcg64::seed_from_u64(11);

        let before: Vec<Vec<usize>> = groups.iter().map(|g| g.slots.clone()).collect();
        migrate(&mut groups, &arena, &mut rng);
        let after: Vec<Vec<usize>> = groups.iter().map(|g| g.slots.clone()).collect();
        assert_ne!(before, after, "at least one particle must have moved between groups");
    }

    #[test]
    fn degenerate_weights_fall_back_to_worst_without_panicking() {
        let arena = make_arena(&[f64::NEG_INFINITY, 2.0, f64::NAN, 4.0]);
        let mut groups = crate::group::partition_groups(2, 2);
        let mut rng = Pcg64::seed_from_u64(2);
        migrate(&mut groups, &arena, &mut rng);
    }
}

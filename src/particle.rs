//! Particles and the type-preserving arithmetic over their parameter vectors.
//!
//! A particle's `theta` is a sequence of components, each either a scalar or
//! an n-D array, each either real- or integer-typed. We represent both
//! scalars and arrays with `ndarray::ArrayD` (a 0-dimensional array stands in
//! for a scalar) so that `+`, `-`, `*` dispatch through one elementwise path
//! regardless of shape.

use ndarray::{ArrayD, Dimension, IxDyn, Zip};
use rand::Rng;

/// Half-away-from-zero: the tie-break used everywhere an integer-typed
/// component is rounded. Chosen once here and reused by every arithmetic
/// operator so discrete parameters round consistently.
fn round_half_away_from_zero(x: f64) -> f64 {
    if x >= 0.0 {
        (x + 0.5).floor()
    } else {
        (x - 0.5).ceil()
    }
}

/// Index tuples over `shape` in column-major order (first axis fastest),
/// the order spec.md §3/§4.8 mandates for flattening array components onto
/// the scalar axis. `ndarray::indices` walks a shape in row-major (last
/// axis fastest) order, so we walk the reversed shape instead and reverse
/// each resulting index back to the original axis order.
fn column_major_indices(shape: &[usize]) -> Vec<Vec<usize>> {
    let reversed_shape: Vec<usize> = shape.iter().rev().copied().collect();
    ndarray::indices(IxDyn(&reversed_shape))
        .into_iter()
        .map(|idx| {
            let mut v: Vec<usize> = idx.slice().to_vec();
            v.reverse();
            v
        })
        .collect()
}

/// Flattens `data` in column-major order. Equivalent to, and implemented
/// via, reversing every axis (`.t()`) and then iterating in the view's own
/// (now axis-reversed) standard order.
fn flatten_column_major(data: &ArrayD<f64>) -> Vec<f64> {
    data.t().iter().copied().collect()
}

/// Inverse of `flatten_column_major`: rebuilds an array of `shape` from a
/// column-major-ordered flat slice. Writes through the axis-reversed view
/// (mirroring `flatten_column_major`'s read) rather than indexing one
/// `Vec<usize>` tuple per entry.
fn unflatten_column_major(shape: &[usize], flat: &[f64]) -> ArrayD<f64> {
    let mut out = ArrayD::<f64>::zeros(IxDyn(shape));
    out.view_mut().reversed_axes().iter_mut().zip(flat.iter()).for_each(|(o, &v)| *o = v);
    out
}

/// Whether a component's scalar entries are constrained to integer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Real,
    Int,
}

impl Kind {
    fn combine(self, other: Kind) -> Kind {
        if self == Kind::Int || other == Kind::Int {
            Kind::Int
        } else {
            Kind::Real
        }
    }
}

/// One top-level component of a particle's parameter vector: a scalar or
/// n-D array, real- or integer-typed. Shape is fixed at construction and
/// never changes afterward.
#[derive(Debug, Clone)]
pub struct Component {
    data: ArrayD<f64>,
    kind: Kind,
}

impl Component {
    pub fn scalar_real(value: f64) -> Self {
        Component { data: ArrayD::from_elem(IxDyn(&[]), value), kind: Kind::Real }
    }

    pub fn scalar_int(value: i64) -> Self {
        Component { data: ArrayD::from_elem(IxDyn(&[]), value as f64), kind: Kind::Int }
    }

    pub fn array_real(data: ArrayD<f64>) -> Self {
        Component { data, kind: Kind::Real }
    }

    pub fn array_int(data: ArrayD<f64>) -> Self {
        let rounded = data.mapv(round_half_away_from_zero);
        Component { data: rounded, kind: Kind::Int }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_int(&self) -> bool {
        self.kind == Kind::Int
    }

    pub fn data(&self) -> &ArrayD<f64> {
        &self.data
    }

    fn apply_kind(&mut self) {
        if self.kind == Kind::Int {
            self.data.mapv_inplace(round_half_away_from_zero);
        }
    }

    fn same_shape(&self, other: &Component) -> bool {
        self.shape() == other.shape()
    }

    fn binary(&self, other: &Component, f: impl Fn(f64, f64) -> f64) -> Component {
        assert!(
            self.same_shape(other),
            "component shape mismatch: {:?} vs {:?}",
            self.shape(),
            other.shape()
        );
        let data = Zip::from(&self.data).and(&other.data).map_collect(|&a, &b| f(a, b));
        let mut out = Component { data, kind: self.kind.combine(other.kind) };
        out.apply_kind();
        out
    }

    fn scalar_op(&self, rhs: f64, f: impl Fn(f64, f64) -> f64) -> Component {
        let data = self.data.mapv(|a| f(a, rhs));
        let mut out = Component { data, kind: self.kind };
        out.apply_kind();
        out
    }

    pub fn add(&self, other: &Component) -> Component {
        self.binary(other, |a, b| a + b)
    }
    pub fn sub(&self, other: &Component) -> Component {
        self.binary(other, |a, b| a - b)
    }
    pub fn mul(&self, other: &Component) -> Component {
        self.binary(other, |a, b| a * b)
    }

    pub fn add_scalar(&self, rhs: f64) -> Component {
        self.scalar_op(rhs, |a, b| a + b)
    }
    pub fn sub_scalar(&self, rhs: f64) -> Component {
        self.scalar_op(rhs, |a, b| a - b)
    }
    pub fn mul_scalar(&self, rhs: f64) -> Component {
        self.scalar_op(rhs, |a, b| a * b)
    }

    /// Adds a perturbation array of matching shape (always real-valued, as
    /// produced by a jitter/noise distribution) using the type-preserving
    /// rule: the result keeps this component's kind.
    pub fn add_perturbation(&self, perturbation: &ArrayD<f64>) -> Component {
        assert_eq!(self.shape(), perturbation.shape(), "perturbation shape mismatch");
        let data = Zip::from(&self.data).and(perturbation).map_collect(|&a, &b| a + b);
        let mut out = Component { data, kind: self.kind };
        out.apply_kind();
        out
    }
}

/// The full parameter vector: an ordered sequence of components. Shape is
/// fixed by the first prior draw and immutable thereafter.
#[derive(Debug, Clone)]
pub struct Theta(pub Vec<Component>);

impl Theta {
    pub fn new(components: Vec<Component>) -> Self {
        Theta(components)
    }

    pub fn components(&self) -> &[Component] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn shapes_match(&self, other: &Theta) -> bool {
        self.0.len() == other.0.len()
            && self.0.iter().zip(other.0.iter()).all(|(a, b)| a.shape() == b.shape())
    }

    /// Total scalar entry count across all components, flattened
    /// column-major within each array component.
    pub fn scalar_len(&self) -> usize {
        self.0.iter().map(|c| c.data().len()).sum()
    }

    /// Flattens to a single scalar vector, column-major within each array
    /// component, components concatenated in order.
    pub fn flatten(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.scalar_len());
        for c in &self.0 {
            out.extend(flatten_column_major(c.data()));
        }
        out
    }

    /// Flattened parameter names: `name` for scalars, `name[i,j,...]` for
    /// array entries in column-major order, matching `flatten()`'s layout.
    pub fn flatten_names(&self, names: &[String]) -> Vec<String> {
        assert_eq!(names.len(), self.0.len(), "name count must match component count");
        let mut out = Vec::with_capacity(self.scalar_len());
        for (name, c) in names.iter().zip(self.0.iter()) {
            if c.shape().is_empty() {
                out.push(name.clone());
            } else {
                for idx in column_major_indices(c.shape()) {
                    let idx_str = idx.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(",");
                    out.push(format!("{name}[{idx_str}]"));
                }
            }
        }
        out
    }

    /// Pairwise elementwise operator; panics if shapes don't match.
    fn binary(&self, other: &Theta, f: impl Fn(&Component, &Component) -> Component) -> Theta {
        assert!(self.shapes_match(other), "theta shape mismatch");
        Theta(self.0.iter().zip(other.0.iter()).map(|(a, b)| f(a, b)).collect())
    }

    pub fn add(&self, other: &Theta) -> Theta {
        self.binary(other, Component::add)
    }
    pub fn sub(&self, other: &Theta) -> Theta {
        self.binary(other, Component::sub)
    }
    pub fn mul(&self, other: &Theta) -> Theta {
        self.binary(other, Component::mul)
    }

    pub fn add_scalar(&self, rhs: f64) -> Theta {
        Theta(self.0.iter().map(|c| c.add_scalar(rhs)).collect())
    }
    pub fn sub_scalar(&self, rhs: f64) -> Theta {
        Theta(self.0.iter().map(|c| c.sub_scalar(rhs)).collect())
    }
    pub fn mul_scalar(&self, rhs: f64) -> Theta {
        Theta(self.0.iter().map(|c| c.mul_scalar(rhs)).collect())
    }

    /// Multiplies each top-level component by its own scalar factor --
    /// the "vector-of-scalars" operand form from the arithmetic spec.
    pub fn mul_per_component(&self, factors: &[f64]) -> Theta {
        assert_eq!(factors.len(), self.0.len(), "one factor per top-level component required");
        Theta(self.0.iter().zip(factors.iter()).map(|(c, &f)| c.mul_scalar(f)).collect())
    }

    /// Draws a perturbation from `b..=b` bound of a symmetric uniform
    /// distribution for every scalar entry of every component, and adds it
    /// with the type-preserving rule (half ε ~ Uniform(-b, b)).
    pub fn add_uniform_jitter(&self, b: f64, rng: &mut impl Rng) -> Theta {
        use rand::distributions::{Distribution, Uniform};
        let dist = Uniform::new_inclusive(-b, b);
        Theta(
            self.0
                .iter()
                .map(|c| {
                    let noise = ArrayD::from_shape_fn(IxDyn(c.shape()), |_| dist.sample(rng));
                    c.add_perturbation(&noise)
                })
                .collect(),
        )
    }

    /// Inner product over all flattened scalar entries.
    pub fn dot(&self, other: &Theta) -> f64 {
        self.flatten().iter().zip(other.flatten().iter()).map(|(a, b)| a * b).sum()
    }

    /// Euclidean norm over the flattened scalar entries.
    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// `p2 * (<p1, p2> / <p2, p2>)`, the projection used by the snooker
    /// operator.
    pub fn project(p1: &Theta, p2: &Theta) -> Theta {
        let denom = p2.dot(p2);
        let scale = if denom == 0.0 { 0.0 } else { p1.dot(p2) / denom };
        p2.mul_scalar(scale)
    }

    /// Replaces only the flattened scalar entries selected by `mask` (true
    /// = keep `self`'s value, false = take `other`'s), used by crossover and
    /// blocking. Both thetas must share shape.
    pub fn merge_with_mask(&self, other: &Theta, keep_self: &[bool]) -> Theta {
        assert!(self.shapes_match(other), "theta shape mismatch");
        assert_eq!(keep_self.len(), self.scalar_len(), "mask length must match flattened length");
        let mut flat_idx = 0usize;
        let components = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let n = a.data().len();
                let mask_slice = &keep_self[flat_idx..flat_idx + n];
                flat_idx += n;
                // Walk both operands in the same column-major order as
                // `flatten`/`flatten_names`, so a mask index lines up with
                // the same named scalar entry everywhere it is used.
                let a_flat = flatten_column_major(a.data());
                let b_flat = flatten_column_major(b.data());
                let merged: Vec<f64> = a_flat
                    .iter()
                    .zip(b_flat.iter())
                    .zip(mask_slice.iter())
                    .map(|((&av, &bv), &keep)| if keep { av } else { bv })
                    .collect();
                let data = unflatten_column_major(a.shape(), &merged);
                Component { data, kind: a.kind }
            })
            .collect();
        Theta(components)
    }
}

/// A single chain's current state plus per-iteration bookkeeping.
#[derive(Debug, Clone)]
pub struct Particle {
    pub theta: Theta,
    /// Log-posterior (sampling) or objective value (optimization). `-inf`
    /// (or `+inf` when minimizing) signals out-of-bounds.
    pub weight: f64,
    /// Stable identity in `[0, n_particles)`, indexes the sample tensor's
    /// particle axis.
    pub id: usize,
    pub accept: Vec<bool>,
    pub lp: Vec<f64>,
}

impl Particle {
    pub fn new(id: usize, theta: Theta, weight: f64, n_iter: usize) -> Self {
        Particle {
            theta,
            weight,
            id,
            accept: Vec::with_capacity(n_iter),
            lp: Vec::with_capacity(n_iter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_add_real_rounds_half_away_from_zero() {
        let a = Component::scalar_int(3);
        let b = Component::scalar_real(0.5);
        let sum = a.add(&b);
        assert!(sum.is_int());
        assert_eq!(sum.data()[IxDyn(&[])], 4.0);

        let c = Component::scalar_int(3);
        let d = Component::scalar_real(-1.5);
        let diff = c.add(&d);
        assert_eq!(diff.data()[IxDyn(&[])], 2.0);
    }

    #[test]
    fn real_plus_real_stays_real_and_unrounded() {
        let a = Component::scalar_real(1.25);
        let b = Component::scalar_real(0.1);
        let sum = a.add(&b);
        assert!(!sum.is_int());
        assert!((sum.data()[IxDyn(&[])] - 1.35).abs() < 1e-12);
    }

    #[test]
    fn theta_flatten_matches_scalar_len() {
        let theta = Theta::new(vec![
            Component::scalar_real(1.0),
            Component::array_real(ArrayD::from_shape_vec(IxDyn(&[2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap()),
        ]);
        assert_eq!(theta.scalar_len(), 5);
        assert_eq!(theta.flatten().len(), 5);
    }

    #[test]
    fn project_onto_self_returns_self() {
        let p = Theta::new(vec![Component::scalar_real(3.0), Component::scalar_real(4.0)]);
        let proj = Theta::project(&p, &p);
        assert!((proj.flatten()[0] - 3.0).abs() < 1e-9);
        assert!((proj.flatten()[1] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn norm_matches_euclidean_length() {
        let p = Theta::new(vec![Component::scalar_real(3.0), Component::scalar_real(4.0)]);
        assert!((p.norm() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn names_flatten_with_column_major_indices() {
        let theta = Theta::new(vec![
            Component::scalar_real(1.0),
            Component::array_real(ArrayD::from_shape_vec(IxDyn(&[2]), vec![1.0, 2.0]).unwrap()),
        ]);
        let names = theta.flatten_names(&["a".to_string(), "b".to_string()]);
        assert_eq!(names, vec!["a", "b[0]", "b[1]"]);
    }

    #[test]
    fn two_d_non_square_array_flattens_and_names_column_major() {
        // Row-major layout: (0,0)=1 (0,1)=2 (0,2)=3 (1,0)=4 (1,1)=5 (1,2)=6.
        // Column-major (axis 0 fastest) visits (0,0) (1,0) (0,1) (1,1) (0,2) (1,2).
        let array = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let theta = Theta::new(vec![Component::array_real(array)]);

        assert_eq!(theta.flatten(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);

        let names = theta.flatten_names(&["b".to_string()]);
        assert_eq!(names, vec!["b[0,0]", "b[1,0]", "b[0,1]", "b[1,1]", "b[0,2]", "b[1,2]"]);
    }

    #[test]
    fn merge_with_mask_applies_column_major_mask_to_2d_array() {
        let a = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let b = ArrayD::from_shape_vec(IxDyn(&[2, 3]), vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0]).unwrap();
        let theta_a = Theta::new(vec![Component::array_real(a)]);
        let theta_b = Theta::new(vec![Component::array_real(b)]);

        // Column-major flat order is [(0,0),(1,0),(0,1),(1,1),(0,2),(1,2)];
        // keep `a` only at the first flattened entry.
        let mask = vec![true, false, false, false, false, false];
        let merged = theta_a.merge_with_mask(&theta_b, &mask);

        assert_eq!(merged.flatten(), vec![1.0, 40.0, 20.0, 50.0, 30.0, 60.0]);
    }
}

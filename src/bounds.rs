//! Bounds checking over a particle's flattened parameter vector.

use crate::particle::Theta;

/// An ordered sequence of `(lo, hi)` pairs, one per top-level component of
/// `theta`. When a component is an array, the same pair bounds every scalar
/// entry in it.
#[derive(Debug, Clone)]
pub struct Bounds(pub Vec<(f64, f64)>);

impl Bounds {
    pub fn new(pairs: Vec<(f64, f64)>) -> Self {
        Bounds(pairs)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True iff every scalar entry of every component of `theta` lies in its
    /// paired `[lo, hi]` interval.
    pub fn in_bounds(&self, theta: &Theta) -> bool {
        assert_eq!(
            self.0.len(),
            theta.components().len(),
            "bounds must have one pair per top-level component"
        );
        theta.components().iter().zip(self.0.iter()).all(|(c, &(lo, hi))| {
            c.data().iter().all(|&v| v >= lo && v <= hi)
        })
    }
}

//! Implements the "weight-space" bins used for sampling rows with a
//! probability proportional to their weight.
//!
//! The bins are described by an inclusive prefix sum of the weights: bin `i`
//! covers the interval `(cumulative[i-1], cumulative[i]]` (with
//! `cumulative[-1]` taken to be 0). The search is left-aligned: a value that
//! is equal to an edge belongs to the bin that ends at that edge. The one
//! exception is a value of exactly 0, which belongs to the first bin with a
//! positive weight. A consequence is that a bin with zero weight can never be
//! selected by an in-range value.
//!
//! # Rounding
//! In practice, the value we search for is `u * potential`, where the
//! potential was summed in a different order than the prefix sum (or on a
//! different rank). The value can therefore land slightly beyond the last
//! edge. [`CumulativeWeights::locate_clamped`] maps such values onto the last
//! bin with positive weight rather than producing an out-of-range index.

use crate::float::Float;

/// Fills `cumulative` with the inclusive prefix sum of `weights`.
///
/// The sum is always carried out in `f64`.
pub fn fill_cumulative<F: Float>(
    weights: &[F],
    cumulative: &mut [f64],
) -> Result<(), &'static str> {
    if weights.len() != cumulative.len() {
        return Err("cumulative must have an entry for every weight");
    }
    let mut running = 0.0;
    for (w, c) in weights.iter().zip(cumulative.iter_mut()) {
        running += w.to_f64();
        *c = running;
    }
    Ok(())
}

/// A view of an inclusive prefix sum of non-negative weights.
#[derive(Clone, Copy)]
pub struct CumulativeWeights<'a> {
    cumulative: &'a [f64],
}

impl<'a> CumulativeWeights<'a> {
    pub fn new(cumulative: &'a [f64]) -> Result<CumulativeWeights<'a>, &'static str> {
        if cumulative.is_empty() {
            Err("at least 1 cumulative weight is required")
        } else if cumulative.iter().any(|x| !x.is_finite()) {
            Err("cumulative weights must be finite")
        } else if cumulative[0] < 0.0 {
            Err("weights must be non-negative")
        } else if !cumulative.is_sorted() {
            Err("cumulative weights must be monotonically non-decreasing")
        } else {
            Ok(CumulativeWeights { cumulative })
        }
    }

    pub fn n_bins(&self) -> usize {
        self.cumulative.len()
    }

    /// The sum of all weights
    pub fn total(&self) -> f64 {
        self.cumulative[self.cumulative.len() - 1]
    }

    /// The cumulative weight of every bin that precedes `index`
    pub fn offset(&self, index: usize) -> f64 {
        if index == 0 { 0.0 } else { self.cumulative[index - 1] }
    }

    /// Returns the index of the first bin whose cumulative weight is greater
    /// than or equal to `value` (and positive).
    ///
    /// Returns `None` if `value` is negative, `NaN`, greater than
    /// [`Self::total`], or if every weight is zero.
    pub fn bin_index(&self, value: f64) -> Option<usize> {
        // written this way so that NaN falls into the first branch
        if !(value >= 0.0) || value > self.total() || self.total() <= 0.0 {
            return None;
        }
        // the `c <= 0.0` term moves a value of 0 past any leading bins
        // without weight
        Some(self.cumulative.partition_point(|&c| c < value || c <= 0.0))
    }

    /// The index of the last bin with a positive weight. When all weights are
    /// zero, this is the last bin.
    pub fn last_positive_bin(&self) -> usize {
        let n = self.cumulative.len();
        (0..n)
            .rev()
            .find(|&i| self.cumulative[i] > self.offset(i))
            .unwrap_or(n - 1)
    }

    /// Like [`Self::bin_index`], but never fails.
    ///
    /// - values beyond [`Self::total`] resolve to [`Self::last_positive_bin`]
    /// - negative values (and `NaN`) are treated as `0.0`
    pub fn locate_clamped(&self, value: f64) -> usize {
        // f64::max returns the non-NaN operand
        let value = value.max(0.0);
        self.bin_index(value)
            .unwrap_or_else(|| self.last_positive_bin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_creation() {
        assert!(CumulativeWeights::new(&[]).is_err());
        assert!(CumulativeWeights::new(&[1.0, f64::NAN]).is_err());
        assert!(CumulativeWeights::new(&[1.0, f64::INFINITY]).is_err());
        assert!(CumulativeWeights::new(&[-1.0, 2.0]).is_err());
        assert!(CumulativeWeights::new(&[2.0, 1.0]).is_err());
    }

    #[test]
    fn prefix_sum() {
        let mut cumulative = [0.0; 4];
        fill_cumulative(&[1.0_f32, 0.0, 2.5, 4.0], &mut cumulative).unwrap();
        assert_eq!(cumulative, [1.0, 1.0, 3.5, 7.5]);

        let mut too_short = [0.0; 3];
        assert!(fill_cumulative(&[1.0_f64, 2.0, 3.0, 4.0], &mut too_short).is_err());
    }

    #[test]
    fn bin_indexing() {
        let weights = CumulativeWeights::new(&[1.0, 3.0, 6.0]).unwrap();
        assert_eq!(weights.n_bins(), 3);
        assert_eq!(weights.total(), 6.0);

        assert_eq!(weights.bin_index(0.0), Some(0));
        assert_eq!(weights.bin_index(0.9), Some(0));
        assert_eq!(weights.bin_index(1.0), Some(0));
        assert_eq!(weights.bin_index(1.1), Some(1));
        assert_eq!(weights.bin_index(3.0), Some(1));
        assert_eq!(weights.bin_index(3.5), Some(2));
        assert_eq!(weights.bin_index(6.0), Some(2));

        // boundary conditions
        assert_eq!(weights.bin_index(6.1), None);
        assert_eq!(weights.bin_index(-0.1), None);
        assert_eq!(weights.bin_index(f64::NAN), None);
    }

    #[test]
    fn value_at_an_edge_resolves_to_the_bin_ending_there() {
        // 2 bins, as for a pair of shards holding 2.0 each
        let weights = CumulativeWeights::new(&[2.0, 4.0]).unwrap();
        assert_eq!(weights.locate_clamped(2.0), 0);
        assert_eq!(weights.locate_clamped(4.0), 1);

        let weights = CumulativeWeights::new(&[1.0, 2.0]).unwrap();
        assert_eq!(weights.locate_clamped(1.0), 0);
    }

    #[test]
    fn value_at_last_edge_resolves_to_last_row() {
        let weights = CumulativeWeights::new(&[1.0, 3.0, 6.0]).unwrap();
        assert_eq!(weights.locate_clamped(6.0), 2);
        assert_eq!(weights.locate_clamped(6.0 + 1e-9), 2);
        assert_eq!(weights.locate_clamped(f64::MAX), 2);

        // trailing bins without weight are never picked
        let weights = CumulativeWeights::new(&[1.0, 3.0, 3.0]).unwrap();
        assert_eq!(weights.locate_clamped(3.0), 1);
        assert_eq!(weights.locate_clamped(3.5), 1);
    }

    #[test]
    fn zero_weight_bins_are_skipped() {
        // weights: [0, 2, 0, 0]
        let weights = CumulativeWeights::new(&[0.0, 2.0, 2.0, 2.0]).unwrap();
        assert_eq!(weights.bin_index(0.0), Some(1));
        assert_eq!(weights.bin_index(1.999), Some(1));
        assert_eq!(weights.bin_index(2.0), Some(1));
        assert_eq!(weights.last_positive_bin(), 1);
        assert_eq!(weights.locate_clamped(2.0), 1);
        assert_eq!(weights.locate_clamped(-3.0), 1);
        assert_eq!(weights.locate_clamped(f64::NAN), 1);
    }

    #[test]
    fn all_zero_weights() {
        let weights = CumulativeWeights::new(&[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(weights.bin_index(0.0), None);
        assert_eq!(weights.last_positive_bin(), 2);
        assert_eq!(weights.locate_clamped(0.0), 2);
    }

    #[test]
    fn offsets() {
        let weights = CumulativeWeights::new(&[1.0, 3.0, 6.0]).unwrap();
        assert_eq!(weights.offset(0), 0.0);
        assert_eq!(weights.offset(1), 1.0);
        assert_eq!(weights.offset(2), 3.0);
    }

    #[test]
    fn exhaustive_edges() {
        // integer weights make every edge exactly representable
        let cumulative = [2.0, 2.0, 5.0, 9.0, 9.0, 10.0];
        let weights = CumulativeWeights::new(&cumulative).unwrap();
        for edge in cumulative.iter() {
            let idx = weights.locate_clamped(*edge);
            // the located bin must have positive weight and end at `edge`
            assert!(weights.cumulative[idx] > weights.offset(idx));
            assert_eq!(weights.cumulative[idx], *edge);
            // a value just past the edge moves on to the next weighted bin
            let next = weights.locate_clamped(*edge + 0.5);
            if *edge < weights.total() {
                assert!(next > idx);
                assert!(weights.offset(next) <= *edge + 0.5);
                assert!(weights.cumulative[next] >= *edge + 0.5);
            } else {
                assert_eq!(next, 5);
            }
        }
    }
}

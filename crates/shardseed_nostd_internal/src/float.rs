//! Defines the floating-point element trait that the numerical kernels are
//! generic over.
//!
//! We could have reached for `num_traits::Float`, but we only need a tiny
//! subset of functionality and we want `ndarray`'s matrix products to be
//! available for every element type (hence the [`LinalgScalar`] bound).

use core::fmt::Debug;
use core::ops::AddAssign;
use ndarray::LinalgScalar;

/// The element type of a sample matrix.
///
/// This is only implemented for [`f32`] and [`f64`]. Accumulations that span
/// many rows (potentials, cumulative sums) are always carried out in `f64`,
/// which is why conversions to and from `f64` are part of the trait.
pub trait Float: LinalgScalar + AddAssign + PartialOrd + Debug + Send + Sync {
    const ZERO: Self;
    /// Largest finite value. It doubles as the "no centroid yet" sentinel
    /// for closest-distance vectors.
    const MAX_VALUE: Self;

    fn to_f64(self) -> f64;

    fn from_f64(value: f64) -> Self;

    fn is_nan(self) -> bool;

    /// the smaller of `self` and `other` (`self` wins when they compare
    /// equal).
    ///
    /// Unlike `f64::min`, a `NaN` in either operand is propagated. A
    /// non-finite sample must poison the potential rather than being
    /// silently skipped.
    #[inline(always)]
    fn min_val(self, other: Self) -> Self {
        if other < self || other.is_nan() {
            other
        } else {
            self
        }
    }

    /// clamps negative values (typically rounding residue) to zero
    #[inline(always)]
    fn clamp_nonnegative(self) -> Self {
        if self < Self::ZERO { Self::ZERO } else { self }
    }
}

impl Float for f32 {
    const ZERO: Self = 0.0;
    const MAX_VALUE: Self = f32::MAX;

    #[inline(always)]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        value as f32
    }

    #[inline(always)]
    fn is_nan(self) -> bool {
        f32::is_nan(self)
    }
}

impl Float for f64 {
    const ZERO: Self = 0.0;
    const MAX_VALUE: Self = f64::MAX;

    #[inline(always)]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline(always)]
    fn from_f64(value: f64) -> Self {
        value
    }

    #[inline(always)]
    fn is_nan(self) -> bool {
        f64::is_nan(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_and_clamp() {
        assert_eq!(3.0_f64.min_val(2.0), 2.0);
        assert_eq!(2.0_f32.min_val(3.0), 2.0);
        assert_eq!((-1e-12_f64).clamp_nonnegative(), 0.0);
        assert_eq!(4.5_f32.clamp_nonnegative(), 4.5);
    }

    #[test]
    fn min_propagates_nan() {
        assert!(f64::MAX.min_val(f64::NAN).is_nan());
        assert!(f64::NAN.min_val(1.0).is_nan());
        assert!(Float::is_nan(f32::NAN.min_val(f32::MAX)));
    }

    #[test]
    fn f32_roundtrip_is_exact() {
        // every f32 is exactly representable as an f64
        let vals = [0.0_f32, -0.5, 1.0e-30, 3.25, f32::MAX];
        for v in vals {
            assert_eq!(f32::from_f64(v.to_f64()), v);
        }
    }
}

use crate::float::Float;
use ndarray::ArrayView1;

/// calculate the squared norm of the difference between two (mathematical)
/// vectors.
///
/// This is the direct formulation (no norm identity). It is slower than the
/// blocked kernels in [`crate::distance`], but it doesn't suffer from
/// cancellation, which makes it a useful reference.
pub fn squared_diff_norm<F: Float>(v1: ArrayView1<F>, v2: ArrayView1<F>) -> F {
    let mut sum = F::ZERO;
    for (a, b) in v1.iter().zip(v2.iter()) {
        let diff = *a - *b;
        sum += diff * diff; // NOTE: .powi can't be used in no_std crates
    }
    sum
}

/// computes a dot product between two (mathematical) vectors
pub fn dot_product<F: Float>(values_a: ArrayView1<F>, values_b: ArrayView1<F>) -> F {
    let mut sum = F::ZERO;
    for (a, b) in values_a.iter().zip(values_b.iter()) {
        sum += *a * *b;
    }
    sum
}

//! The Norm/Distance block kernels.
//!
//! Every kernel operates on a single block of sample rows (see
//! [`crate::blocks`]); looping over the blocks is the responsibility of an
//! [`crate::Executor`].
//!
//! Squared distances are computed with the identity
//! `||a - b||² = ||a||² + ||b||² - 2 a·b`, where the inner-product term comes
//! from a dense matrix-vector (or matrix-matrix) product. The identity is
//! susceptible to cancellation, so results are clamped at zero. The
//! consequence is that the distance between a row and itself may come out
//! as a tiny positive number (it is exactly 0 for integer-valued data).
//!
//! Potentials (sums of squared distances) are always accumulated in `f64`.

use crate::float::Float;
use ndarray::linalg::{general_mat_mul, general_mat_vec_mul};
use ndarray::{ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};

/// Computes the sum of squares of every row in `rows`.
pub fn compute_squared_norms<F: Float>(
    rows: ArrayView2<F>,
    norms: &mut [F],
) -> Result<(), &'static str> {
    if rows.len_of(Axis(0)) != norms.len() {
        return Err("norms must have an entry for every row");
    }
    for (row, norm) in rows.rows().into_iter().zip(norms.iter_mut()) {
        let mut sum = F::ZERO;
        for v in row.iter() {
            sum += *v * *v;
        }
        *norm = sum;
    }
    Ok(())
}

/// Computes the squared distance between `centroid` and every row of
/// `samples`, storing the result in `distances`.
///
/// `centroid_norm` and `sample_norms` must hold the precomputed squared norms
/// (see [`compute_squared_norms`]).
pub fn compute_squared_distances<F: Float>(
    centroid: ArrayView1<F>,
    centroid_norm: F,
    samples: ArrayView2<F>,
    sample_norms: &[F],
    distances: &mut [F],
) -> Result<(), &'static str> {
    let n_samples = samples.len_of(Axis(0));
    if centroid.len() != samples.len_of(Axis(1)) {
        return Err("the centroid and the samples must have the same number of features");
    } else if sample_norms.len() != n_samples || distances.len() != n_samples {
        return Err("sample_norms and distances must have an entry for every sample");
    }

    distances.copy_from_slice(sample_norms);
    // distances = -2 * samples · centroid + distances
    let mut distance_view = ArrayViewMut1::from(&mut *distances);
    general_mat_vec_mul(
        F::from_f64(-2.0),
        &samples,
        &centroid,
        F::from_f64(1.0),
        &mut distance_view,
    );
    for d in distances.iter_mut() {
        *d = (*d + centroid_norm).clamp_nonnegative();
    }
    Ok(())
}

/// Replaces each entry of `closest` with the minimum of itself and the
/// corresponding entry of `distances`.
pub fn fold_min_distances<F: Float>(
    closest: &mut [F],
    distances: &[F],
) -> Result<(), &'static str> {
    if closest.len() != distances.len() {
        return Err("closest and distances must have the same length");
    }
    for (c, d) in closest.iter_mut().zip(distances.iter()) {
        *c = c.min_val(*d);
    }
    Ok(())
}

/// Commits a centroid to the closest-distance vector of a sample block.
///
/// `scratch` must have an entry per sample. It is overwritten with the
/// squared distances between `centroid` and each sample.
pub fn update_closest_distances<F: Float>(
    centroid: ArrayView1<F>,
    centroid_norm: F,
    samples: ArrayView2<F>,
    sample_norms: &[F],
    closest: &mut [F],
    scratch: &mut [F],
) -> Result<(), &'static str> {
    if closest.len() != sample_norms.len() {
        return Err("closest must have an entry for every sample");
    }
    compute_squared_distances(centroid, centroid_norm, samples, sample_norms, scratch)?;
    fold_min_distances(closest, scratch)
}

/// Sums the entries of a closest-distance vector (in `f64`)
pub fn sum_potential<F: Float>(closest: &[F]) -> f64 {
    let mut sum = 0.0;
    for c in closest {
        sum += c.to_f64();
    }
    sum
}

/// Computes the contribution of one sample block to the potential that each
/// candidate would produce if it were committed as the next centroid.
///
/// For candidate `c`, `potentials[c]` is overwritten with
/// `Σⱼ min(closest[j], ||candidate_c - sample_j||²)`. The minimum is
/// *tentative*: `closest` isn't modified, since the candidates compete with
/// each other.
///
/// The candidates are processed `candidate_block_rows` at a time, which
/// bounds the portion of `distance_matrix` that gets used to
/// `min(candidate_block_rows, n_candidates) * n_samples` elements.
#[allow(clippy::too_many_arguments)]
pub fn compute_candidate_potentials<F: Float>(
    candidates: ArrayView2<F>,
    candidate_norms: &[F],
    samples: ArrayView2<F>,
    sample_norms: &[F],
    closest: &[F],
    candidate_block_rows: usize,
    distance_matrix: &mut [F],
    potentials: &mut [f64],
) -> Result<(), &'static str> {
    let n_candidates = candidates.len_of(Axis(0));
    let n_samples = samples.len_of(Axis(0));

    if candidates.len_of(Axis(1)) != samples.len_of(Axis(1)) {
        return Err("the candidates and the samples must have the same number of features");
    } else if candidate_norms.len() != n_candidates || potentials.len() != n_candidates {
        return Err("candidate_norms and potentials must have an entry for every candidate");
    } else if sample_norms.len() != n_samples || closest.len() != n_samples {
        return Err("sample_norms and closest must have an entry for every sample");
    } else if candidate_block_rows == 0 {
        return Err("candidate_block_rows must be positive");
    } else if distance_matrix.len() < candidate_block_rows.min(n_candidates) * n_samples {
        return Err("distance_matrix is too small for a block of candidates");
    }

    let mut start = 0;
    while start < n_candidates {
        let stop = (start + candidate_block_rows).min(n_candidates);
        let block_len = stop - start;
        let candidate_block = candidates.slice_axis(Axis(0), (start..stop).into());

        let mut dist = ArrayViewMut2::from_shape(
            (block_len, n_samples),
            &mut distance_matrix[..block_len * n_samples],
        )
        .map_err(|_| "the distance matrix couldn't be shaped")?;

        // dist[i, j] = ||candidate_i||² + ||sample_j||²
        for (i, mut row) in dist.rows_mut().into_iter().enumerate() {
            let candidate_norm = candidate_norms[start + i];
            for (d, sample_norm) in row.iter_mut().zip(sample_norms.iter()) {
                *d = candidate_norm + *sample_norm;
            }
        }

        // dist += -2 * candidate_block · samplesᵀ
        general_mat_mul(
            F::from_f64(-2.0),
            &candidate_block,
            &samples.t(),
            F::from_f64(1.0),
            &mut dist,
        );

        for (i, row) in dist.rows().into_iter().enumerate() {
            let mut sum = 0.0;
            for (d, c) in row.iter().zip(closest.iter()) {
                sum += c.min_val(d.clamp_nonnegative()).to_f64();
            }
            potentials[start + i] = sum;
        }

        start = stop;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::misc::squared_diff_norm;
    use std::vec;
    use std::vec::Vec;

    #[rustfmt::skip]
    const SAMPLES: [f64; 12] = [
         1.0,  1.0,
         2.0,  2.0,
        -1.0, -2.0,
        -2.0, -1.0,
         0.0,  3.0,
         5.0, -4.0,
    ];

    fn samples() -> ArrayView2<'static, f64> {
        ArrayView2::from_shape((6, 2), &SAMPLES).unwrap()
    }

    fn norms_of(rows: ArrayView2<f64>) -> Vec<f64> {
        let mut norms = vec![0.0; rows.len_of(Axis(0))];
        compute_squared_norms(rows, &mut norms).unwrap();
        norms
    }

    #[test]
    fn squared_norms() {
        assert_eq!(norms_of(samples()), [2.0, 8.0, 5.0, 5.0, 9.0, 41.0]);

        let mut too_short = [0.0; 2];
        assert!(compute_squared_norms(samples(), &mut too_short).is_err());
    }

    #[test]
    fn distances_match_direct_formula() {
        let samples = samples();
        let norms = norms_of(samples);
        for c in 0..6 {
            let centroid = samples.row(c);
            let mut distances = [0.0; 6];
            compute_squared_distances(centroid, norms[c], samples, &norms, &mut distances)
                .unwrap();
            for (j, d) in distances.iter().enumerate() {
                assert_eq!(*d, squared_diff_norm(centroid, samples.row(j)));
            }
            // distance to self must be exactly zero for integer data
            assert_eq!(distances[c], 0.0);
        }
    }

    #[test]
    fn distances_shape_errors() {
        let samples = samples();
        let norms = norms_of(samples);
        let centroid = [0.0; 3];
        let mut distances = [0.0; 6];
        assert!(
            compute_squared_distances(
                ArrayView1::from(&centroid[..]),
                0.0,
                samples,
                &norms,
                &mut distances
            )
            .is_err()
        );
        let mut short = [0.0; 5];
        assert!(
            compute_squared_distances(samples.row(0), 2.0, samples, &norms, &mut short).is_err()
        );
    }

    #[test]
    fn commit_updates_closest() {
        let samples = samples();
        let norms = norms_of(samples);
        let mut closest = [f64::MAX; 6];
        let mut scratch = [0.0; 6];

        // the first commit replaces the sentinel entirely
        update_closest_distances(samples.row(0), norms[0], samples, &norms, &mut closest, &mut scratch)
            .unwrap();
        assert_eq!(closest, [0.0, 2.0, 13.0, 13.0, 5.0, 41.0]);
        assert_eq!(sum_potential(&closest), 74.0);

        update_closest_distances(samples.row(2), norms[2], samples, &norms, &mut closest, &mut scratch)
            .unwrap();
        assert_eq!(closest, [0.0, 2.0, 0.0, 2.0, 5.0, 40.0]);
        assert_eq!(sum_potential(&closest), 49.0);
    }

    #[test]
    fn fold_min() {
        let mut closest = [3.0_f32, f32::MAX, 0.0];
        fold_min_distances(&mut closest, &[4.0, 7.5, 1.0]).unwrap();
        assert_eq!(closest, [3.0, 7.5, 0.0]);

        assert!(fold_min_distances(&mut closest, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn candidate_potentials_are_tentative() {
        let samples = samples();
        let norms = norms_of(samples);
        let mut closest = [f64::MAX; 6];
        let mut scratch = [0.0; 6];
        update_closest_distances(samples.row(0), norms[0], samples, &norms, &mut closest, &mut scratch)
            .unwrap();
        let closest_before = closest;

        // candidates: rows 2, 5, 4 (in that order)
        #[rustfmt::skip]
        let candidate_buf = [
            -1.0, -2.0,
             5.0, -4.0,
             0.0,  3.0,
        ];
        let candidates = ArrayView2::from_shape((3, 2), &candidate_buf).unwrap();
        let candidate_norms = norms_of(candidates);

        // try several candidate block sizes. The result must not depend on it
        for candidate_block_rows in [1, 2, 3, 7] {
            let mut distance_matrix = vec![0.0; 3 * 6];
            let mut potentials = [0.0; 3];
            compute_candidate_potentials(
                candidates,
                &candidate_norms,
                samples,
                &norms,
                &closest,
                candidate_block_rows,
                &mut distance_matrix,
                &mut potentials,
            )
            .unwrap();

            // compute the reference answer directly
            for (c, candidate) in candidates.rows().into_iter().enumerate() {
                let expected: f64 = (0..6)
                    .map(|j| closest[j].min(squared_diff_norm(candidate, samples.row(j))))
                    .sum();
                assert_eq!(potentials[c], expected);
            }
            assert_eq!(potentials, [49.0, 33.0, 69.0]);
        }
        assert_eq!(closest, closest_before);
    }

    #[test]
    fn candidate_potentials_errors() {
        let samples = samples();
        let norms = norms_of(samples);
        let closest = [1.0; 6];
        let candidate_buf = [0.0; 4];
        let candidates = ArrayView2::from_shape((2, 2), &candidate_buf).unwrap();
        let candidate_norms = [0.0; 2];
        let mut potentials = [0.0; 2];

        // distance matrix too small for a block of 2 candidates
        let mut distance_matrix = [0.0; 11];
        assert!(
            compute_candidate_potentials(
                candidates,
                &candidate_norms,
                samples,
                &norms,
                &closest,
                2,
                &mut distance_matrix,
                &mut potentials,
            )
            .is_err()
        );

        // zero-sized candidate blocks
        let mut distance_matrix = [0.0; 12];
        assert!(
            compute_candidate_potentials(
                candidates,
                &candidate_norms,
                samples,
                &norms,
                &closest,
                0,
                &mut distance_matrix,
                &mut potentials,
            )
            .is_err()
        );
    }

    #[test]
    fn f32_samples() {
        let buf: Vec<f32> = SAMPLES.iter().map(|x| *x as f32).collect();
        let samples = ArrayView2::from_shape((6, 2), &buf).unwrap();
        let mut norms = [0.0_f32; 6];
        compute_squared_norms(samples, &mut norms).unwrap();
        let mut distances = [0.0_f32; 6];
        compute_squared_distances(samples.row(5), norms[5], samples, &norms, &mut distances)
            .unwrap();
        assert_eq!(distances, [41.0, 45.0, 40.0, 58.0, 74.0, 0.0]);
    }
}

//! Drives the Norm/Distance block kernels over a shard's sample matrix.
//!
//! Each function splits the local samples into blocks of
//! [`BlockSizePolicy::sample_block_rows`] rows and hands the blocks to an
//! [`Executor`]. Every block writes to its own chunk of an output buffer. Any
//! partial sums are combined *after* the executor returns, in block order,
//! which makes the results independent of the executor.
//!
//! None of these functions communicate. Combining the per-shard values is the
//! job of the caller.

use crate::Error;
use ndarray::{ArrayView1, ArrayView2, Axis};
use shardseed_nostd_internal::{
    BlockSizePolicy, Executor, Float, block_bounds, compute_candidate_potentials,
    compute_squared_norms, dot_product, n_blocks, sum_potential, update_closest_distances,
};

/// Computes the squared norm of every local sample
pub fn compute_local_norms<F: Float>(
    executor: &mut impl Executor,
    samples: ArrayView2<F>,
    block_sizes: &BlockSizePolicy,
    norms: &mut [F],
) -> Result<(), Error> {
    if norms.len() != samples.nrows() {
        return Err(Error::internal("norms must have an entry for every sample"));
    }
    let block_rows = block_sizes.sample_block_rows();
    let n_rows = samples.nrows();
    executor
        .drive_blocks(norms, block_rows, &|block_index, chunk: &mut [F]| {
            let rows = block_bounds(block_index, n_rows, block_rows);
            compute_squared_norms(samples.slice_axis(Axis(0), rows.into()), chunk)
        })
        .map_err(Error::internal)
}

/// Folds the distances between `centroid` and every local sample into
/// `closest` (elementwise minimum).
///
/// Returns this shard's contribution to the potential, i.e. the sum of the
/// updated `closest` vector (each block is summed separately and the block
/// sums are added in block order).
pub fn commit_centroid<F: Float>(
    executor: &mut impl Executor,
    centroid: ArrayView1<F>,
    samples: ArrayView2<F>,
    sample_norms: &[F],
    block_sizes: &BlockSizePolicy,
    closest: &mut [F],
) -> Result<f64, Error> {
    let n_rows = samples.nrows();
    if sample_norms.len() != n_rows || closest.len() != n_rows {
        return Err(Error::internal(
            "sample_norms and closest must have an entry for every sample",
        ));
    }
    let centroid_norm = dot_product(centroid, centroid);
    let block_rows = block_sizes.sample_block_rows();

    executor
        .drive_blocks(closest, block_rows, &|block_index, chunk: &mut [F]| {
            let rows = block_bounds(block_index, n_rows, block_rows);
            let mut scratch = vec![F::ZERO; chunk.len()];
            update_closest_distances(
                centroid,
                centroid_norm,
                samples.slice_axis(Axis(0), rows.clone().into()),
                &sample_norms[rows],
                chunk,
                &mut scratch,
            )
        })
        .map_err(Error::internal)?;

    Ok(local_potential(closest, block_sizes))
}

/// Sums a closest-distance vector, block by block
pub fn local_potential<F: Float>(closest: &[F], block_sizes: &BlockSizePolicy) -> f64 {
    let mut total = 0.0;
    for block in closest.chunks(block_sizes.sample_block_rows()) {
        total += sum_potential(block);
    }
    total
}

/// Computes this shard's contribution to the potential that each candidate
/// would produce if it were committed next.
///
/// `closest` isn't modified. `potentials` gets an entry per candidate.
#[allow(clippy::too_many_arguments)]
pub fn compute_local_candidate_potentials<F: Float>(
    executor: &mut impl Executor,
    candidates: ArrayView2<F>,
    candidate_norms: &[F],
    samples: ArrayView2<F>,
    sample_norms: &[F],
    closest: &[F],
    block_sizes: &BlockSizePolicy,
    potentials: &mut [f64],
) -> Result<(), Error> {
    let n_candidates = candidates.nrows();
    let n_rows = samples.nrows();
    if potentials.len() != n_candidates {
        return Err(Error::internal(
            "potentials must have an entry for every candidate",
        ));
    } else if n_candidates == 0 {
        return Ok(());
    } else if sample_norms.len() != n_rows || closest.len() != n_rows {
        return Err(Error::internal(
            "sample_norms and closest must have an entry for every sample",
        ));
    }

    let block_rows = block_sizes.sample_block_rows();
    let candidate_block_rows = block_sizes.candidate_block_rows();

    // partials[b * n_candidates + c] is the contribution of sample block b to
    // the potential of candidate c
    let mut partials = vec![0.0; n_blocks(n_rows, block_rows) * n_candidates];
    executor
        .drive_blocks(
            &mut partials,
            n_candidates,
            &|block_index, chunk: &mut [f64]| {
                let rows = block_bounds(block_index, n_rows, block_rows);
                let mut distance_matrix =
                    vec![F::ZERO; block_sizes.max_distance_matrix_len(n_candidates, rows.len())];
                compute_candidate_potentials(
                    candidates,
                    candidate_norms,
                    samples.slice_axis(Axis(0), rows.clone().into()),
                    &sample_norms[rows.clone()],
                    &closest[rows],
                    candidate_block_rows,
                    &mut distance_matrix,
                    chunk,
                )
            },
        )
        .map_err(Error::internal)?;

    potentials.fill(0.0);
    for block in partials.chunks_exact(n_candidates) {
        for (p, partial) in potentials.iter_mut().zip(block.iter()) {
            *p += *partial;
        }
    }
    Ok(())
}

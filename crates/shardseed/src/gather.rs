//! Replicates rows, identified by global index, on every shard.
//!
//! The owner of a row copies it into a buffer (widened to `f64`) and every
//! other shard zero-fills its buffer. From there, a row reaches every shard
//! either through a broadcast rooted at the owner, or through a
//! sum-allreduce (the zeros contributed by the non-owners leave the owner's
//! values untouched).
//!
//! A batch of rows is gathered with one of 2 strategies:
//! - narrow: the whole zero-filled batch is combined with a single allreduce
//! - wide: each row is gathered on its own
//!
//! Both strategies (and both single-row methods) leave identical rows on
//! every shard. The one subtlety is that a sum-allreduce turns `-0.0` into
//! `0.0`; this happens consistently on every shard.

use crate::Error;
use crate::boundary::BoundaryTable;
use crate::comm::{Communicator, ReduceOp};
use crate::config::{GatherPolicy, RowBroadcast};
use ndarray::{ArrayView2, ArrayViewMut1, ArrayViewMut2};
use shardseed_nostd_internal::Float;
use tracing::trace;

/// The strategy actually used for a batch (after resolving
/// [`GatherPolicy::Auto`])
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatherStrategy {
    Narrow,
    Wide,
}

impl GatherPolicy {
    /// Picks the strategy for a batch of `n_rows` rows with `n_features`
    /// features each
    ///
    /// [`GatherPolicy::Auto`] batches the rows when the payload is small, or
    /// when there are no more rows than features.
    pub fn resolve(&self, n_rows: usize, n_features: usize) -> GatherStrategy {
        match *self {
            GatherPolicy::Narrow => GatherStrategy::Narrow,
            GatherPolicy::Wide => GatherStrategy::Wide,
            GatherPolicy::Auto { max_batched_bytes } => {
                let payload = n_rows
                    .saturating_mul(n_features)
                    .saturating_mul(size_of::<f64>());
                if n_rows <= 1 || n_rows <= n_features || payload <= max_batched_bytes {
                    GatherStrategy::Narrow
                } else {
                    GatherStrategy::Wide
                }
            }
        }
    }
}

/// Locates the shard-local row that holds `global_index`
fn locate(boundaries: &BoundaryTable, global_index: u64) -> Result<(usize, usize), Error> {
    boundaries
        .to_local(global_index)
        .ok_or_else(|| Error::internal("a requested row index lies outside of [0, total_rows)"))
}

/// Copies row `global_index` into `buf` if the calling shard owns it,
/// otherwise zero-fills `buf`. Returns the owner's rank.
fn fill_if_owned<F: Float>(
    rank: usize,
    boundaries: &BoundaryTable,
    global_index: u64,
    samples: ArrayView2<F>,
    buf: &mut [f64],
) -> Result<usize, Error> {
    let (owner, local_index) = locate(boundaries, global_index)?;
    if owner == rank {
        let row = samples.row(local_index);
        for (dst, src) in buf.iter_mut().zip(row.iter()) {
            *dst = src.to_f64();
        }
    } else {
        buf.fill(0.0);
    }
    Ok(owner)
}

fn narrow_to<F: Float>(buf: &[f64], mut out: ArrayViewMut1<F>) {
    for (dst, src) in out.iter_mut().zip(buf.iter()) {
        *dst = F::from_f64(*src);
    }
}

/// Replicates a single row on every shard, writing it to `out`.
pub fn gather_row<F: Float>(
    comm: &impl Communicator,
    global_index: u64,
    boundaries: &BoundaryTable,
    samples: ArrayView2<F>,
    broadcast: RowBroadcast,
    out: ArrayViewMut1<F>,
) -> Result<(), Error> {
    if out.len() != samples.ncols() {
        return Err(Error::internal("out must hold a full row"));
    }
    let mut buf = vec![0.0; samples.ncols()];
    let owner = fill_if_owned(comm.rank(), boundaries, global_index, samples, &mut buf)?;
    if comm.rank_count() > 1 {
        match broadcast {
            RowBroadcast::Bcast => comm.bcast_f64(&mut buf, owner)?,
            RowBroadcast::AllreduceZeroFill => comm.allreduce_f64(&mut buf, ReduceOp::Sum)?,
        }
    }
    narrow_to(&buf, out);
    Ok(())
}

/// Replicates the rows at `global_indices` on every shard. Row `i` of `out`
/// receives the row at `global_indices[i]`.
///
/// Every shard must pass identical `global_indices`.
pub fn gather_rows<F: Float>(
    comm: &impl Communicator,
    global_indices: &[u64],
    boundaries: &BoundaryTable,
    samples: ArrayView2<F>,
    policy: GatherPolicy,
    broadcast: RowBroadcast,
    mut out: ArrayViewMut2<F>,
) -> Result<(), Error> {
    let n_features = samples.ncols();
    if out.nrows() != global_indices.len() || out.ncols() != n_features {
        return Err(Error::internal(
            "out must have a row per requested index and a column per feature",
        ));
    }

    let strategy = policy.resolve(global_indices.len(), n_features);
    trace!(
        n_rows = global_indices.len(),
        n_features,
        ?strategy,
        "gathering rows"
    );

    match strategy {
        GatherStrategy::Wide => {
            for (global_index, row) in global_indices.iter().zip(out.rows_mut()) {
                gather_row(comm, *global_index, boundaries, samples, broadcast, row)?;
            }
        }
        GatherStrategy::Narrow => {
            let mut buf = vec![0.0; global_indices.len() * n_features];
            for (global_index, chunk) in global_indices
                .iter()
                .zip(buf.chunks_exact_mut(n_features.max(1)))
            {
                fill_if_owned(comm.rank(), boundaries, *global_index, samples, chunk)?;
            }
            if comm.rank_count() > 1 {
                comm.allreduce_f64(&mut buf, ReduceOp::Sum)?;
            }
            for (chunk, row) in buf.chunks_exact(n_features.max(1)).zip(out.rows_mut()) {
                narrow_to(chunk, row);
            }
        }
    }
    Ok(())
}

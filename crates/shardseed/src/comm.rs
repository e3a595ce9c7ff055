//! Defines the collective-communication abstraction.
//!
//! The seeding algorithm is SPMD: every shard runs the same sequence of
//! operations and every interaction between shards happens through one of the
//! collectives declared by [`Communicator`]. All collectives are blocking. A
//! method only returns once its result is available, so the result of a
//! collective is never read before every rank has contributed.
//!
//! We only declare the operations on `f64` and `u64` buffers. The seeding
//! algorithm exchanges row-indices, row-counts, and partial sums (which are
//! always accumulated in `f64`). Rows of `f32` samples are widened to `f64`
//! for transport; the round-trip is exact.
//!
//! Every rank must issue the same collectives, in the same order, with
//! compatible arguments. Implementations are encouraged (but not required)
//! to detect violations and report them as errors.

use crate::Error;

/// The operation applied by an allreduce
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

impl ReduceOp {
    /// combine `other` into `acc`
    #[inline]
    pub(crate) fn combine_f64(&self, acc: &mut f64, other: f64) {
        match self {
            ReduceOp::Sum => *acc += other,
            ReduceOp::Min => *acc = acc.min(other),
            ReduceOp::Max => *acc = acc.max(other),
        }
    }

    /// combine `other` into `acc`
    ///
    /// Sums saturate rather than wrap (the seeding algorithm only sums
    /// row-indices where a single rank contributes a non-zero value).
    #[inline]
    pub(crate) fn combine_u64(&self, acc: &mut u64, other: u64) {
        match self {
            ReduceOp::Sum => *acc = acc.saturating_add(other),
            ReduceOp::Min => *acc = (*acc).min(other),
            ReduceOp::Max => *acc = (*acc).max(other),
        }
    }
}

/// The MPI-like collective operations that the seeding algorithm relies on.
///
/// Implementations must combine contributions in rank order, so that every
/// rank receives bitwise identical results from a reduction.
pub trait Communicator {
    /// the rank of the calling shard, in `[0, rank_count)`
    fn rank(&self) -> usize;

    /// the number of participating shards
    fn rank_count(&self) -> usize;

    /// blocks until every rank has called `barrier`
    fn barrier(&self) -> Result<(), Error>;

    /// in-place element-wise reduction of `buf` across all ranks
    fn allreduce_f64(&self, buf: &mut [f64], op: ReduceOp) -> Result<(), Error>;

    /// in-place element-wise reduction of `buf` across all ranks
    fn allreduce_u64(&self, buf: &mut [u64], op: ReduceOp) -> Result<(), Error>;

    /// Every rank contributes `local` (all ranks must use the same length).
    /// Afterwards, `out` holds the concatenation of every contribution in
    /// rank order. `out.len()` must be `rank_count() * local.len()`
    fn allgather_f64(&self, local: &[f64], out: &mut [f64]) -> Result<(), Error>;

    /// The `u64` counterpart to [`Communicator::allgather_f64`]
    fn allgather_u64(&self, local: &[u64], out: &mut [u64]) -> Result<(), Error>;

    /// Like [`Communicator::allgather_f64`], except that rank `r`
    /// contributes `counts[r]` elements. `out.len()` must equal the sum of
    /// `counts`.
    fn allgatherv_f64(&self, local: &[f64], counts: &[usize], out: &mut [f64])
    -> Result<(), Error>;

    /// Overwrites `buf` on every rank with the contents of `buf` on `root`
    fn bcast_f64(&self, buf: &mut [f64], root: usize) -> Result<(), Error>;

    /// Sends `buf` to `dest` and replaces it with the buffer sent by `source`.
    ///
    /// Every rank participates (typically in a ring, where `dest` is the next
    /// rank and `source` is the previous rank).
    fn sendrecv_replace_f64(&self, buf: &mut [f64], dest: usize, source: usize)
    -> Result<(), Error>;
}

/// The trivial communicator used when all of the data lives on one shard.
///
/// Every collective reduces to the identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleShard;

impl SingleShard {
    fn check(&self, condition: bool, what: &str) -> Result<(), Error> {
        if condition {
            Ok(())
        } else {
            Err(Error::communication(0, what.to_owned()))
        }
    }
}

impl Communicator for SingleShard {
    fn rank(&self) -> usize {
        0
    }

    fn rank_count(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<(), Error> {
        Ok(())
    }

    fn allreduce_f64(&self, _buf: &mut [f64], _op: ReduceOp) -> Result<(), Error> {
        Ok(())
    }

    fn allreduce_u64(&self, _buf: &mut [u64], _op: ReduceOp) -> Result<(), Error> {
        Ok(())
    }

    fn allgather_f64(&self, local: &[f64], out: &mut [f64]) -> Result<(), Error> {
        self.check(local.len() == out.len(), "allgather output has the wrong length")?;
        out.copy_from_slice(local);
        Ok(())
    }

    fn allgather_u64(&self, local: &[u64], out: &mut [u64]) -> Result<(), Error> {
        self.check(local.len() == out.len(), "allgather output has the wrong length")?;
        out.copy_from_slice(local);
        Ok(())
    }

    fn allgatherv_f64(
        &self,
        local: &[f64],
        counts: &[usize],
        out: &mut [f64],
    ) -> Result<(), Error> {
        self.check(
            counts == [local.len()] && out.len() == local.len(),
            "allgatherv counts are inconsistent with the buffers",
        )?;
        out.copy_from_slice(local);
        Ok(())
    }

    fn bcast_f64(&self, _buf: &mut [f64], root: usize) -> Result<(), Error> {
        self.check(root == 0, "bcast root is not a valid rank")
    }

    fn sendrecv_replace_f64(
        &self,
        _buf: &mut [f64],
        dest: usize,
        source: usize,
    ) -> Result<(), Error> {
        self.check(dest == 0 && source == 0, "sendrecv peer is not a valid rank")
    }
}

//! Implements the weighted candidate sampler.
//!
//! Candidates are drawn with a probability proportional to their entry in
//! the closest-distance vector. The rows live on different shards, so the
//! search happens in 2 stages:
//! 1. each trial value is located within a "weight-space" boundary table,
//!    built from every shard's total mass, which identifies the shard;
//! 2. the owning shard locates the value (minus the mass of the preceding
//!    shards) within its own cumulative sum, and converts the local row to
//!    a global index.
//!
//! The owner writes the global index and every other shard writes 0, so a
//! single sum-allreduce distributes the indices.
//!
//! # Random numbers
//! Every shard holds its own copy of a [`SharedRandomStream`], seeded
//! identically and advanced identically. This means every shard draws the
//! same trial values without any communication. Consequently, the stream of
//! random numbers doesn't depend on the number of shards.
//!
//! # Edge values
//! A trial value selects the first row whose cumulative mass is greater than
//! or equal to the value (a left-aligned search). A value equal to the total
//! mass of a shard therefore resolves to that shard's last row with mass,
//! never to the next shard. Rows without mass are never selected by an
//! in-range value. Values that land beyond the final cumulative value (this
//! happens because the potential and the cumulative sums are summed in
//! different orders) resolve to the last row with positive mass.
//! See [`shardseed_nostd_internal::CumulativeWeights::locate_clamped`].

use crate::Error;
use crate::boundary::BoundaryTable;
use crate::comm::{Communicator, ReduceOp};
use crate::error::try_filled_vec;
use rand::Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;
use shardseed_nostd_internal::{CumulativeWeights, Float, fill_cumulative};

/// The random stream shared (by construction) between all shards.
///
/// Every draw must be made by every shard, in the same order.
#[derive(Clone, Debug)]
pub struct SharedRandomStream {
    rng: Xoshiro256PlusPlus,
}

impl SharedRandomStream {
    pub fn new(seed: u64) -> Self {
        SharedRandomStream {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    /// draws a global row index uniformly from `[0, total_rows)`
    pub fn uniform_index(&mut self, total_rows: u64) -> Result<u64, Error> {
        if total_rows == 0 {
            return Err(Error::internal("can't draw a row index without any rows"));
        }
        Ok(self.rng.random_range(0..total_rows))
    }

    /// fills `out` with uniform draws from `[0, potential)`
    pub fn trial_values(&mut self, potential: f64, out: &mut [f64]) {
        for v in out.iter_mut() {
            let u: f64 = self.rng.random();
            *v = u * potential;
        }
    }
}

/// Draws candidate rows with a probability proportional to their weight.
///
/// The type owns the scratch buffers used during sampling, so that they can
/// be reused from one iteration to the next.
pub struct CandidateSampler {
    trial_values: Vec<f64>,
    cumulative: Vec<f64>,
    shard_totals: Vec<f64>,
    shard_cumulative: Vec<f64>,
}

impl CandidateSampler {
    pub fn new(
        trial_count: usize,
        local_row_count: usize,
        rank_count: usize,
    ) -> Result<Self, Error> {
        Ok(CandidateSampler {
            trial_values: try_filled_vec(trial_count, 0.0, "the trial values")?,
            cumulative: try_filled_vec(local_row_count, 0.0, "the cumulative weights")?,
            shard_totals: vec![0.0; rank_count],
            shard_cumulative: vec![0.0; rank_count],
        })
    }

    pub fn trial_count(&self) -> usize {
        self.trial_values.len()
    }

    /// Draws `candidates.len()` global row indices (which must match the
    /// trial count), weighted by the local entries of `closest` on every
    /// shard.
    ///
    /// `potential` must be the global sum of the weights (it scales the
    /// trial values). It must be positive and finite.
    pub fn sample_candidates<F: Float>(
        &mut self,
        comm: &impl Communicator,
        rng: &mut SharedRandomStream,
        potential: f64,
        closest: &[F],
        boundaries: &BoundaryTable,
        candidates: &mut [u64],
    ) -> Result<(), Error> {
        if candidates.len() != self.trial_values.len() {
            return Err(Error::internal("candidates must have an entry per trial"));
        } else if closest.len() != self.cumulative.len()
            || boundaries.rank_count() != comm.rank_count()
        {
            return Err(Error::internal(
                "the sampler was built for a different shard layout",
            ));
        } else if !(potential.is_finite() && potential > 0.0) {
            return Err(Error::internal("the potential must be positive and finite"));
        }

        rng.trial_values(potential, &mut self.trial_values);
        self.locate_trial_values(comm, closest, boundaries, candidates)
    }

    /// Converts the current trial values into global row indices.
    fn locate_trial_values<F: Float>(
        &mut self,
        comm: &impl Communicator,
        closest: &[F],
        boundaries: &BoundaryTable,
        candidates: &mut [u64],
    ) -> Result<(), Error> {
        let rank = comm.rank();
        fill_cumulative(closest, &mut self.cumulative).map_err(Error::internal)?;
        let local_weights = CumulativeWeights::new(&self.cumulative).map_err(Error::internal)?;
        let first_local_index = boundaries.local_range(rank).start;

        if comm.rank_count() == 1 {
            for (candidate, value) in candidates.iter_mut().zip(self.trial_values.iter()) {
                *candidate = first_local_index + local_weights.locate_clamped(*value) as u64;
            }
            return Ok(());
        }

        comm.allgather_f64(&[local_weights.total()], &mut self.shard_totals)?;
        fill_cumulative(&self.shard_totals, &mut self.shard_cumulative)
            .map_err(Error::internal)?;
        let shard_weights =
            CumulativeWeights::new(&self.shard_cumulative).map_err(Error::internal)?;

        for (candidate, value) in candidates.iter_mut().zip(self.trial_values.iter()) {
            let owner = shard_weights.locate_clamped(*value);
            *candidate = if owner == rank {
                let local_value = *value - shard_weights.offset(owner);
                first_local_index + local_weights.locate_clamped(local_value) as u64
            } else {
                0
            };
        }
        comm.allreduce_u64(candidates, ReduceOp::Sum)
    }
}

/// Fills `candidates` with global row indices drawn uniformly from
/// `[0, total_rows)`.
///
/// This is the fallback used when every row already coincides with a
/// centroid (i.e. the potential is 0). No communication is needed since the
/// stream is shared.
pub fn sample_uniform(
    rng: &mut SharedRandomStream,
    total_rows: u64,
    candidates: &mut [u64],
) -> Result<(), Error> {
    for candidate in candidates.iter_mut() {
        *candidate = rng.uniform_index(total_rows)?;
    }
    Ok(())
}

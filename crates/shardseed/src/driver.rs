//! The greedy k-means++ seeding driver.
//!
//! Every shard runs [`greedy_seeding`] with its own slice of the samples.
//! The driver walks through the following stages:
//!
//! ```text
//! INIT -> FIRST_CENTROID -> {SAMPLE -> GATHER -> SCORE -> COMMIT}* -> DONE
//! ```
//!
//! - INIT: build the boundary table, validate the inputs (on collectively
//!   exchanged values, so every shard agrees on the verdict), and allocate
//!   the closest-distance vector, the centroid matrix, and the sample norms.
//! - FIRST_CENTROID: draw a global row uniformly, replicate it on every
//!   shard, and commit it.
//! - SAMPLE: draw `trial_count` candidate rows, weighted by the
//!   closest-distance vector.
//! - GATHER: replicate the candidate rows on every shard.
//! - SCORE: compute the potential that each candidate would produce, without
//!   modifying the closest-distance vector. The candidate with the smallest
//!   potential wins (ties go to the lowest candidate index).
//! - COMMIT: append the winner to the centroids and fold its distances into
//!   the closest-distance vector.
//!
//! All state that changes during a run is owned by a single `SeedingState`
//! value. The samples are only ever borrowed.
//!
//! # Failures
//! Any error (invalid inputs, failed collectives, non-finite potentials)
//! aborts the whole run. A partially filled set of centroids is never
//! returned.

use crate::boundary::BoundaryTable;
use crate::comm::{Communicator, ReduceOp};
use crate::config::{RuntimeSpec, SeedingParams};
use crate::engine::{commit_centroid, compute_local_candidate_potentials, compute_local_norms};
use crate::error::try_filled_vec;
use crate::gather::{gather_row, gather_rows};
use crate::sampler::{CandidateSampler, SharedRandomStream, sample_uniform};
use crate::{Error, SerialExecutor};
use ndarray::{Array2, ArrayView2};
use shardseed_nostd_internal::{Executor, Float};
use tracing::{debug, info, trace};

/// The result of a seeding run (identical on every shard)
#[derive(Clone, Debug, PartialEq)]
pub struct SeedingOutput<F> {
    centroids: Array2<F>,
    chosen_indices: Vec<u64>,
    potentials: Vec<f64>,
}

impl<F: Float> SeedingOutput<F> {
    /// The `cluster_count x feature_count` centroid matrix
    pub fn centroids(&self) -> ArrayView2<'_, F> {
        self.centroids.view()
    }

    /// The global row index of each centroid
    pub fn chosen_indices(&self) -> &[u64] {
        &self.chosen_indices
    }

    /// `potentials()[i]` is the potential after committing centroid `i`
    pub fn potentials(&self) -> &[f64] {
        &self.potentials
    }

    /// The potential after committing every centroid
    pub fn final_potential(&self) -> f64 {
        // a run always commits at least 1 centroid
        self.potentials[self.potentials.len() - 1]
    }

    pub fn into_centroids(self) -> Array2<F> {
        self.centroids
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    FirstCentroid,
    Sample,
    Gather,
    Score,
    Commit,
    Done,
}

/// Everything that a single seeding run owns
struct SeedingState<'a, 's, F: Float, C: Communicator, E: Executor> {
    comm: &'a C,
    executor: &'a mut E,
    samples: ArrayView2<'s, F>,
    runtime: &'a RuntimeSpec,
    boundaries: BoundaryTable,
    rng: SharedRandomStream,
    sampler: CandidateSampler,

    sample_norms: Vec<F>,
    closest: Vec<F>,

    centroids: Array2<F>,
    chosen_indices: Vec<u64>,
    potentials: Vec<f64>,
    // the current (global) potential
    potential: f64,

    // per-iteration candidate buffers
    candidate_indices: Vec<u64>,
    candidates: Array2<F>,
    candidate_norms: Vec<F>,
    candidate_potentials: Vec<f64>,
    best_candidate: usize,
}

/// Checks that every rank has the same (non-zero) number of features
fn check_feature_counts(comm: &impl Communicator, n_features: usize) -> Result<(), Error> {
    let mut feature_counts = vec![0_u64; comm.rank_count()];
    if comm.rank_count() == 1 {
        feature_counts[0] = n_features as u64;
    } else {
        comm.allgather_u64(&[n_features as u64], &mut feature_counts)?;
    }
    let expected = feature_counts[0];
    if expected == 0 {
        return Err(Error::feature_count(0, 0, 0));
    }
    match feature_counts.iter().position(|count| *count != expected) {
        Some(rank) => Err(Error::feature_count(rank, expected, feature_counts[rank])),
        None => Ok(()),
    }
}

impl<'a, 's, F: Float, C: Communicator, E: Executor> SeedingState<'a, 's, F, C, E> {
    /// the INIT stage
    fn init(
        comm: &'a C,
        executor: &'a mut E,
        samples: ArrayView2<'s, F>,
        params: &SeedingParams,
        runtime: &'a RuntimeSpec,
    ) -> Result<Self, Error> {
        let (n_local, n_features) = samples.dim();
        let boundaries = BoundaryTable::compute_boundaries(comm, n_local)?;
        check_feature_counts(comm, n_features)?;

        let cluster_count = params.cluster_count();
        let total_rows = boundaries.total_rows();
        if cluster_count as u64 > total_rows {
            return Err(Error::cluster_count(cluster_count as i64, Some(total_rows)));
        }
        let trial_count = params.trial_count().resolve(cluster_count);
        // the trial count is the same everywhere, so these fail everywhere
        // when they fail because of the trial count
        let candidate_len = trial_count
            .checked_mul(n_features)
            .ok_or_else(|| Error::allocation("the candidate rows", None))?;
        let candidates = Array2::from_shape_vec(
            (trial_count, n_features),
            try_filled_vec(candidate_len, F::ZERO, "the candidate rows")?,
        )
        .map_err(|_| Error::internal("the candidate rows have the wrong shape"))?;
        let sampler = CandidateSampler::new(trial_count, n_local, comm.rank_count())?;

        let mut sample_norms = vec![F::ZERO; n_local];
        compute_local_norms(executor, samples, &runtime.block_sizes, &mut sample_norms)?;

        Ok(SeedingState {
            comm,
            executor,
            samples,
            runtime,
            boundaries,
            rng: SharedRandomStream::new(params.random_seed()),
            sampler,
            sample_norms,
            closest: vec![F::MAX_VALUE; n_local],
            centroids: Array2::from_elem((cluster_count, n_features), F::MAX_VALUE),
            chosen_indices: Vec::with_capacity(cluster_count),
            potentials: Vec::with_capacity(cluster_count),
            potential: 0.0,
            candidate_indices: try_filled_vec(trial_count, 0, "the candidate indices")?,
            candidates,
            candidate_norms: try_filled_vec(trial_count, F::ZERO, "the candidate norms")?,
            candidate_potentials: try_filled_vec(trial_count, 0.0, "the candidate potentials")?,
            best_candidate: 0,
        })
    }

    fn n_committed(&self) -> usize {
        self.chosen_indices.len()
    }

    fn stage_after_commit(&self) -> Stage {
        if self.n_committed() == self.centroids.nrows() {
            Stage::Done
        } else {
            Stage::Sample
        }
    }

    fn check_finite(&self, value: f64) -> Result<(), Error> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(Error::non_finite_potential(self.n_committed(), value))
        }
    }

    /// Folds centroid `slot` into the closest-distance vector and updates
    /// the global potential.
    fn commit_slot(&mut self, slot: usize, global_index: u64) -> Result<(), Error> {
        let mut potential = [commit_centroid(
            self.executor,
            self.centroids.row(slot),
            self.samples,
            &self.sample_norms,
            &self.runtime.block_sizes,
            &mut self.closest,
        )?];
        if self.comm.rank_count() > 1 {
            self.comm.allreduce_f64(&mut potential, ReduceOp::Sum)?;
        }
        self.potential = potential[0];
        self.chosen_indices.push(global_index);
        self.potentials.push(self.potential);
        self.check_finite(self.potential)
    }

    /// the FIRST_CENTROID stage
    fn first_centroid(&mut self) -> Result<(), Error> {
        let global_index = self.rng.uniform_index(self.boundaries.total_rows())?;
        gather_row(
            self.comm,
            global_index,
            &self.boundaries,
            self.samples,
            self.runtime.broadcast,
            self.centroids.row_mut(0),
        )?;
        self.commit_slot(0, global_index)?;
        debug!(
            rank = self.comm.rank(),
            global_index,
            potential = self.potential,
            "committed the first centroid"
        );
        Ok(())
    }

    /// the SAMPLE stage
    fn sample(&mut self) -> Result<(), Error> {
        if self.potential > 0.0 {
            self.sampler.sample_candidates(
                self.comm,
                &mut self.rng,
                self.potential,
                &self.closest,
                &self.boundaries,
                &mut self.candidate_indices,
            )
        } else {
            // every row coincides with a centroid
            debug!(
                rank = self.comm.rank(),
                n_centroids = self.n_committed(),
                "the potential is zero, drawing candidates uniformly"
            );
            sample_uniform(
                &mut self.rng,
                self.boundaries.total_rows(),
                &mut self.candidate_indices,
            )
        }
    }

    /// the GATHER stage
    fn gather(&mut self) -> Result<(), Error> {
        gather_rows(
            self.comm,
            &self.candidate_indices,
            &self.boundaries,
            self.samples,
            self.runtime.gather,
            self.runtime.broadcast,
            self.candidates.view_mut(),
        )?;
        compute_local_norms(
            self.executor,
            self.candidates.view(),
            &self.runtime.block_sizes,
            &mut self.candidate_norms,
        )
    }

    /// the SCORE stage
    fn score(&mut self) -> Result<(), Error> {
        compute_local_candidate_potentials(
            self.executor,
            self.candidates.view(),
            &self.candidate_norms,
            self.samples,
            &self.sample_norms,
            &self.closest,
            &self.runtime.block_sizes,
            &mut self.candidate_potentials,
        )?;
        if self.comm.rank_count() > 1 {
            self.comm
                .allreduce_f64(&mut self.candidate_potentials, ReduceOp::Sum)?;
        }

        let mut best = 0;
        for (i, p) in self.candidate_potentials.iter().enumerate() {
            self.check_finite(*p)?;
            // strict comparison, so ties go to the lowest index
            if *p < self.candidate_potentials[best] {
                best = i;
            }
        }
        self.best_candidate = best;
        Ok(())
    }

    /// the COMMIT stage
    fn commit(&mut self) -> Result<(), Error> {
        let slot = self.n_committed();
        let best = self.best_candidate;
        self.centroids
            .row_mut(slot)
            .assign(&self.candidates.row(best));
        let global_index = self.candidate_indices[best];
        self.commit_slot(slot, global_index)?;
        debug!(
            rank = self.comm.rank(),
            iteration = slot,
            global_index,
            scored_potential = self.candidate_potentials[best],
            potential = self.potential,
            "committed a centroid"
        );
        Ok(())
    }

    fn finish(self) -> SeedingOutput<F> {
        SeedingOutput {
            centroids: self.centroids,
            chosen_indices: self.chosen_indices,
            potentials: self.potentials,
        }
    }
}

/// Chooses `params.cluster_count()` initial centroids from samples that are
/// sharded across the ranks of `comm`, using greedy k-means++.
///
/// Every rank must call this function with its own `samples` and identical
/// `params` and `runtime`. On success, every rank receives bitwise identical
/// output. Given the same seed, the result doesn't depend on the executor.
pub fn greedy_seeding<F, C, E>(
    comm: &C,
    executor: &mut E,
    samples: ArrayView2<F>,
    params: &SeedingParams,
    runtime: &RuntimeSpec,
) -> Result<SeedingOutput<F>, Error>
where
    F: Float,
    C: Communicator,
    E: Executor,
{
    let rank = comm.rank();
    let mut state = SeedingState::init(comm, executor, samples, params, runtime)?;
    info!(
        rank,
        rank_count = comm.rank_count(),
        cluster_count = params.cluster_count(),
        trial_count = state.sampler.trial_count(),
        total_rows = state.boundaries.total_rows(),
        "starting greedy seeding"
    );

    let mut stage = Stage::FirstCentroid;
    while stage != Stage::Done {
        trace!(rank, ?stage, n_centroids = state.n_committed(), "entering stage");
        stage = match stage {
            Stage::FirstCentroid => {
                state.first_centroid()?;
                state.stage_after_commit()
            }
            Stage::Sample => {
                state.sample()?;
                Stage::Gather
            }
            Stage::Gather => {
                state.gather()?;
                Stage::Score
            }
            Stage::Score => {
                state.score()?;
                Stage::Commit
            }
            Stage::Commit => {
                state.commit()?;
                state.stage_after_commit()
            }
            Stage::Done => Stage::Done,
        };
    }

    let output = state.finish();
    info!(
        rank,
        final_potential = output.final_potential(),
        "finished greedy seeding"
    );
    Ok(output)
}

/// [`greedy_seeding`] with the [`SerialExecutor`] and the default
/// [`RuntimeSpec`]
pub fn seed_centroids<F: Float>(
    comm: &impl Communicator,
    samples: ArrayView2<F>,
    params: &SeedingParams,
) -> Result<SeedingOutput<F>, Error> {
    greedy_seeding(
        comm,
        &mut SerialExecutor,
        samples,
        params,
        &RuntimeSpec::default(),
    )
}

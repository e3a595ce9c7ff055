//! The numerical core of the distributed k-means++ seeding machinery.
//!
//! This crate doesn't require the standard library. It holds everything that
//! operates on a single shard's memory:
//! - row-index boundary tables (which rank owns which global row),
//! - weight-space bins used for sampling rows proportionally to a weight,
//! - block decomposition of the sample matrix,
//! - the Norm/Distance block kernels,
//! - the [`Executor`] trait that drives per-block work.
//!
//! Anything that needs to talk to other shards (or to allocate) lives in the
//! `shardseed` crate.
//!
//! At the moment, errors are reported as `&'static str`. The `shardseed`
//! crate wraps them in its own error type.

#![no_std]
mod bins;
mod blocks;
mod boundary;
mod distance;
mod float;
mod misc;
mod parallel;

pub use bins::{CumulativeWeights, fill_cumulative};
pub use blocks::{
    BlockSizePolicy, DEFAULT_CANDIDATE_BLOCK_ROWS, DEFAULT_SAMPLE_BLOCK_ROWS, block_bounds,
    n_blocks,
};
pub use boundary::{fill_boundaries, find_owning_shard, validate_boundaries};
pub use distance::{
    compute_candidate_potentials, compute_squared_distances, compute_squared_norms,
    fold_min_distances, sum_potential, update_closest_distances,
};
pub use float::Float;
pub use misc::{dot_product, squared_diff_norm};
pub use parallel::Executor;

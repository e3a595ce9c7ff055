/*!
Provides distributed greedy k-means++ seeding: choosing well-separated
initial centroids for k-means when the samples are sharded across several
participants (ranks), each of which only sees its own rows.

<div class="warning">

This crate is still in early development.

</div>

# High-Level: Greedy k-means++

k-means++ picks the first centroid uniformly at random and every subsequent
centroid with a probability proportional to the squared distance between a
row and its nearest centroid (the sum of those distances is the
"potential"). The greedy variant draws several candidates per centroid and
keeps the one that lowers the potential the most.

In the distributed setting, every rank runs the same sequence of steps and
the ranks interact exclusively through the collectives of a
[`Communicator`]. Every rank ends up with bitwise identical centroids.

# User Guide

```
use ndarray::array;
use shardseed::{SeedingParamsBuilder, SingleShard, seed_centroids};

let samples = array![[1.0, 1.0], [2.0, 2.0], [-1.0, -1.0], [-2.0, -2.0]];
let params = SeedingParamsBuilder::new()
    .cluster_count(2)
    .random_seed(7)
    .build()
    .unwrap();
let output = seed_centroids(&SingleShard, samples.view(), &params).unwrap();
assert_eq!(output.centroids().dim(), (2, 2));
```

To run with real shards, implement [`Communicator`] for your transport (or use
[`LocalCommunicator`] to run each rank on a thread) and call
[`greedy_seeding`] on every rank.

# Developer Guide

See the crate-level documentation for [`shardseed_nostd_internal`].

*/

#![deny(rustdoc::broken_intra_doc_links)]

// inform build-system of the crates in this package
mod boundary;
mod comm;
mod comm_local;
mod config;
mod driver;
mod engine;
mod error;
mod gather;
mod parallel_serial;
mod parallel_threads;
mod sampler;

// pull in symbols that visible outside of the package
pub use boundary::BoundaryTable;
pub use comm::{Communicator, ReduceOp, SingleShard};
pub use comm_local::LocalCommunicator;
pub use config::{
    DEFAULT_MAX_BATCHED_BYTES, GatherPolicy, RowBroadcast, RuntimeSpec, SeedingParams,
    SeedingParamsBuilder, TrialCount,
};
pub use driver::{SeedingOutput, greedy_seeding, seed_centroids};
pub use engine::{
    commit_centroid, compute_local_candidate_potentials, compute_local_norms, local_potential,
};
pub use error::Error;
pub use gather::{GatherStrategy, gather_row, gather_rows};
pub use parallel_serial::SerialExecutor;
pub use parallel_threads::ThreadedExecutor;
pub use sampler::{CandidateSampler, SharedRandomStream, sample_uniform};
pub use shardseed_nostd_internal::{
    BlockSizePolicy, CumulativeWeights, DEFAULT_CANDIDATE_BLOCK_ROWS, DEFAULT_SAMPLE_BLOCK_ROWS,
    Executor, Float, squared_diff_norm,
};

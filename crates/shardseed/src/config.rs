//! Configuration of a seeding run.
//!
//! We split configuration into 2 parts:
//! 1. [`SeedingParams`] describe *what* gets computed. Two runs with the
//!    same parameters, the same data, and the same sharding produce
//!    identical centroids.
//! 2. [`RuntimeSpec`] describes *how* it gets computed (block sizes, how
//!    rows are moved between shards). These settings don't have a
//!    meaningful impact on the output: results are mathematically
//!    consistent, but not necessarily bitwise identical, across settings.
//!
//! The gather and broadcast strategies can also be selected by name (e.g.
//! from a config file or a python binding), see [`GatherPolicy::from_name`]
//! and [`RowBroadcast::from_name`].

use crate::Error;
use shardseed_nostd_internal::BlockSizePolicy;
use std::{collections::HashMap, num::NonZeroUsize, sync::LazyLock};

/// The number of candidates evaluated per centroid after the first
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrialCount {
    /// `2 + floor(ln(cluster_count))`
    Auto,
    Fixed(NonZeroUsize),
}

impl TrialCount {
    /// Interprets the raw integer convention, where `-1` requests the
    /// default and any positive value is used directly
    pub fn from_raw(value: i64) -> Result<Self, Error> {
        if value == -1 {
            Ok(TrialCount::Auto)
        } else {
            usize::try_from(value)
                .ok()
                .and_then(NonZeroUsize::new)
                .map(TrialCount::Fixed)
                .ok_or_else(|| Error::trial_count(value))
        }
    }

    /// The number of trials to draw when seeding `cluster_count` centroids
    pub fn resolve(&self, cluster_count: usize) -> usize {
        match self {
            TrialCount::Auto => 2 + (cluster_count.max(1) as f64).ln().floor() as usize,
            TrialCount::Fixed(n) => n.get(),
        }
    }
}

/// Parameters that determine the result of a seeding run.
///
/// Construct with [`SeedingParamsBuilder`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedingParams {
    cluster_count: usize,
    trial_count: TrialCount,
    random_seed: u64,
}

impl SeedingParams {
    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    pub fn trial_count(&self) -> TrialCount {
        self.trial_count
    }

    pub fn random_seed(&self) -> u64 {
        self.random_seed
    }
}

/// Builds [`SeedingParams`].
///
/// ```
/// use shardseed::SeedingParamsBuilder;
/// let params = SeedingParamsBuilder::new()
///     .cluster_count(8)
///     .trial_count(-1)
///     .random_seed(42)
///     .build()
///     .unwrap();
/// assert_eq!(params.cluster_count(), 8);
/// ```
#[derive(Clone, Debug)]
pub struct SeedingParamsBuilder {
    cluster_count: Option<i64>,
    trial_count: i64,
    random_seed: u64,
}

impl Default for SeedingParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SeedingParamsBuilder {
    pub fn new() -> Self {
        SeedingParamsBuilder {
            cluster_count: None,
            trial_count: -1,
            random_seed: 0,
        }
    }

    /// The number of centroids to choose (required)
    pub fn cluster_count(&mut self, cluster_count: i64) -> &mut Self {
        self.cluster_count = Some(cluster_count);
        self
    }

    /// The number of candidates per centroid, or `-1` (the default) for
    /// `2 + floor(ln(cluster_count))`
    pub fn trial_count(&mut self, trial_count: i64) -> &mut Self {
        self.trial_count = trial_count;
        self
    }

    pub fn random_seed(&mut self, random_seed: u64) -> &mut Self {
        self.random_seed = random_seed;
        self
    }

    /// Validates the parameters.
    ///
    /// The upper limit on the cluster count (the total number of rows) can
    /// only be checked once the data is known.
    pub fn build(&self) -> Result<SeedingParams, Error> {
        let Some(raw) = self.cluster_count else {
            return Err(Error::cluster_count_missing());
        };
        let cluster_count = match usize::try_from(raw) {
            Ok(v) if v > 0 => v,
            _ => return Err(Error::cluster_count(raw, None)),
        };
        Ok(SeedingParams {
            cluster_count,
            trial_count: TrialCount::from_raw(self.trial_count)?,
            random_seed: self.random_seed,
        })
    }
}

/// The default payload size (in bytes) below which [`GatherPolicy::Auto`]
/// moves a batch of rows with a single collective.
pub const DEFAULT_MAX_BATCHED_BYTES: usize = 1 << 20;

/// Controls how a batch of rows is made visible to every shard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatherPolicy {
    /// Use [`GatherPolicy::Narrow`] when the batch's payload (in bytes) is at
    /// most `max_batched_bytes`, when there is only 1 row, or when the batch
    /// has no more rows than features. Otherwise use [`GatherPolicy::Wide`].
    Auto { max_batched_bytes: usize },
    /// A single batched allreduce over the whole (zero-filled) batch
    Narrow,
    /// One single-row gather per requested row
    Wide,
}

impl Default for GatherPolicy {
    fn default() -> Self {
        GatherPolicy::Auto {
            max_batched_bytes: DEFAULT_MAX_BATCHED_BYTES,
        }
    }
}

static GATHER_POLICY_REGISTRY: LazyLock<HashMap<String, GatherPolicy>> = LazyLock::new(|| {
    HashMap::from([
        ("auto".to_owned(), GatherPolicy::default()),
        ("narrow".to_owned(), GatherPolicy::Narrow),
        ("wide".to_owned(), GatherPolicy::Wide),
    ])
});

impl GatherPolicy {
    /// Looks up a policy by name (`"auto"`, `"narrow"`, or `"wide"`)
    pub fn from_name(name: &str) -> Result<Self, Error> {
        lookup(&GATHER_POLICY_REGISTRY, "gather policy", name)
    }
}

/// Controls how a single row travels from its owner to every other shard.
///
/// Both options produce identical rows on every shard.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RowBroadcast {
    /// A broadcast rooted at the owning shard
    #[default]
    Bcast,
    /// Every non-owner contributes zeros to a sum-allreduce. This is useful
    /// with transports where broadcasts are unreliable.
    AllreduceZeroFill,
}

static ROW_BROADCAST_REGISTRY: LazyLock<HashMap<String, RowBroadcast>> = LazyLock::new(|| {
    HashMap::from([
        ("bcast".to_owned(), RowBroadcast::Bcast),
        ("allreduce".to_owned(), RowBroadcast::AllreduceZeroFill),
    ])
});

impl RowBroadcast {
    /// Looks up a broadcast method by name (`"bcast"` or `"allreduce"`)
    pub fn from_name(name: &str) -> Result<Self, Error> {
        lookup(&ROW_BROADCAST_REGISTRY, "row broadcast", name)
    }
}

fn lookup<T: Copy>(
    registry: &HashMap<String, T>,
    what: &'static str,
    name: &str,
) -> Result<T, Error> {
    registry.get(name).copied().ok_or_else(|| {
        let mut choices: Vec<String> = registry.keys().cloned().collect();
        choices.sort();
        Error::strategy_name(what, name.to_owned(), choices)
    })
}

/// Runtime-parameters that affect performance (but not the meaning of the
/// result).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuntimeSpec {
    pub block_sizes: BlockSizePolicy,
    pub gather: GatherPolicy,
    pub broadcast: RowBroadcast,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trial_count_default() {
        assert_eq!(TrialCount::from_raw(-1).unwrap(), TrialCount::Auto);
        // ln(8) ≈ 2.08
        assert_eq!(TrialCount::Auto.resolve(8), 4);
        assert_eq!(TrialCount::Auto.resolve(1), 2);
        assert_eq!(TrialCount::Auto.resolve(2), 2);
        assert_eq!(TrialCount::Auto.resolve(3), 3);
        assert_eq!(TrialCount::Auto.resolve(100), 6);
        assert_eq!(TrialCount::from_raw(5).unwrap().resolve(8), 5);
    }

    #[test]
    fn invalid_trial_counts() {
        assert!(TrialCount::from_raw(0).is_err());
        assert!(TrialCount::from_raw(-2).is_err());
    }

    #[test]
    fn builder() {
        let params = SeedingParamsBuilder::new()
            .cluster_count(3)
            .trial_count(7)
            .random_seed(11)
            .build()
            .unwrap();
        assert_eq!(params.cluster_count(), 3);
        assert_eq!(params.trial_count().resolve(3), 7);
        assert_eq!(params.random_seed(), 11);

        assert!(SeedingParamsBuilder::new().build().is_err());
        assert!(SeedingParamsBuilder::new().cluster_count(0).build().is_err());
        assert!(SeedingParamsBuilder::new().cluster_count(-4).build().is_err());
        assert!(
            SeedingParamsBuilder::new()
                .cluster_count(4)
                .trial_count(0)
                .build()
                .is_err()
        );
    }

    #[test]
    fn strategy_names() {
        assert_eq!(GatherPolicy::from_name("narrow").unwrap(), GatherPolicy::Narrow);
        assert_eq!(GatherPolicy::from_name("wide").unwrap(), GatherPolicy::Wide);
        assert_eq!(
            GatherPolicy::from_name("auto").unwrap(),
            GatherPolicy::default()
        );
        assert_eq!(
            RowBroadcast::from_name("allreduce").unwrap(),
            RowBroadcast::AllreduceZeroFill
        );

        let err = GatherPolicy::from_name("medium").unwrap_err();
        assert_eq!(
            err.to_string(),
            "medium is not a gather policy name. Choices include: [\"auto\", \"narrow\", \"wide\"]"
        );
        assert!(RowBroadcast::from_name("scatter").is_err());
    }
}

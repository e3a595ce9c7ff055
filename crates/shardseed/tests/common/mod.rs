// the reason this is named mod.rs has to do with some complexities of how
// testing is handled
//
// we are following the advice of the rust book
// https://doc.rust-lang.org/book/ch11-03-test-organization.html#submodules-in-integration-tests

#![allow(dead_code)] // not every test file uses every helper

use ndarray::{Array2, ArrayView2, Axis};
use rand::distr::{Distribution, Uniform};
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;
use shardseed::LocalCommunicator;
use std::thread;

// based on numpy!
// https://numpy.org/doc/stable/reference/generated/numpy.isclose.html
pub fn isclose(actual: f64, ref_val: f64, rtol: f64, atol: f64) -> bool {
    let actual_nan = actual.is_nan();
    let ref_nan = ref_val.is_nan();
    if actual_nan || ref_nan {
        actual_nan && ref_nan
    } else {
        (actual - ref_val).abs() <= (atol + rtol * ref_val.abs())
    }
}

/// Installs a tracing subscriber that writes through the test harness (so
/// output is only shown for failing tests). The verbosity is controlled by
/// the `RUST_LOG` environment variable.
///
/// The returned guard must be kept alive for the duration of the test.
pub fn init_test_subscriber() -> tracing::subscriber::DefaultGuard {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .finish();
    tracing::subscriber::set_default(subscriber)
}

/// Runs `f` once per rank, each on its own thread, with the members of a
/// fresh [`LocalCommunicator`] group. The results are returned in rank order.
///
/// `f` receives the communicator and the rows owned by that rank
/// (`row_counts` splits the rows of `samples` into contiguous shards).
pub fn run_sharded<T, F>(samples: ArrayView2<f64>, row_counts: &[usize], f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&LocalCommunicator, ArrayView2<f64>) -> T + Sync,
{
    assert_eq!(row_counts.iter().sum::<usize>(), samples.nrows());
    let comms = LocalCommunicator::new_group(row_counts.len());

    let mut shards = Vec::with_capacity(row_counts.len());
    let mut start = 0;
    for count in row_counts {
        shards.push(samples.slice_axis(Axis(0), (start..start + count).into()));
        start += count;
    }

    thread::scope(|s| {
        let handles: Vec<_> = comms
            .iter()
            .zip(shards)
            .map(|(comm, shard)| {
                let f = &f;
                s.spawn(move || f(comm, shard))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

/// generates `n_rows x n_features` integer-valued samples.
///
/// We intentionally use integers so that every sum is exact, which makes the
/// result independent of the order of operations (and therefore of the
/// sharding).
pub fn integer_samples(seed: u64, n_rows: usize, n_features: usize) -> Array2<f64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let value_dist = Uniform::try_from(-20..=20).unwrap();
    Array2::from_shape_simple_fn((n_rows, n_features), || {
        value_dist.sample(&mut rng) as f64
    })
}

/// the 2D dataset made of 2 well-separated groups of 4 points
#[rustfmt::skip]
pub fn two_groups() -> Array2<f64> {
    ndarray::array![
        [ 1.0,  1.0],
        [ 2.0,  2.0],
        [ 1.0,  2.0],
        [ 2.0,  1.0],
        [-1.0, -1.0],
        [-1.0, -2.0],
        [-2.0, -1.0],
        [-2.0, -2.0],
    ]
}

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ndarray::Array2;
use rand::distr::{Distribution, Uniform};
use rand_xoshiro::Xoshiro256PlusPlus;
use rand_xoshiro::rand_core::SeedableRng;
use shardseed::{
    RuntimeSpec, SeedingParams, SeedingParamsBuilder, SerialExecutor, SingleShard,
    ThreadedExecutor, greedy_seeding,
};

fn random_samples(n_rows: usize, n_features: usize, seed: u64) -> Array2<f64> {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let dist = Uniform::new(-100.0, 100.0).unwrap();
    Array2::from_shape_simple_fn((n_rows, n_features), || dist.sample(&mut rng))
}

fn help_setup_criterion_benchmark(c: &mut Criterion, cluster_count: i64) {
    let params: SeedingParams = SeedingParamsBuilder::new()
        .cluster_count(cluster_count)
        .random_seed(2525365464_u64)
        .build()
        .unwrap();
    let runtime = RuntimeSpec::default();

    let mut group = c.benchmark_group(format!("k={cluster_count}"));
    for n_rows in [1_000usize, 10_000, 50_000] {
        let samples = random_samples(n_rows, 16, 42);
        group.throughput(Throughput::Elements(n_rows as u64));

        group.bench_with_input(BenchmarkId::new("Serial", n_rows), &samples, |b, samples| {
            b.iter(|| {
                greedy_seeding(
                    &SingleShard,
                    &mut SerialExecutor,
                    samples.view(),
                    &params,
                    &runtime,
                )
                .unwrap()
            })
        });

        group.bench_with_input(BenchmarkId::new("Threaded", n_rows), &samples, |b, samples| {
            let mut executor = ThreadedExecutor::with_default_threads().unwrap();
            b.iter(|| {
                greedy_seeding(&SingleShard, &mut executor, samples.view(), &params, &runtime)
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn criterion_benchmark(c: &mut Criterion) {
    help_setup_criterion_benchmark(c, 8);
    help_setup_criterion_benchmark(c, 32);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

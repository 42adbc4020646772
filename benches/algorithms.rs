//! Benchmarks for rate limiting algorithms.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use throttlekit::{
    AlgorithmKind, MemoryStorage, RateLimitConfig, RateLimitService,
    algorithm::{self, Algorithm, FixedWindow, SlidingWindow, TokenBucket},
};
use tokio::runtime::Runtime;

const KINDS: [AlgorithmKind; 3] = [
    AlgorithmKind::FixedWindow,
    AlgorithmKind::SlidingWindow,
    AlgorithmKind::TokenBucket,
];

fn bench_process<A: Algorithm>(c: &mut Criterion, name: &str, algorithm: A, kind: AlgorithmKind) {
    let config = RateLimitConfig::per_second(1000).unwrap().with_algorithm(kind);

    c.bench_function(&format!("process/{name}"), |b| {
        let mut state = None;
        let mut now = 1_700_000_000_000u64;
        b.iter(|| {
            now += 1;
            let transition = algorithm.process(state.as_ref(), &config, black_box(now));
            state = Some(transition.state);
            black_box(transition.decision)
        })
    });
}

fn bench_algorithms(c: &mut Criterion) {
    bench_process(c, "fixed_window", FixedWindow::new(), AlgorithmKind::FixedWindow);
    bench_process(c, "sliding_window", SlidingWindow::new(), AlgorithmKind::SlidingWindow);
    bench_process(c, "token_bucket", TokenBucket::new(), AlgorithmKind::TokenBucket);
}

fn bench_check_limit(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("check_limit");

    for kind in KINDS {
        for num_keys in [1u64, 100, 10_000] {
            group.bench_with_input(BenchmarkId::new(kind.as_str(), num_keys), &num_keys, |b, &num_keys| {
                let config = RateLimitConfig::per_second(10_000).unwrap().with_algorithm(kind);
                let limiter = rt.block_on(async { RateLimitService::new(config, MemoryStorage::new()) });
                let mut i = 0u64;
                b.iter(|| {
                    i += 1;
                    let id = format!("user:{}", i % num_keys);
                    rt.block_on(async { black_box(limiter.check_limit(&id).await) })
                })
            });
        }
    }

    group.finish();
}

fn bench_for_kind(c: &mut Criterion) {
    c.bench_function("for_kind", |b| {
        b.iter(|| {
            for kind in KINDS {
                black_box(algorithm::for_kind(black_box(kind)));
            }
        })
    });
}

criterion_group!(benches, bench_algorithms, bench_check_limit, bench_for_kind);
criterion_main!(benches);

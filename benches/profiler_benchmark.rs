use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use tempfile::TempDir;

use chain_profiler::{Profiler, ProfilerConfig, Statistic};

fn bench_profiler(temp_dir: &TempDir, enabled: bool) -> Arc<Profiler> {
    let config = ProfilerConfig {
        enabled,
        // Keep disk out of the measurement window.
        write_statistics_every_calls: u64::MAX,
        stats_path: temp_dir.path().join("stats.json"),
        arrivals_path: temp_dir.path().join("arrivals.json"),
        ..ProfilerConfig::default()
    };
    Arc::new(Profiler::new(config))
}

fn bench_statistic_accounting(c: &mut Criterion) {
    let mut group = c.benchmark_group("statistic_accounting");
    group.throughput(Throughput::Elements(1));

    group.bench_function("account_during_warm_up", |b| {
        let mut statistic = Statistic::new(99, usize::MAX);
        let mut sample = 0u64;
        b.iter(|| {
            sample = (sample + 37) % 1000;
            statistic.account(black_box(sample));
        })
    });

    group.bench_function("account_with_histogram", |b| {
        let mut statistic = Statistic::new(99, 100);
        for sample in 0..100u64 {
            statistic.account(sample * 7 % 900);
        }
        let mut sample = 0u64;
        b.iter(|| {
            sample = (sample + 37) % 1000;
            statistic.account(black_box(sample));
        })
    });

    group.bench_function("bucket_index", |b| {
        let mut statistic = Statistic::new(99, 100);
        for sample in 0..100u64 {
            statistic.account(sample * 7 % 900);
        }
        b.iter(|| statistic.bucket_index(black_box(443)))
    });

    group.finish();
}

fn bench_scope_guard(c: &mut Criterion) {
    let mut group = c.benchmark_group("scope_guard");
    group.throughput(Throughput::Elements(1));

    let temp_dir = TempDir::new().unwrap();
    let enabled = bench_profiler(&temp_dir, true);
    group.bench_function("enabled_flat", |b| {
        b.iter(|| {
            let _scope = enabled.scope(black_box("bench_region"));
        })
    });

    group.bench_function("enabled_nested", |b| {
        b.iter(|| {
            let _outer = enabled.scope(black_box("bench_outer"));
            let _inner = enabled.scope(black_box("bench_inner"));
        })
    });

    let disabled_dir = TempDir::new().unwrap();
    let disabled = bench_profiler(&disabled_dir, false);
    group.bench_function("disabled", |b| {
        b.iter(|| {
            let _scope = disabled.scope(black_box("bench_region"));
        })
    });

    group.finish();
}

fn bench_arrival_tracking(c: &mut Criterion) {
    let mut group = c.benchmark_group("arrival_tracking");
    group.throughput(Throughput::Elements(1));

    let temp_dir = TempDir::new().unwrap();
    let profiler = bench_profiler(&temp_dir, true);
    let mut index = 0u64;
    group.bench_function("register_received_tx", |b| {
        b.iter(|| {
            index += 1;
            profiler.register_received_tx(black_box(&format!("tx-{index}")));
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_statistic_accounting,
    bench_scope_guard,
    bench_arrival_tracking
);
criterion_main!(benches);

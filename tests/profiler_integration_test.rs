//! End-to-end tests for the profiling subsystem: instrumented workloads across
//! several threads, persistence across simulated restarts, and the global
//! profiler wiring a node would actually use.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use chain_profiler::persistence::StatsDocument;
use chain_profiler::{init_profiler, profile_scope, Profiler, ProfilerConfig};

fn test_config(temp_dir: &TempDir) -> ProfilerConfig {
    ProfilerConfig {
        stats_path: temp_dir.path().join("profiler_stats.json"),
        arrivals_path: temp_dir.path().join("profiler_arrivals.json"),
        ..ProfilerConfig::default()
    }
}

fn simulated_block_validation(profiler: &Arc<Profiler>, transactions: usize) {
    let _block = profiler.scope("connect_block");
    for index in 0..transactions {
        let _transaction = profiler.scope("check_transaction");
        profiler.register_received_tx(&format!("tx-{index}"));
        {
            let _hash = profiler.scope("hash");
            std::thread::sleep(Duration::from_micros(50));
        }
    }
}

#[test]
fn test_full_lifecycle_across_restart() {
    let temp_dir = TempDir::new().unwrap();
    let config = test_config(&temp_dir);

    {
        let profiler = Arc::new(Profiler::new(config.clone()));
        let workers: Vec<_> = (0..3)
            .map(|_| {
                let profiler = Arc::clone(&profiler);
                std::thread::spawn(move || simulated_block_validation(&profiler, 4))
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        profiler.flush().unwrap();
    }

    // The persisted document is the documented human-readable schema.
    let text = std::fs::read_to_string(&config.stats_path).unwrap();
    for key in ["functionStats", "timePastStarts", "timePastSamplings", "runTime"] {
        assert!(text.contains(key), "missing {key}");
    }

    // Restart: restored counts merge with new activity.
    let profiler = Arc::new(Profiler::new(config));
    simulated_block_validation(&profiler, 1);
    let (stats, arrivals) = profiler.storage_snapshot();

    let blocks = &stats.function_stats["connect_block"];
    assert_eq!(blocks.run_time.number_of_samples, 4);
    // Call paths reflect dynamic nesting, not just local names.
    let hashes = &stats.function_stats["connect_block->check_transaction->hash"];
    assert_eq!(hashes.run_time.number_of_samples, 13);
    assert!(stats.function_stats.contains_key("connect_block->check_transaction"));

    // Nested attribution: the block path saw its transactions as subordinates.
    let subordinates = blocks.subordinates.as_ref().unwrap();
    assert!(subordinates.total > 0);
    assert!(blocks.run_time.total >= subordinates.total);

    // Arrivals are idempotent per key: 3 workers and the restart replayed the
    // same small id set, while the lifetime counter only counted distinct ids.
    assert_eq!(arrivals.arrivals.len(), 4);
    assert_eq!(arrivals.total_tx_ids_received, 4);

    // Two sessions were started against this state directory.
    assert_eq!(stats.time_past_starts.len(), 2);
}

#[test]
fn test_histogram_initializes_and_persists_after_warm_up() {
    let temp_dir = TempDir::new().unwrap();
    let profiler = Arc::new(Profiler::new(test_config(&temp_dir)));

    // Per-path override: build the histogram after only 3 samples.
    for _ in 0..4 {
        let _scope = profiler.scope_with("sign_block", 1, 3);
        std::thread::sleep(Duration::from_micros(200));
    }
    profiler.flush().unwrap();

    let text = std::fs::read_to_string(&profiler.config().stats_path).unwrap();
    let document: StatsDocument = serde_json::from_str(&text).unwrap();
    let run_time = &document.function_stats["sign_block"].run_time;
    assert_eq!(run_time.number_of_samples, 4);
    assert!(run_time.mean.is_some());
    assert!(run_time.histogram.is_some());
    let histogram = run_time.histogram.as_ref().unwrap();
    let bucketed: u64 = histogram.content.values().sum();
    assert_eq!(bucketed, 4);
}

#[test]
fn test_global_profiler_and_macro() {
    let temp_dir = TempDir::new().unwrap();
    let profiler = init_profiler(test_config(&temp_dir));

    let answer = profile_scope!("compute_chain_work", {
        profile_scope!("hash_header", { 2 * 21 })
    });
    assert_eq!(answer, 42);

    let (stats, _) = profiler.storage_snapshot();
    assert!(stats.function_stats.contains_key("compute_chain_work"));
    assert!(stats
        .function_stats
        .contains_key("compute_chain_work->hash_header"));

    assert!(chain_profiler::get_profiler().is_some());
}

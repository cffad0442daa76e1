//! Rollup Deterministic Simulation Tests
//!
//! Seeded workloads written directly and replayed (shuffled, duplicated)
//! through the write buffer. Every seed must keep scores monotone, converge
//! to the same store contents, and agree between full-range and interval
//! queries.

use redisrank::dst::{run_rollup_batch, summarize_batch, RollupDSTConfig, RollupDSTHarness};
use redisrank::Resolution;

// =============================================================================
// Standard Configuration Tests - 100 Seeds
// =============================================================================

#[test]
fn test_rollup_dst_100_seeds_standard() {
    let results = run_rollup_batch(0, 100, RollupDSTConfig::new);
    let summary = summarize_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "All 100 seeds should pass with standard config");
}

#[test]
fn test_rollup_dst_100_seeds_hot_buckets() {
    // Few hours, many writes: heavy merging inside the buffer
    let results = run_rollup_batch(1000, 100, RollupDSTConfig::hot_buckets);
    let summary = summarize_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "All 100 seeds should pass with hot buckets");
}

#[test]
fn test_rollup_dst_50_seeds_long_range() {
    // Writes spread across a year boundary and several months
    let results = run_rollup_batch(2000, 50, RollupDSTConfig::long_range);
    let summary = summarize_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 50, "All 50 seeds should pass with long range");
}

// =============================================================================
// Stress and Edge Cases
// =============================================================================

#[test]
fn test_rollup_dst_stress_many_writes() {
    let mut config = RollupDSTConfig::new(12345);
    config.num_writes = 1000;
    let mut harness = RollupDSTHarness::new(config);
    harness.run();
    let result = harness.result();
    println!("Stress 1000 writes: {}", result.summary());
    assert!(result.is_success(), "{:?}", result.invariant_violations);
    assert!(result.replayed >= 1000);
}

#[test]
fn test_rollup_dst_every_write_duplicated() {
    let mut config = RollupDSTConfig::new(777);
    config.duplicate_prob = 1.0;
    let mut harness = RollupDSTHarness::new(config);
    harness.run();
    let result = harness.result();
    println!("All duplicated: {}", result.summary());
    assert!(result.is_success(), "{:?}", result.invariant_violations);
    assert_eq!(result.replayed, result.writes * 2);
}

#[test]
fn test_rollup_dst_minute_depth() {
    let mut config = RollupDSTConfig::new(4242);
    config.hours = 6;
    config.depth = Resolution::Min;
    let mut harness = RollupDSTHarness::new(config);
    harness.run();
    let result = harness.result();
    println!("Minute depth: {}", result.summary());
    assert!(result.is_success(), "{:?}", result.invariant_violations);
}

#[test]
fn test_rollup_dst_same_seed_same_result() {
    let mut a = RollupDSTHarness::with_seed(31337);
    let mut b = RollupDSTHarness::with_seed(31337);
    a.run();
    b.run();
    assert_eq!(a.result().summary(), b.result().summary());
}

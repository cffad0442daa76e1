//! Deterministic Simulation Testing for the rollup pipeline
//!
//! Each seed generates a workload of writes, then checks:
//! - Convergence: direct in-order writes and a shuffled, duplicated,
//!   buffered replay of the same workload leave identical store contents
//! - Monotonicity: no stored score ever decreases during the direct run
//! - Interval completeness: per label, the max over hourly interval
//!   records equals the full-range rank over the same window
//!
//! ## Usage
//!
//! ```rust,ignore
//! let results = run_rollup_batch(0, 50, RollupDSTConfig::new);
//! assert!(results.iter().all(|r| r.is_success()), "{}", summarize_batch(&results));
//! ```

use crate::keys::{Key, Label, Resolution};
use crate::query::{Finder, Query};
use crate::rank::Stats;
use crate::rollup::{Rollup, UpdateOptions, WriteBuffer};
use crate::store::{Connections, MemoryStore};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;

/// Seeded RNG so every run is reproducible from its seed
pub struct DeterministicRng {
    rng: ChaCha8Rng,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        DeterministicRng {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    pub fn gen_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        min + (self.next_u64() % (max - min))
    }

    pub fn gen_bool(&mut self, probability: f64) -> bool {
        let val = self.next_u64() as f64 / u64::MAX as f64;
        val < probability
    }

    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        for i in (1..slice.len()).rev() {
            let j = self.gen_range(0, (i + 1) as u64) as usize;
            slice.swap(i, j);
        }
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.gen_range(0, items.len() as u64) as usize]
    }
}

/// Configuration for rollup DST
#[derive(Debug, Clone)]
pub struct RollupDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Writes in the generated workload
    pub num_writes: usize,
    /// Span of write times in hours
    pub hours: u64,
    /// Largest buffer capacity tried in the buffered replay
    pub max_buffer: usize,
    /// Probability that a write is replayed twice
    pub duplicate_prob: f64,
    /// Maximum score value
    pub max_score: u64,
    /// Finest resolution written
    pub depth: Resolution,
}

impl Default for RollupDSTConfig {
    fn default() -> Self {
        RollupDSTConfig {
            seed: 0,
            num_writes: 60,
            hours: 72,
            max_buffer: 16,
            duplicate_prob: 0.2,
            max_score: 100,
            depth: Resolution::Hour,
        }
    }
}

impl RollupDSTConfig {
    pub fn new(seed: u64) -> Self {
        RollupDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Few hours, many collisions on the same buckets
    pub fn hot_buckets(seed: u64) -> Self {
        RollupDSTConfig {
            seed,
            num_writes: 120,
            hours: 3,
            max_score: 10,
            ..Default::default()
        }
    }

    /// Writes spread over more than a year at day depth
    pub fn long_range(seed: u64) -> Self {
        RollupDSTConfig {
            seed,
            hours: 24 * 400,
            depth: Resolution::Day,
            ..Default::default()
        }
    }
}

/// One generated write
#[derive(Debug, Clone)]
pub struct RollupOp {
    pub label: String,
    pub time: DateTime<Utc>,
    pub stats: Stats,
}

/// Result of a rollup DST run
#[derive(Debug, Clone)]
pub struct RollupDSTResult {
    pub seed: u64,
    pub writes: usize,
    pub replayed: usize,
    pub buffer_size: usize,
    pub buckets: usize,
    pub invariant_violations: Vec<String>,
}

impl RollupDSTResult {
    pub fn new(seed: u64) -> Self {
        RollupDSTResult {
            seed,
            writes: 0,
            replayed: 0,
            buffer_size: 0,
            buckets: 0,
            invariant_violations: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} writes, {} replayed through buffer of {}, {} buckets, {} violations",
            self.seed,
            self.writes,
            self.replayed,
            self.buffer_size,
            self.buckets,
            self.invariant_violations.len()
        )
    }
}

const LABELS: [&str; 5] = ["a", "a/b", "a/c", "a/b/d", "e"];
const MEMBERS: [&str; 6] = ["views", "users", "visitors/eu", "visitors/us", "visitors/eu/fr", "x"];

/// DST harness for the write and read paths
pub struct RollupDSTHarness {
    config: RollupDSTConfig,
    rng: DeterministicRng,
    result: RollupDSTResult,
}

impl RollupDSTHarness {
    pub fn new(config: RollupDSTConfig) -> Self {
        let rng = DeterministicRng::new(config.seed);
        let result = RollupDSTResult::new(config.seed);
        RollupDSTHarness {
            config,
            rng,
            result,
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::new(RollupDSTConfig::new(seed))
    }

    fn origin() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2010, 12, 30, 20, 0, 0)
            .single()
            .unwrap_or_default()
    }

    fn generate(&mut self) -> Vec<RollupOp> {
        (0..self.config.num_writes)
            .map(|_| {
                let label = self.rng.pick(&LABELS).to_string();
                let minutes = self.rng.gen_range(0, self.config.hours * 60);
                let time = Self::origin() + Duration::minutes(minutes as i64);
                let mut stats = Stats::new();
                for _ in 0..self.rng.gen_range(1, 4) {
                    let member = *self.rng.pick(&MEMBERS);
                    let score = self.rng.gen_range(1, self.config.max_score + 1) as f64;
                    stats.insert(member, score);
                }
                RollupOp { label, time, stats }
            })
            .collect()
    }

    fn key(&self, op: &RollupOp) -> Key {
        Key::new("Dst", Some(Label::new(op.label.as_str())), op.time).with_depth(self.config.depth)
    }

    fn violation(&mut self, message: String) {
        self.result.invariant_violations.push(message);
    }

    /// Generate a workload and check every invariant against it
    pub fn run(&mut self) {
        let ops = self.generate();
        self.result.writes = ops.len();
        let opts = UpdateOptions::default();

        // Direct, in order, checking monotonicity after every write
        let direct = Arc::new(MemoryStore::new());
        let rollup = Rollup::new(Arc::new(Connections::new(direct.clone())));
        let mut before = direct.dump();
        for (i, op) in ops.iter().enumerate() {
            if let Err(e) = rollup.update_all(&self.key(op), &op.stats, None, &opts, None) {
                self.violation(format!("direct write {} failed: {}", i, e));
                return;
            }
            let after = direct.dump();
            for (bucket, members) in &before {
                for (member, score) in members {
                    let now = after.get(bucket).and_then(|m| m.get(member)).copied();
                    if now.map_or(true, |s| s < *score) {
                        self.violation(format!(
                            "write {} lowered {}[{}] from {} to {:?}",
                            i, bucket, member, score, now
                        ));
                    }
                }
            }
            before = after;
        }

        // Shuffled, with duplicates, through a buffer
        let mut replay: Vec<&RollupOp> = Vec::new();
        for op in &ops {
            replay.push(op);
            if self.rng.gen_bool(self.config.duplicate_prob) {
                replay.push(op);
            }
        }
        self.rng.shuffle(&mut replay);
        let buffer_size = self.rng.gen_range(2, self.config.max_buffer as u64 + 1) as usize;
        self.result.replayed = replay.len();
        self.result.buffer_size = buffer_size;

        let buffered = Arc::new(MemoryStore::new());
        let buffered_rollup = Arc::new(Rollup::new(Arc::new(Connections::new(buffered.clone()))));
        let buffer = WriteBuffer::new(buffered_rollup.clone(), buffer_size);
        for op in replay {
            let key = self.key(op);
            if let Err(e) = buffered_rollup.update_all(&key, &op.stats, None, &opts, Some(&buffer)) {
                self.violation(format!("buffered write failed: {}", e));
                return;
            }
        }
        if let Err(e) = buffer.shutdown() {
            self.violation(format!("buffer shutdown failed: {}", e));
            return;
        }

        let expected = direct.dump();
        let actual = buffered.dump();
        self.result.buckets = expected.len();
        if expected != actual {
            let differing: Vec<&String> = expected
                .keys()
                .chain(actual.keys())
                .filter(|k| expected.get(*k) != actual.get(*k))
                .take(3)
                .collect();
            self.violation(format!("buffered replay diverged at {:?}", differing));
        }

        self.check_intervals(&ops, direct);
    }

    fn check_intervals(&mut self, ops: &[RollupOp], store: Arc<MemoryStore>) {
        let (Some(from), Some(till)) = (
            ops.iter().map(|op| op.time).min(),
            ops.iter().map(|op| op.time).max(),
        ) else {
            return;
        };
        let finder = Finder::new(Arc::new(Connections::new(store)));
        let depth = self.config.depth;
        for label in LABELS {
            let query = Query::new()
                .scope("Dst")
                .label(label)
                .dates(from, till)
                .depth(depth);
            let (full, intervals) = match (finder.find(&query), finder.find(&query.interval(depth))) {
                (Ok(full), Ok(intervals)) => (full, intervals),
                (Err(e), _) | (_, Err(e)) => {
                    self.violation(format!("query for {} failed: {}", label, e));
                    return;
                }
            };
            let mut folded = Stats::new();
            for record in &intervals {
                folded.merge_max(&record.stats);
            }
            if &folded != full.rank().stats() || intervals.rank().stats() != full.rank().stats() {
                self.violation(format!(
                    "label {}: interval fold {:?} != full range {:?}",
                    label,
                    folded.as_map(),
                    full.rank().stats().as_map()
                ));
            }
        }
    }

    pub fn result(&self) -> &RollupDSTResult {
        &self.result
    }
}

/// Run a batch of DST tests with different seeds
pub fn run_rollup_batch(
    start_seed: u64,
    num_seeds: usize,
    config_fn: fn(u64) -> RollupDSTConfig,
) -> Vec<RollupDSTResult> {
    (0..num_seeds)
        .map(|i| {
            let mut harness = RollupDSTHarness::new(config_fn(start_seed + i as u64));
            harness.run();
            harness.result().clone()
        })
        .collect()
}

/// Summarize batch results
pub fn summarize_batch(results: &[RollupDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let mut summary = format!(
        "Rollup DST Summary\n\
         ==================\n\
         Seeds: {} total, {} passed, {} failed\n",
        total,
        passed,
        total - passed
    );
    for result in results.iter().filter(|r| !r.is_success()) {
        summary.push_str(&format!("  {}\n", result.summary()));
        for violation in &result.invariant_violations {
            summary.push_str(&format!("    - {}\n", violation));
        }
    }
    summary
}

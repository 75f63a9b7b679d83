//! # Store Benchmark Harness
//!
//! Purpose: a dependency-free, repeatable benchmark driver for the sharded
//! store so baseline throughput can be compared over time.
//!
//! ## Design Principles
//! 1. **Deterministic Workload**: a fixed PRNG seed for stable comparisons.
//! 2. **Allocation Control**: pre-build keys off the hot path.
//! 3. **Zero-Cost Dispatch**: call `Store` directly, no handler/RPC layer.

use std::env;
use std::hint::black_box;
use std::time::Instant;

use shardkv_engine::Store;

const DEFAULT_KEY_COUNT: usize = 1 << 16;
const DEFAULT_OP_COUNT: usize = 1_000_000;
const DEFAULT_LIST_LEN: usize = 8;

struct BenchConfig {
    requested_keys: usize,
    key_count: usize,
    key_mask: usize,
    op_count: usize,
    list_len: usize,
}

impl BenchConfig {
    fn from_args() -> Self {
        let mut args = env::args().skip(1);
        let requested_keys = parse_usize(args.next(), DEFAULT_KEY_COUNT);
        let op_count = parse_usize(args.next(), DEFAULT_OP_COUNT);
        let list_len = parse_usize(args.next(), DEFAULT_LIST_LEN);

        let key_count = normalize_power_of_two(requested_keys);
        let key_mask = key_count - 1;

        BenchConfig {
            requested_keys,
            key_count,
            key_mask,
            op_count,
            list_len,
        }
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn normalize_power_of_two(value: usize) -> usize {
    let value = value.max(1);
    if value.is_power_of_two() {
        value
    } else {
        value.next_power_of_two()
    }
}

/// Tiny deterministic PRNG used to avoid pulling in a dependency just for
/// the benchmark workload.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    #[inline]
    fn next_index(&mut self, mask: usize) -> usize {
        (self.next_u64() as usize) & mask
    }
}

fn build_keys(count: usize, seed: u64) -> Vec<String> {
    (0..count).map(|i| format!("bench:{:016x}", seed ^ (i as u64))).collect()
}

fn report(label: &str, ops: usize, elapsed: std::time::Duration) {
    let secs = elapsed.as_secs_f64();
    let ops_per_sec = (ops as f64) / secs;
    let nanos_per_op = (secs * 1e9) / (ops as f64);
    println!("{label}: {ops} ops in {secs:.3}s ({ops_per_sec:.0} ops/s, {nanos_per_op:.1} ns/op)");
}

fn main() {
    let config = BenchConfig::from_args();
    let store = Store::new();

    let keys = build_keys(config.key_count, 0xA5A5_A5A5_A5A5_A5A5);

    for key in &keys {
        store.put(key, "seed-value".to_string());
    }

    println!(
        "keys: requested={}, actual={}, ops={}, list_len={}",
        config.requested_keys, config.key_count, config.op_count, config.list_len
    );

    let mut rng = XorShift64::new(0x1234_5678_9ABC_DEF0);
    let start = Instant::now();
    for _ in 0..config.op_count {
        let idx = rng.next_index(config.key_mask);
        let value = store.get(&keys[idx]);
        black_box(value);
    }
    report("GET", config.op_count, start.elapsed());

    let mut rng = XorShift64::new(0x0FED_CBA9_8765_4321);
    let start = Instant::now();
    for i in 0..config.op_count {
        let idx = rng.next_index(config.key_mask);
        store.put(&keys[idx], format!("value-{i}"));
    }
    report("PUT", config.op_count, start.elapsed());

    for key in &keys {
        store.delete(key);
    }
    let mut rng = XorShift64::new(0x9E37_79B9_7F4A_7C15);
    let start = Instant::now();
    for i in 0..config.op_count {
        let idx = rng.next_index(config.key_mask);
        let item = format!("item-{:06}", i % config.list_len);
        black_box(store.append_to_list(&keys[idx], &item));
    }
    report("APPEND", config.op_count, start.elapsed());
}

//! Throughput Demo - Kilat MPMC Ring Queue
//!
//! Mengukur latency dan throughput:
//! - Single-threaded put/get (baseline tanpa contention)
//! - Batch API vs single API
//! - MPMC riil: 4 producer + 4 consumer berebut satu buffer
//!
//! Usage:
//!   cargo run --release --example throughput_demo

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;

use kilat::RingBuffer;

fn main() {
    println!("⚡ Kilat MPMC Ring Queue - Throughput Demo");
    println!("==========================================\n");

    benchmark_single_thread();
    benchmark_batch();
    benchmark_mpmc();

    println!("\n✅ All benchmarks complete!");
}

fn benchmark_single_thread() {
    println!("📊 Single-Thread Baseline (no contention)");
    println!("-----------------------------------------");

    const ITERATIONS: u64 = 1_000_000;
    let rb: RingBuffer<u64> = RingBuffer::new(65536);

    // Warm up
    for i in 0..1000 {
        let _ = rb.put(i);
    }
    while rb.get().0.is_some() {}

    // Benchmark put
    let start = Instant::now();
    for i in 0..ITERATIONS {
        if rb.put(i).is_err() {
            rb.get();
            let _ = rb.put(i);
        }
    }
    let put_duration = start.elapsed();

    // Drain
    while rb.get().0.is_some() {}

    // Benchmark get
    for i in 0..ITERATIONS / 2 {
        let _ = rb.put(i);
    }
    let start = Instant::now();
    let mut got = 0u64;
    while rb.get().0.is_some() {
        got += 1;
    }
    let get_duration = start.elapsed();

    let put_ns = put_duration.as_nanos() as f64 / ITERATIONS as f64;
    let get_ns = get_duration.as_nanos() as f64 / got as f64;

    println!("  Operations: {}", ITERATIONS);
    println!(
        "  Put latency: {:.2} ns/op ({:.3} μs/op)",
        put_ns,
        put_ns / 1000.0
    );
    println!(
        "  Get latency: {:.2} ns/op ({:.3} μs/op)",
        get_ns,
        get_ns / 1000.0
    );
    println!(
        "  Throughput:  {:.2} M ops/sec\n",
        ITERATIONS as f64 / put_duration.as_secs_f64() / 1_000_000.0
    );
}

fn benchmark_batch() {
    println!("📊 Batch API (satu CAS per range)");
    println!("---------------------------------");

    const ROUNDS: u64 = 10_000;
    const BATCH: usize = 100;
    let rb: RingBuffer<u64> = RingBuffer::new(65536);
    let mut out: Vec<u64> = Vec::with_capacity(BATCH);

    let start = Instant::now();
    for _ in 0..ROUNDS {
        let mut values: Vec<u64> = (0..BATCH as u64).collect();
        rb.put_batch(&mut values);
        out.clear();
        rb.get_batch(&mut out, BATCH as u32);
    }
    let duration = start.elapsed();

    let total = ROUNDS * BATCH as u64;
    let per_item_ns = duration.as_nanos() as f64 / total as f64;

    println!("  Batch size: {} items", BATCH);
    println!("  Rounds: {}", ROUNDS);
    println!("  Per-item: {:.2} ns", per_item_ns);
    println!(
        "  Throughput: {:.2} M items/sec\n",
        total as f64 / duration.as_secs_f64() / 1_000_000.0
    );
}

fn benchmark_mpmc() {
    println!("📊 MPMC Contended (4 producers + 4 consumers)");
    println!("---------------------------------------------");

    const PRODUCERS: u64 = 4;
    const CONSUMERS: u64 = 4;
    const PER_PRODUCER: u64 = 250_000;
    const TOTAL: u64 = PRODUCERS * PER_PRODUCER;

    let rb: RingBuffer<u64> = RingBuffer::new(4096);
    let taken = AtomicU64::new(0);

    let start = Instant::now();

    thread::scope(|s| {
        for p in 0..PRODUCERS {
            let rb = &rb;
            s.spawn(move || {
                for i in 0..PER_PRODUCER {
                    let mut v = (p << 32) | i;
                    loop {
                        match rb.put(v) {
                            Ok(_) => break,
                            Err(e) => v = e.into_inner(),
                        }
                    }
                }
            });
        }

        for _ in 0..CONSUMERS {
            let rb = &rb;
            let taken = &taken;
            s.spawn(move || loop {
                if rb.get().0.is_some() {
                    taken.fetch_add(1, Ordering::Relaxed);
                } else if taken.load(Ordering::Relaxed) >= TOTAL {
                    break;
                }
            });
        }
    });

    let duration = start.elapsed();

    println!("  Items: {}", TOTAL);
    println!("  Duration: {:.2}ms", duration.as_secs_f64() * 1000.0);
    println!(
        "  Throughput: {:.2} M items/sec",
        TOTAL as f64 / duration.as_secs_f64() / 1_000_000.0
    );
    println!("  Status akhir: {}", rb);
}

//! MPMC Stress Test - Concurrent No-Loss / No-Duplication Soak
//!
//! Banyak producer dan consumer menghantam satu buffer kecil secara
//! bersamaan. Setiap item harus keluar tepat satu kali: tidak ada yang
//! hilang, tidak ada yang terduplikasi, dan occupancy tidak pernah
//! melebihi kapasitas.
//!
//! Usage:
//!   cargo test --release --test mpmc_stress_test -- --nocapture
//!
//! Knobs (env):
//!   KILAT_STRESS_ITEMS     item per producer (default: 100000)
//!   KILAT_STRESS_CAPACITY  kapasitas buffer yang diminta (default: 1024)

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use kilat::RingBuffer;

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Statistics collector
struct StressStats {
    produced: AtomicU64,
    consumed: AtomicU64,
    put_rejects: AtomicU64,
    get_misses: AtomicU64,
    checksum_put: AtomicU64,
    checksum_get: AtomicU64,
    max_occupied: AtomicU64,
}

impl StressStats {
    fn new() -> Self {
        Self {
            produced: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            put_rejects: AtomicU64::new(0),
            get_misses: AtomicU64::new(0),
            checksum_put: AtomicU64::new(0),
            checksum_get: AtomicU64::new(0),
            max_occupied: AtomicU64::new(0),
        }
    }

    fn record_put(&self, value: u64, occupied: u32) {
        self.produced.fetch_add(1, Ordering::Relaxed);
        self.checksum_put.fetch_add(value, Ordering::Relaxed);
        self.record_occupied(occupied);
    }

    fn record_get(&self, value: u64, occupied: u32) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
        self.checksum_get.fetch_add(value, Ordering::Relaxed);
        self.record_occupied(occupied);
    }

    fn record_occupied(&self, occupied: u32) {
        // Update max (CAS loop)
        let occupied = occupied as u64;
        let mut current = self.max_occupied.load(Ordering::Relaxed);
        while occupied > current {
            match self.max_occupied.compare_exchange_weak(
                current,
                occupied,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }
    }

    fn print_report(&self, label: &str, duration: std::time::Duration) {
        let produced = self.produced.load(Ordering::Relaxed);
        let consumed = self.consumed.load(Ordering::Relaxed);
        let put_rejects = self.put_rejects.load(Ordering::Relaxed);
        let get_misses = self.get_misses.load(Ordering::Relaxed);
        let max_occupied = self.max_occupied.load(Ordering::Relaxed);

        let rate = consumed as f64 / duration.as_secs_f64();

        println!("\n📊 STRESS TEST RESULTS - {}", label);
        println!("=====================================");
        println!("  Duration:     {:.2}s", duration.as_secs_f64());
        println!("  Produced:     {}", produced);
        println!("  Consumed:     {}", consumed);
        println!("  Put rejects:  {}", put_rejects);
        println!("  Get misses:   {}", get_misses);
        println!("  Max occupied: {}", max_occupied);
        println!("  Throughput:   {:.2} M items/sec", rate / 1_000_000.0);
    }
}

/// Jalankan `producers` x `consumers` thread di atas satu buffer.
/// `batch` menentukan apakah sisi put/get memakai API batch.
fn run_stress(
    capacity: u32,
    producers: u64,
    consumers: u64,
    per_producer: u64,
    batch: bool,
) -> (StressStats, Vec<u64>, u32, std::time::Duration) {
    let rb: RingBuffer<u64> = RingBuffer::new(capacity);
    let actual_capacity = rb.capacity();
    let stats = StressStats::new();
    let total = producers * per_producer;
    let all = Mutex::new(Vec::with_capacity(total as usize));

    let start = Instant::now();

    thread::scope(|s| {
        for p in 0..producers {
            let rb = &rb;
            let stats = &stats;
            s.spawn(move || {
                if batch {
                    let mut pending: Vec<u64> =
                        (0..per_producer).map(|i| (p << 32) | i).collect();
                    let mut sent = 0u64;
                    while !pending.is_empty() {
                        let chunk = pending.len().min(64);
                        let mut submit: Vec<u64> = pending.drain(..chunk).collect();
                        while !submit.is_empty() {
                            let before = submit.len();
                            let (accepted, occupied) = rb.put_batch(&mut submit);
                            if accepted == 0 {
                                stats.put_rejects.fetch_add(1, Ordering::Relaxed);
                            } else {
                                sent += accepted as u64;
                                stats.record_occupied(occupied);
                            }
                            debug_assert_eq!(before - submit.len(), accepted as usize);
                        }
                    }
                    stats.produced.fetch_add(sent, Ordering::Relaxed);
                    let sum: u64 = (0..per_producer).map(|i| (p << 32) | i).sum();
                    stats.checksum_put.fetch_add(sum, Ordering::Relaxed);
                } else {
                    for i in 0..per_producer {
                        let mut v = (p << 32) | i;
                        loop {
                            match rb.put(v) {
                                Ok(occupied) => {
                                    stats.record_put(v, occupied);
                                    break;
                                }
                                Err(e) => {
                                    stats.put_rejects.fetch_add(1, Ordering::Relaxed);
                                    v = e.into_inner();
                                }
                            }
                        }
                    }
                }
            });
        }

        for _ in 0..consumers {
            let rb = &rb;
            let stats = &stats;
            let all = &all;
            s.spawn(move || {
                let mut local = Vec::new();
                let mut out = Vec::with_capacity(64);
                loop {
                    if batch {
                        out.clear();
                        let (got, occupied) = rb.get_batch(&mut out, 64);
                        if got > 0 {
                            for &v in &out {
                                stats.record_get(v, occupied);
                            }
                            local.extend_from_slice(&out);
                            continue;
                        }
                    } else if let (Some(v), occupied) = rb.get() {
                        stats.record_get(v, occupied);
                        local.push(v);
                        continue;
                    }

                    stats.get_misses.fetch_add(1, Ordering::Relaxed);
                    if stats.consumed.load(Ordering::Relaxed) >= total {
                        break;
                    }
                }
                all.lock().unwrap().extend(local);
            });
        }
    });

    let duration = start.elapsed();
    let all = all.into_inner().unwrap();
    (stats, all, actual_capacity, duration)
}

fn assert_no_loss_no_duplication(
    stats: &StressStats,
    all: &mut Vec<u64>,
    capacity: u32,
    total: u64,
) {
    assert_eq!(stats.produced.load(Ordering::Relaxed), total);
    assert_eq!(
        stats.consumed.load(Ordering::Relaxed),
        total,
        "jumlah yang keluar tidak sama dengan yang masuk"
    );
    assert_eq!(
        stats.checksum_put.load(Ordering::Relaxed),
        stats.checksum_get.load(Ordering::Relaxed),
        "checksum mismatch - ada item yang tertukar/hilang"
    );
    assert!(
        stats.max_occupied.load(Ordering::Relaxed) <= capacity as u64,
        "occupancy melebihi kapasitas"
    );

    assert_eq!(all.len() as u64, total);
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len() as u64, total, "ada item yang terduplikasi");
}

#[test]
fn test_stress_mpmc_single_ops() {
    let per_producer = env_u64("KILAT_STRESS_ITEMS", 100_000);
    let capacity = env_u64("KILAT_STRESS_CAPACITY", 1024) as u32;
    const PRODUCERS: u64 = 4;
    const CONSUMERS: u64 = 4;

    println!("\n🧪 MPMC STRESS - {} producers x {} consumers", PRODUCERS, CONSUMERS);

    let (stats, mut all, actual_capacity, duration) =
        run_stress(capacity, PRODUCERS, CONSUMERS, per_producer, false);

    stats.print_report("single ops", duration);
    assert_no_loss_no_duplication(&stats, &mut all, actual_capacity, PRODUCERS * per_producer);
    println!("\n✅ STRESS TEST PASSED - every item exactly once");
}

#[test]
fn test_stress_mpmc_batch_ops() {
    let per_producer = env_u64("KILAT_STRESS_ITEMS", 100_000);
    let capacity = env_u64("KILAT_STRESS_CAPACITY", 1024) as u32;
    const PRODUCERS: u64 = 4;
    const CONSUMERS: u64 = 4;

    println!("\n🧪 MPMC STRESS (BATCH) - {} producers x {} consumers", PRODUCERS, CONSUMERS);

    let (stats, mut all, actual_capacity, duration) =
        run_stress(capacity, PRODUCERS, CONSUMERS, per_producer, true);

    stats.print_report("batch ops", duration);
    assert_no_loss_no_duplication(&stats, &mut all, actual_capacity, PRODUCERS * per_producer);
    println!("\n✅ STRESS TEST PASSED - every item exactly once");
}

#[test]
fn test_stress_spsc_fifo() {
    let items = env_u64("KILAT_STRESS_ITEMS", 100_000);

    println!("\n🧪 SPSC FIFO STRESS - urutan harus persis urutan masuk");

    let rb: RingBuffer<u64> = RingBuffer::new(64);
    let start = Instant::now();

    thread::scope(|s| {
        let rb = &rb;
        s.spawn(move || {
            for i in 0..items {
                let mut v = i;
                loop {
                    match rb.put(v) {
                        Ok(_) => break,
                        Err(e) => v = e.into_inner(),
                    }
                }
            }
        });

        s.spawn(move || {
            let mut expected = 0u64;
            while expected < items {
                if let (Some(v), _) = rb.get() {
                    assert_eq!(v, expected, "urutan FIFO rusak");
                    expected += 1;
                }
            }
        });
    });

    let duration = start.elapsed();
    println!(
        "  {} items in-order in {:.2}ms ({:.2} M items/sec)",
        items,
        duration.as_secs_f64() * 1000.0,
        items as f64 / duration.as_secs_f64() / 1_000_000.0
    );
    println!("\n✅ FIFO ORDER PRESERVED");
}

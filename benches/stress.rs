use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use ulid::Ulid;

use parkd::engine::{BookingEngine, EngineError, LockRegistry};
use parkd::notify::NotifyHub;
use parkd::store::{MemoryStore, SlotStore, WalStore};

const N_SLOTS: usize = 50;

fn slot_name(i: usize) -> String {
    format!("S{i:03}")
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.3}ms, p50={:.3}ms, p95={:.3}ms, p99={:.3}ms, max={:.3}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

async fn engine_over<S: SlotStore>(store: Arc<S>) -> Arc<BookingEngine<S>> {
    let engine = BookingEngine::new(store, LockRegistry::new(), Arc::new(NotifyHub::new()));
    for i in 0..N_SLOTS {
        engine.add_slot(&slot_name(i)).await.unwrap();
    }
    Arc::new(engine)
}

/// One task books and releases the same slot in a tight loop.
async fn phase1_sequential<S: SlotStore + 'static>(engine: &BookingEngine<S>) {
    let n = 2_000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();
    for _ in 0..n {
        let t = Instant::now();
        let booked = engine.book(&slot_name(0), "bench").await.unwrap();
        engine.release(&booked.booking_id.to_string()).await.unwrap();
        latencies.push(t.elapsed());
    }
    let elapsed = start.elapsed();
    println!(
        "  {n} book+release cycles in {:.2}s = {:.0} cycles/sec",
        elapsed.as_secs_f64(),
        n as f64 / elapsed.as_secs_f64()
    );
    print_latency("book+release", &mut latencies);
}

/// Each task owns a slot, so no task ever waits on another's lock.
async fn phase2_distinct_slots<S: SlotStore + 'static>(engine: Arc<BookingEngine<S>>) {
    let n_tasks = N_SLOTS;
    let n_per_task = 200;
    let start = Instant::now();
    let mut handles = Vec::new();

    for i in 0..n_tasks {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let slot = slot_name(i);
            for _ in 0..n_per_task {
                let booked = engine.book(&slot, "bench").await.unwrap();
                engine.release(&booked.booking_id.to_string()).await.unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_per_task;
    println!(
        "  {n_tasks} tasks x {n_per_task} cycles = {total} total in {:.2}s = {:.0} cycles/sec",
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
}

/// Many tasks fight over one slot. Exactly one booking may be live at a time.
async fn phase3_hot_slot<S: SlotStore + 'static>(engine: Arc<BookingEngine<S>>) {
    let n_tasks = 64;
    let attempts = 100;
    let won = Arc::new(AtomicUsize::new(0));
    let lost = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();

    for i in 0..n_tasks {
        let engine = engine.clone();
        let won = won.clone();
        let lost = lost.clone();
        handles.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(attempts);
            for _ in 0..attempts {
                let t = Instant::now();
                match engine.book(&slot_name(1), &format!("user{i}")).await {
                    Ok(booked) => {
                        won.fetch_add(1, Ordering::Relaxed);
                        tokio::task::yield_now().await;
                        engine.release(&booked.booking_id.to_string()).await.unwrap();
                    }
                    Err(EngineError::Conflict(_)) => {
                        lost.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                }
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut latencies = Vec::new();
    for h in handles {
        latencies.extend(h.await.unwrap());
    }

    let elapsed = start.elapsed();
    println!(
        "  {n_tasks} tasks x {attempts} attempts in {:.2}s: {} won, {} conflicts",
        elapsed.as_secs_f64(),
        won.load(Ordering::Relaxed),
        lost.load(Ordering::Relaxed)
    );
    print_latency("contended book", &mut latencies);
    assert_eq!(engine.occupancy().await.occupied, 0);
}

async fn run_phases<S: SlotStore + 'static>(engine: Arc<BookingEngine<S>>) {
    println!("\n[phase 1] sequential book/release");
    phase1_sequential(&engine).await;

    println!("\n[phase 2] concurrent, distinct slots");
    phase2_distinct_slots(engine.clone()).await;

    println!("\n[phase 3] concurrent, one hot slot");
    phase3_hot_slot(engine).await;
}

#[tokio::main]
async fn main() {
    println!("=== parkd stress benchmark ===");

    println!("\n### memory store");
    run_phases(engine_over(Arc::new(MemoryStore::new())).await).await;

    let dir = std::env::temp_dir().join(format!("parkd_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let store = Arc::new(WalStore::open(&dir.join("parkd.wal")).unwrap());

    println!("\n### wal store ({})", dir.display());
    run_phases(engine_over(store.clone()).await).await;
    println!("  appends since compact: {}", store.appends_since_compact().await);

    let start = Instant::now();
    store.compact().await.unwrap();
    println!("  compaction took {:.2}ms", start.elapsed().as_secs_f64() * 1000.0);
    store.shutdown().await;
    let _ = std::fs::remove_dir_all(&dir);

    println!("\n=== benchmark complete ===");
}

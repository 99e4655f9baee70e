//! Concurrent stress demo: one writer driving puts across two level
//! transitions while several reader threads race it, mirroring spec
//! scenario 6. Run with `cargo run --example concurrent_stress --release`.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

use linhash_kv::{Config, Store};

const NUM_READERS: usize = 8;
// A multiple of KEY_SPACE so every key's last write lands on the same
// final iteration, keeping the post-run assertion below simple.
const NUM_OPERATIONS: usize = 10_240;
const KEY_SPACE: usize = 256;

fn writer_thread(store: Store, barrier: Arc<Barrier>) -> (usize, std::time::Duration) {
    barrier.wait();
    let start = Instant::now();
    let mut success = 0;

    for i in 0..NUM_OPERATIONS {
        let key = format!("k{}", i % KEY_SPACE);
        let value = format!("v-{i}");
        if store.put(key.as_bytes(), value.as_bytes()).unwrap() {
            success += 1;
        }
    }

    (success, start.elapsed())
}

fn reader_thread(
    store: Store,
    barrier: Arc<Barrier>,
    stop: Arc<AtomicBool>,
    never_missing_garbage: Arc<AtomicUsize>,
) -> (usize, std::time::Duration) {
    barrier.wait();
    let start = Instant::now();
    let mut observed = 0;

    while !stop.load(Ordering::Relaxed) {
        for i in 0..KEY_SPACE {
            let key = format!("k{i}");
            if let Some(value) = store.get(key.as_bytes()).unwrap() {
                if !value.starts_with(b"v-") {
                    never_missing_garbage.fetch_add(1, Ordering::Relaxed);
                }
                observed += 1;
            }
        }
    }

    (observed, start.elapsed())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("linhash-kv concurrent stress demo");
    println!("==================================");

    let home = Path::new("/tmp/linhash_kv_concurrent_demo");
    if home.exists() {
        std::fs::remove_dir_all(home)?;
    }

    let config = Config {
        home_dir: home.to_path_buf(),
        unit_capacity: 16,
        ..Config::default()
    };
    let store = Store::open(config)?;

    let barrier = Arc::new(Barrier::new(1 + NUM_READERS));
    let stop = Arc::new(AtomicBool::new(false));
    let garbage = Arc::new(AtomicUsize::new(0));

    let readers: Vec<_> = (0..NUM_READERS)
        .map(|_| {
            let store = store.clone();
            let barrier = barrier.clone();
            let stop = stop.clone();
            let garbage = garbage.clone();
            thread::spawn(move || reader_thread(store, barrier, stop, garbage))
        })
        .collect();

    let (writes, write_duration) = writer_thread(store.clone(), barrier);
    store.sync()?;
    stop.store(true, Ordering::Relaxed);

    let mut total_reads = 0;
    for reader in readers {
        let (observed, _) = reader.join().unwrap();
        total_reads += observed;
    }

    println!(
        "writer: {writes} puts in {:?} ({:.0} ops/sec)",
        write_duration,
        writes as f64 / write_duration.as_secs_f64()
    );
    println!("readers: {total_reads} successful gets across {NUM_READERS} threads");
    println!(
        "garbage values observed: {} (must be 0)",
        garbage.load(Ordering::Relaxed)
    );

    let status = store.status();
    println!("final status: {status}");

    for i in 0..KEY_SPACE {
        let key = format!("k{i}");
        let expected = format!("v-{}", NUM_OPERATIONS - KEY_SPACE + i);
        assert_eq!(store.get(key.as_bytes())?, Some(expected.into_bytes()));
    }
    println!("all final values verified correct.");

    store.close()?;
    Ok(())
}

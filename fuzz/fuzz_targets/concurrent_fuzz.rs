#![no_main]

use libfuzzer_sys::fuzz_target;
use linhash_kv::{Config, Store};
use std::thread;

/// Splits the fuzz input across a handful of threads, each replaying its
/// own slice as `put`/`get`/`delete` ops against one shared store. Exercises
/// the lock-free read retry loop racing the writer lock under splits;
/// the only property checked is "no panic, no deadlock".
fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    let Ok(dir) = tempfile::tempdir() else {
        return;
    };
    let config = Config {
        home_dir: dir.path().to_path_buf(),
        unit_capacity: 8,
        ..Config::default()
    };
    let Ok(store) = Store::open(config) else {
        return;
    };

    let num_threads = (data[0] % 4) as usize + 1;
    let chunks: Vec<&[u8]> = data[1..].chunks(data[1..].len().max(1) / num_threads.max(1) + 1).collect();

    let handles: Vec<_> = chunks
        .into_iter()
        .enumerate()
        .map(|(thread_id, chunk)| {
            let store = store.clone();
            let chunk = chunk.to_vec();
            thread::spawn(move || {
                let mut offset = 0;
                while offset + 2 <= chunk.len() {
                    let op = chunk[offset] % 3;
                    let key_id = chunk[offset + 1] % 16;
                    offset += 2;
                    let key = format!("t{thread_id}-k{key_id}").into_bytes();

                    match op {
                        0 => {
                            let _ = store.put(&key, b"v");
                        }
                        1 => {
                            let _ = store.get(&key);
                        }
                        _ => {
                            let _ = store.delete(&key);
                        }
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        let _ = handle.join();
    }
});

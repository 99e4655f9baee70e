#![no_main]

use libfuzzer_sys::fuzz_target;
use linhash_kv::{Config, Store};

/// Replays a sequence of `put`/`get`/`delete` operations decoded from the
/// fuzz input against a single store, checking only that the store never
/// panics and that `get` after `delete` reports absence. Each run gets a
/// fresh temp directory so segment/address-array state never leaks between
/// runs.
fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
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

    let mut offset = 0;
    while offset + 3 <= data.len() {
        let op = data[offset] % 3;
        let key_id = data[offset + 1] % 32; // small key space to force bucket collisions
        let value_len = (data[offset + 2] as usize) % 64;
        offset += 3;

        let key = format!("k{key_id}").into_bytes();

        match op {
            0 => {
                let end = (offset + value_len).min(data.len());
                let value = &data[offset..end];
                offset = end;
                let _ = store.put(&key, value);
            }
            1 => {
                let _ = store.get(&key);
            }
            _ => {
                if store.delete(&key).unwrap_or(false) {
                    assert_eq!(store.get(&key).unwrap_or(None), None);
                }
            }
        }
    }

    let _ = store.sync();
});

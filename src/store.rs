//! Public entry point: [`Store`], the linear-hashing key-value store.
//!
//! Thin wrapper around [`LinearHashingController`] that owns configuration
//! and wires up the configured hash function: own the index/log pair and
//! expose a synchronous get/put/delete API plus lifecycle operations.

use std::fs;
use std::sync::Arc;

use crate::config::Config;
use crate::controller::{LinearHashingController, Status};
use crate::data_array::{CompactionStats, DataArray};
use crate::error::{Result, StoreError};
use crate::hash::{Fnv1aHash, HashFunction};
use crate::iter::{EntryIterator, KeyIterator};

/// A persistent, dynamically-growing key-value store.
///
/// Cloning a `Store` is cheap — it is a handle around an `Arc`-shared
/// controller, so multiple clones (and iterators borrowed from them) can be
/// held across threads without any of them owning the underlying files
/// exclusively.
#[derive(Clone)]
pub struct Store {
    controller: Arc<LinearHashingController>,
}

impl Store {
    /// Open (or create) a store at `config.home_dir` using the default FNV-1a
    /// hash function.
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_hash(config, Box::new(Fnv1aHash))
    }

    /// Open a store with an explicit [`HashFunction`] implementation.
    pub fn open_with_hash(config: Config, hash_fn: Box<dyn HashFunction>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.home_dir)?;

        let data = DataArray::open(
            &config.home_dir,
            config.entry_size,
            config.max_entries,
            config.segment_file_size_mb,
            config.segment_compact_factor,
        )?;

        let controller = LinearHashingController::open(
            data,
            hash_fn,
            config.unit_capacity,
            config.hash_load_threshold,
            config.init_level,
        )?;

        Ok(Self {
            controller: Arc::new(controller),
        })
    }

    /// Look up `key`. Returns `None` if absent; never errors on a missing
    /// key.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.controller.get(key)
    }

    /// Insert or replace `key`'s value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.controller.put(key, Some(value))
    }

    /// Remove `key`. Returns `true` if it was present.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.controller.delete(key)
    }

    /// Drop every entry, without changing the store's level/split state.
    pub fn clear(&self) -> Result<()> {
        self.controller.clear()
    }

    /// Flush in-memory state to durable storage without a full checkpoint.
    pub fn sync(&self) -> Result<()> {
        self.controller.sync()
    }

    /// Force a full checkpoint of the address array and controller state.
    pub fn persist(&self) -> Result<()> {
        self.controller.persist()
    }

    /// Drive any in-progress split to completion, then keep splitting if the
    /// load factor is still over threshold, until a full level finishes.
    pub fn rehash(&self) -> Result<()> {
        self.controller.rehash()
    }

    /// Reclaim space in segments below the configured compaction factor.
    pub fn compact(&self) -> Result<CompactionStats> {
        self.controller.compact()
    }

    /// A lazy, weakly-consistent iterator over every key.
    pub fn key_iterator(&self) -> Result<KeyIterator> {
        Ok(KeyIterator::new(self.controller.clone()))
    }

    /// A lazy, weakly-consistent iterator over every `(key, value)` pair.
    pub fn iterator(&self) -> Result<EntryIterator> {
        Ok(EntryIterator::new(self.controller.clone()))
    }

    /// Current level/split/capacity/loadCount/loadFactor snapshot.
    pub fn status(&self) -> Status {
        self.controller.status()
    }

    /// Flush and checkpoint before shutting down. Reports both failures via
    /// [`StoreError::Close`] if sync and persist both fail.
    pub fn close(&self) -> Result<()> {
        match (self.sync(), self.persist()) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(first), Ok(())) | (Ok(()), Err(first)) => Err(first),
            (Err(first), Err(second)) => Err(StoreError::Close {
                first: first.to_string(),
                second: Some(second.to_string()),
            }),
        }
    }
}

//! Store configuration.
//!
//! Field set and `validate()` pattern follow the prior implementation's
//! `Config` struct; the recognized options are the ones the store actually
//! reads (see DESIGN.md for the full option table).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Configuration for opening a [`crate::Store`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root directory owning all persistent state.
    pub home_dir: PathBuf,

    /// Pre-expand the address array to `unit_capacity * 2^init_level`
    /// entries at open time, so the store starts at that level with no
    /// split in progress.
    pub init_level: u32,

    /// Redo-entry batch size for the address array.
    pub entry_size: usize,

    /// Number of redo batches accumulated before the address array
    /// checkpoints and clears its redo log.
    pub max_entries: usize,

    /// Segment file size, in megabytes.
    pub segment_file_size_mb: u64,

    /// Live-byte fraction below which a segment becomes eligible for
    /// compaction.
    pub segment_compact_factor: f64,

    /// Target load factor (`loadCount / capacity`) that triggers splits.
    pub hash_load_threshold: f64,

    /// Fixed unit size `U` — the address array's sub-array length. Must be
    /// a power of two.
    pub unit_capacity: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home_dir: PathBuf::from("./linhash_data"),
            init_level: 0,
            entry_size: 10_000,
            max_entries: 5,
            segment_file_size_mb: 256,
            segment_compact_factor: 0.5,
            hash_load_threshold: 0.75,
            unit_capacity: 8,
        }
    }
}

impl Config {
    /// Validate configuration parameters before opening a store.
    pub fn validate(&self) -> Result<()> {
        if self.home_dir.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig {
                message: "home_dir cannot be empty".to_string(),
            });
        }

        if !self.unit_capacity.is_power_of_two() {
            return Err(StoreError::InvalidConfig {
                message: format!(
                    "unit_capacity ({}) must be a power of two",
                    self.unit_capacity
                ),
            });
        }

        if self.entry_size == 0 {
            return Err(StoreError::InvalidConfig {
                message: "entry_size must be at least 1".to_string(),
            });
        }

        if self.max_entries == 0 {
            return Err(StoreError::InvalidConfig {
                message: "max_entries must be at least 1".to_string(),
            });
        }

        if self.segment_file_size_mb == 0 {
            return Err(StoreError::InvalidConfig {
                message: "segment_file_size_mb must be at least 1".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.segment_compact_factor) {
            return Err(StoreError::InvalidConfig {
                message: "segment_compact_factor must be in [0, 1]".to_string(),
            });
        }

        if self.hash_load_threshold <= 0.0 || self.hash_load_threshold > 1.0 {
            return Err(StoreError::InvalidConfig {
                message: "hash_load_threshold must be in (0, 1]".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_non_power_of_two_unit_capacity() {
        let mut config = Config::default();
        config.unit_capacity = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_load_threshold() {
        let mut config = Config::default();
        config.hash_load_threshold = 0.0;
        assert!(config.validate().is_err());

        config.hash_load_threshold = 1.5;
        assert!(config.validate().is_err());
    }
}

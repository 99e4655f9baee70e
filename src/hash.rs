//! Injectable key hashing.
//!
//! Grounded on a `KeyHasher`-style wrapper around a `Hasher` behind a small
//! `hash_key(&[u8]) -> u64` surface. Here the surface is a trait so callers
//! can inject their own function (the `hashFunction` config option,
//! default FNV).

use std::hash::Hasher;

/// A deterministic `bytes -> u64` mapping used to place keys into buckets.
///
/// Implementations must be pure and stable across calls: the same key must
/// always hash to the same value for the lifetime of a store, since split
/// correctness depends on recomputing the same hash for a key on every
/// access.
pub trait HashFunction: Send + Sync {
    fn hash(&self, key: &[u8]) -> u64;
}

/// FNV-1a, the store's default hash function. Simple, allocation-free, and
/// good enough distribution for hash-table bucketing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fnv1aHash;

impl Fnv1aHash {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
}

impl HashFunction for Fnv1aHash {
    fn hash(&self, key: &[u8]) -> u64 {
        let mut hash = Self::OFFSET_BASIS;
        for &byte in key {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(Self::PRIME);
        }
        hash
    }
}

/// Alternative hash function backed by `ahash`, offered since `ahash` is
/// already in the dependency stack for exactly this purpose.
#[derive(Debug, Clone, Copy, Default)]
pub struct AHashFunction;

impl HashFunction for AHashFunction {
    fn hash(&self, key: &[u8]) -> u64 {
        let mut hasher = ahash::AHasher::default();
        hasher.write(key);
        hasher.finish()
    }
}

//! # linhash-kv: a persistent, dynamically-growing key-value store
//!
//! `linhash-kv` grows its bucket address space one bucket at a time using
//! **linear hashing**, so the store never pays for a stop-the-world rehash.
//! Keys and values are opaque byte sequences; records live in an
//! append-oriented segmented log addressed by a dynamic array of 64-bit
//! locators.
//!
//! ## Core Features
//!
//! - **Incremental growth**: one bucket splits per write past the load
//!   threshold, never a full-table rehash.
//! - **Lock-free reads**: `get` never blocks on the writer lock; a small
//!   retry loop keeps it correct across concurrent splits.
//! - **Durable by default**: a segmented data log plus a checkpointed
//!   address array survive process restarts.
//! - **Injectable hashing**: swap the default FNV-1a for any
//!   [`HashFunction`].
//!
//! ## Example
//!
//! ```no_run
//! use linhash_kv::{Config, Store};
//!
//! # fn main() -> linhash_kv::Result<()> {
//! let config = Config {
//!     home_dir: "./data".into(),
//!     ..Config::default()
//! };
//! let store = Store::open(config)?;
//!
//! store.put(b"hello", b"world")?;
//! assert_eq!(store.get(b"hello")?, Some(b"world".to_vec()));
//! store.close()?;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod address_array;
pub mod background;
pub mod codec;
pub mod config;
pub mod controller;
pub mod data_array;
pub mod error;
pub mod hash;
pub mod iter;
pub mod segment;
pub mod store;

pub use background::{BackgroundTaskManager, BackgroundTaskStats};
pub use config::Config;
pub use controller::Status;
pub use error::{Result, StoreError};
pub use hash::{AHashFunction, Fnv1aHash, HashFunction};
pub use iter::{EntryIterator, KeyIterator};
pub use store::Store;

//! Bounded on-disk blob store with LRU eviction
//!
//! One `<fingerprint>.blob` file per entry plus an append-only `journal`
//! recording commits, reads and removals. See [`journal`] for the format.

pub mod journal;
pub mod store;

pub use store::{CacheStats, CacheStore};

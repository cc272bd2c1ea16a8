//! Cache collaborator for docbatch.
//!
//! [`KeyValueCache`] is the contract the loader writes serialized results
//! through; [`InMemoryCache`] is a bundled implementation with per-entry TTL
//! and a bounded entry count.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{CacheError, CacheResult};
pub use memory::{InMemoryCache, MemoryCacheConfig};
pub use traits::{CacheStats, KeyValueCache, SetOptions};
